//! # Tags
//!
//! A tag is a reusable, named wrapper around exactly one facet. Attaching a
//! tag to an entity or relationship contributes the tag's facet to the
//! item's effective schema.

use crate::facet::Facet;
use crate::types::{Identified, ItemKind, Named, TagId, identity_equality};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named wrapper around one facet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    id: TagId,
    name: String,
    facet: Facet,
}

impl Tag {
    /// Create a tag together with its (empty) facet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: TagId::new(),
            facet: Facet::new(name.clone()),
            name,
        }
    }

    #[must_use]
    pub fn id(&self) -> TagId {
        self.id
    }

    #[must_use]
    pub fn facet(&self) -> &Facet {
        &self.facet
    }

    pub fn facet_mut(&mut self) -> &mut Facet {
        &mut self.facet
    }

    /// Uniqueness key of the tag: tag names are unique case-insensitively.
    #[must_use]
    pub fn unique_name(&self) -> String {
        self.name.to_lowercase()
    }
}

impl Identified for Tag {
    fn identity(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Tag
    }
}

impl Named for Tag {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

identity_equality!(Tag);
