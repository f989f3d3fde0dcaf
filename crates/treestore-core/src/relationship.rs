//! # Relationships
//!
//! A directed, named edge between two entities. Relationships carry tags and
//! property values like entities do, but have no category: their effective
//! schema is the union of their tags' facets only.

use crate::entity::Entity;
use crate::facet::{Facet, FacetProperty};
use crate::tag::Tag;
use crate::types::{EntityId, Identified, ItemKind, Named, RelationshipId, identity_equality};
use crate::values::{FacetValue, PropertyValues, ValueHolder};
use crate::TreeStoreError;
use uuid::Uuid;

/// A directed edge `from -> to`.
#[derive(Debug, Clone)]
pub struct Relationship {
    id: RelationshipId,
    name: String,
    from: Option<EntityId>,
    to: Option<EntityId>,
    tags: Vec<Tag>,
    values: PropertyValues,
}

impl Relationship {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RelationshipId::new(),
            name: name.into(),
            from: None,
            to: None,
            tags: Vec::new(),
            values: PropertyValues::new(),
        }
    }

    /// Convenience constructor for a fully wired edge.
    #[must_use]
    pub fn between(name: impl Into<String>, from: &Entity, to: &Entity) -> Self {
        let mut relationship = Self::new(name);
        relationship.set_from(from);
        relationship.set_to(to);
        relationship
    }

    pub(crate) fn from_parts(
        id: RelationshipId,
        name: String,
        from: Option<EntityId>,
        to: Option<EntityId>,
        tags: Vec<Tag>,
        values: PropertyValues,
    ) -> Self {
        Self {
            id,
            name,
            from,
            to,
            tags,
            values,
        }
    }

    #[must_use]
    pub fn id(&self) -> RelationshipId {
        self.id
    }

    #[must_use]
    pub fn from_entity(&self) -> Option<EntityId> {
        self.from
    }

    #[must_use]
    pub fn to_entity(&self) -> Option<EntityId> {
        self.to
    }

    pub fn set_from(&mut self, entity: &Entity) {
        self.from = Some(entity.id());
    }

    pub fn set_to(&mut self, entity: &Entity) {
        self.to = Some(entity.id());
    }

    /// Whether `entity` is either endpoint.
    #[must_use]
    pub fn touches(&self, entity: EntityId) -> bool {
        self.from == Some(entity) || self.to == Some(entity)
    }

    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Attach a tag. Returns whether it was newly attached.
    pub fn add_tag(&mut self, tag: Tag) -> bool {
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Detach a tag and purge the values that belonged to its facet.
    pub fn remove_tag(&mut self, tag: &Tag) -> bool {
        let Some(index) = self.tags.iter().position(|t| t == tag) else {
            return false;
        };
        self.tags.remove(index);
        let facets = self.effective_facets();
        self.purge_stale_values(&facets);
        true
    }

    /// The facets of the attached tags.
    #[must_use]
    pub fn effective_facets(&self) -> Vec<Facet> {
        let mut facets: Vec<Facet> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            if !facets.contains(tag.facet()) {
                facets.push(tag.facet().clone());
            }
        }
        facets
    }

    #[must_use]
    pub fn effective_properties(&self) -> Vec<FacetProperty> {
        self.effective_facets()
            .iter()
            .flat_map(|facet| facet.properties().iter().cloned())
            .collect()
    }

    pub fn set_facet_property(
        &mut self,
        property: &FacetProperty,
        value: FacetValue,
    ) -> Result<(), TreeStoreError> {
        self.values.set(property, value)
    }

    #[must_use]
    pub fn try_get_facet_property(&self, property: &FacetProperty) -> Option<&FacetValue> {
        self.values.get(property.id())
    }
}

impl ValueHolder for Relationship {
    fn values(&self) -> &PropertyValues {
        &self.values
    }

    fn values_mut(&mut self) -> &mut PropertyValues {
        &mut self.values
    }
}

impl Identified for Relationship {
    fn identity(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Relationship
    }
}

impl Named for Relationship {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

identity_equality!(Relationship);
