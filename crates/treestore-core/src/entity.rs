//! # Entities
//!
//! An entity is a leaf item placed in exactly one category. It carries a set
//! of tags and stores property values keyed by property identity.
//!
//! Its effective schema is the union of its category's inherited facets and
//! its tags' facets. The value map never holds a key outside that schema:
//! re-categorizing and removing a tag purge stale values immediately.

use crate::category::Category;
use crate::facet::{Facet, FacetProperty};
use crate::primitives::unique_key;
use crate::repository::CategoryRepository;
use crate::tag::Tag;
use crate::types::{CategoryId, EntityId, Identified, ItemKind, Named, identity_equality};
use crate::values::{FacetValue, PropertyValues, ValueHolder};
use crate::TreeStoreError;
use uuid::Uuid;

/// A leaf item of the tree.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    name: String,
    category: Option<CategoryId>,
    tags: Vec<Tag>,
    values: PropertyValues,
}

impl Entity {
    /// Create an uncategorized entity with a fresh identity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            category: None,
            tags: Vec::new(),
            values: PropertyValues::new(),
        }
    }

    /// Rebuild an entity from its stored parts.
    pub(crate) fn from_parts(
        id: EntityId,
        name: String,
        category: Option<CategoryId>,
        tags: Vec<Tag>,
        values: PropertyValues,
    ) -> Self {
        Self {
            id,
            name,
            category,
            tags,
            values,
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn category(&self) -> Option<CategoryId> {
        self.category
    }

    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Derived uniqueness key: `lower(name) + "_" + category id`.
    ///
    /// `None` while the entity is not placed in a category.
    #[must_use]
    pub fn unique_name(&self) -> Option<String> {
        self.category
            .map(|category| unique_key(&self.name, Some(category)))
    }

    /// Place the entity in `category`, then purge values that are no longer
    /// part of the effective schema. Returns the number of purged values.
    pub fn set_category<R: CategoryRepository + ?Sized>(
        &mut self,
        category: &Category,
        categories: &R,
    ) -> Result<usize, TreeStoreError> {
        self.category = Some(category.id());
        let mut facets = category.effective_facets(categories)?;
        facets.extend(self.tags.iter().map(|tag| tag.facet().clone()));
        Ok(self.purge_stale_values(&facets))
    }

    /// Attach a tag. Attaching an already present tag is a no-op.
    ///
    /// Returns whether the tag was newly attached.
    pub fn add_tag(&mut self, tag: Tag) -> bool {
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Detach a tag and purge the values it no longer justifies.
    ///
    /// Returns whether the tag was attached.
    pub fn remove_tag<R: CategoryRepository + ?Sized>(
        &mut self,
        tag: &Tag,
        categories: &R,
    ) -> Result<bool, TreeStoreError> {
        let Some(index) = self.tags.iter().position(|t| t == tag) else {
            return Ok(false);
        };
        self.tags.remove(index);
        self.purge_with(categories)?;
        Ok(true)
    }

    /// Category chain facets followed by tag facets, duplicates collapsed by
    /// facet identity.
    pub fn effective_facets<R: CategoryRepository + ?Sized>(
        &self,
        categories: &R,
    ) -> Result<Vec<Facet>, TreeStoreError> {
        let mut facets = match self.category {
            Some(category_id) => {
                let category = categories.find_by_id(category_id)?.ok_or_else(|| {
                    TreeStoreError::not_found(ItemKind::Category, category_id.as_uuid())
                })?;
                category.effective_facets(categories)?
            }
            None => Vec::new(),
        };

        for tag in &self.tags {
            if !facets.contains(tag.facet()) {
                facets.push(tag.facet().clone());
            }
        }
        Ok(facets)
    }

    /// Every property definition of the effective facets, in facet order.
    pub fn effective_properties<R: CategoryRepository + ?Sized>(
        &self,
        categories: &R,
    ) -> Result<Vec<FacetProperty>, TreeStoreError> {
        Ok(self
            .effective_facets(categories)?
            .iter()
            .flat_map(|facet| facet.properties().iter().cloned())
            .collect())
    }

    /// Recompute the effective schema and drop values outside of it.
    pub fn purge_with<R: CategoryRepository + ?Sized>(
        &mut self,
        categories: &R,
    ) -> Result<usize, TreeStoreError> {
        let facets = self.effective_facets(categories)?;
        Ok(self.purge_stale_values(&facets))
    }

    /// Type-check `value` against `property` and store it.
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

    /// Remove the value of `property`. Returns the removed value, if any.
    pub fn clear_facet_property(&mut self, property: &FacetProperty) -> Option<FacetValue> {
        self.values.remove(property.id())
    }

    /// Fresh identity, same name, tags and values; no category.
    #[must_use]
    pub fn clone_entity(&self) -> Self {
        Self {
            id: EntityId::new(),
            name: self.name.clone(),
            category: None,
            tags: self.tags.clone(),
            values: self.values.clone(),
        }
    }
}

impl ValueHolder for Entity {
    fn values(&self) -> &PropertyValues {
        &self.values
    }

    fn values_mut(&mut self) -> &mut PropertyValues {
        &mut self.values
    }
}

impl Identified for Entity {
    fn identity(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Entity
    }
}

impl Named for Entity {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

identity_equality!(Entity);

// =============================================================================
// TESTS
// =============================================================================
