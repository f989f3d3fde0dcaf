//! # Facets
//!
//! A `Facet` is a named, ordered collection of typed property *definitions*.
//! It holds no values: values live on the items that inherit the facet
//! (see the `values` module).
//!
//! - Property names are unique within a facet (case-sensitive)
//! - The type of a property is fixed at creation; only the name may change
//! - Removing a property is idempotent
//!
//! Across the facets an item inherits, names may repeat. Such properties are
//! addressed as `facet/name`, or by id (see `resolve_property`).

use crate::primitives::PATH_SEPARATOR;
use crate::types::{FacetId, FacetPropertyId, Identified, ItemKind, Named, identity_equality};
use crate::TreeStoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// PROPERTY TYPE
// =============================================================================

/// The declared type of a facet property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetPropertyType {
    String,
    Long,
    Double,
    Decimal,
    DateTime,
    Guid,
    Bool,
}

impl FacetPropertyType {
    /// All supported property types, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::String,
        Self::Long,
        Self::Double,
        Self::Decimal,
        Self::DateTime,
        Self::Guid,
        Self::Bool,
    ];

    /// The lowercase name used on the command line and on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::DateTime => "datetime",
            Self::Guid => "guid",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for FacetPropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FacetPropertyType {
    type Err = TreeStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == lowered)
            .ok_or_else(|| TreeStoreError::InvalidName(format!("unknown property type '{}'", s)))
    }
}

// =============================================================================
// FACET PROPERTY
// =============================================================================

/// One typed, named definition within a facet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetProperty {
    id: FacetPropertyId,
    name: String,
    property_type: FacetPropertyType,
}

impl FacetProperty {
    /// Create a new property definition with a fresh identity.
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: FacetPropertyType) -> Self {
        Self {
            id: FacetPropertyId::new(),
            name: name.into(),
            property_type,
        }
    }

    #[must_use]
    pub fn id(&self) -> FacetPropertyId {
        self.id
    }

    /// The declared type. Immutable once created.
    #[must_use]
    pub fn property_type(&self) -> FacetPropertyType {
        self.property_type
    }
}

impl Identified for FacetProperty {
    fn identity(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn kind(&self) -> ItemKind {
        ItemKind::FacetProperty
    }
}

impl Named for FacetProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

identity_equality!(FacetProperty);

// =============================================================================
// FACET
// =============================================================================

/// A named, ordered set of property definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facet {
    id: FacetId,
    name: String,
    properties: Vec<FacetProperty>,
}

impl Facet {
    /// Create an empty facet with a fresh identity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FacetId::new(),
            name: name.into(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> FacetId {
        self.id
    }

    /// Properties in insertion order.
    #[must_use]
    pub fn properties(&self) -> &[FacetProperty] {
        &self.properties
    }

    /// Append a property.
    ///
    /// Fails with `DuplicatePropertyName` if a property of the same name
    /// already exists.
    pub fn add_property(&mut self, property: FacetProperty) -> Result<(), TreeStoreError> {
        if self.get_property_by_name(&property.name).is_some() {
            return Err(TreeStoreError::DuplicatePropertyName(property.name));
        }
        self.properties.push(property);
        Ok(())
    }

    /// Remove a property by id. Absent ids are a no-op.
    ///
    /// Returns the removed definition, if any. Callers owning values keyed
    /// by this property are responsible for purging them.
    pub fn remove_property(&mut self, id: FacetPropertyId) -> Option<FacetProperty> {
        let index = self.properties.iter().position(|p| p.id == id)?;
        Some(self.properties.remove(index))
    }

    /// Rename a property, keeping names unique.
    pub fn rename_property(
        &mut self,
        id: FacetPropertyId,
        name: impl Into<String>,
    ) -> Result<(), TreeStoreError> {
        let name = name.into();
        if self
            .properties
            .iter()
            .any(|p| p.id != id && p.name == name)
        {
            return Err(TreeStoreError::DuplicatePropertyName(name));
        }
        let property = self
            .properties
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| TreeStoreError::not_found(ItemKind::FacetProperty, id.as_uuid()))?;
        property.name = name;
        Ok(())
    }

    #[must_use]
    pub fn get_property(&self, id: FacetPropertyId) -> Option<&FacetProperty> {
        self.properties.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn get_property_by_name(&self, name: &str) -> Option<&FacetProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// A facet with a fresh identity holding the same property definitions.
    ///
    /// Property identities are kept, so values keyed by them stay valid for
    /// items that inherit the copy.
    #[must_use]
    pub fn clone_definitions(&self) -> Self {
        Self {
            id: FacetId::new(),
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl Identified for Facet {
    fn identity(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Facet
    }
}

impl Named for Facet {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

identity_equality!(Facet);

// =============================================================================
// PROPERTY ADDRESSING
// =============================================================================

/// Properties of `facets` paired with their facet, each property id once.
fn distinct_properties(facets: &[Facet]) -> Vec<(&Facet, &FacetProperty)> {
    let mut seen = BTreeSet::new();
    facets
        .iter()
        .flat_map(|facet| facet.properties.iter().map(move |p| (facet, p)))
        .filter(|(_, p)| seen.insert(p.id))
        .collect()
}

fn named<'a>(
    distinct: &[(&'a Facet, &'a FacetProperty)],
    facet: Option<&str>,
    name: &str,
) -> Vec<&'a FacetProperty> {
    distinct
        .iter()
        .filter(|(f, p)| p.name == name && facet.is_none_or(|q| f.name.eq_ignore_ascii_case(q)))
        .map(|(_, p)| *p)
        .collect()
}

/// The properties of `facets` with the key each one answers to, in facet
/// order.
///
/// The key is the bare name while no other property shares it,
/// `facet/name` while that is unique, and the property id otherwise.
#[must_use]
pub fn addressed_properties(facets: &[Facet]) -> Vec<(String, FacetProperty)> {
    let distinct = distinct_properties(facets);
    distinct
        .iter()
        .map(|(facet, property)| {
            let key = if named(&distinct, None, &property.name).len() == 1 {
                property.name.clone()
            } else if named(&distinct, Some(facet.name.as_str()), &property.name).len() == 1 {
                format!("{}{}{}", facet.name, PATH_SEPARATOR, property.name)
            } else {
                property.id.to_string()
            };
            (key, (*property).clone())
        })
        .collect()
}

/// Find the property of `facets` addressed by `key`: a property id,
/// `facet/name` (facet name case-insensitive) or a bare name.
///
/// Fails with `UnknownProperty` when nothing matches and with
/// `AmbiguousProperty` when a name matches several properties.
pub fn resolve_property(facets: &[Facet], key: &str) -> Result<FacetProperty, TreeStoreError> {
    if key.is_empty() {
        return Err(TreeStoreError::MissingArgument("property"));
    }
    let distinct = distinct_properties(facets);

    let by_id = Uuid::parse_str(key)
        .ok()
        .and_then(|id| distinct.iter().find(|(_, p)| p.id.as_uuid() == id));
    if let Some((_, property)) = by_id {
        return Ok((*property).clone());
    }

    let candidates = match key.split_once(PATH_SEPARATOR) {
        Some((facet, name)) => named(&distinct, Some(facet), name),
        None => named(&distinct, None, key),
    };
    match candidates.as_slice() {
        [] => Err(TreeStoreError::UnknownProperty(key.to_string())),
        [property] => Ok((*property).clone()),
        _ => Err(TreeStoreError::AmbiguousProperty(key.to_string())),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_property_preserves_insertion_order() {
        let mut facet = Facet::new("book");
        facet
            .add_property(FacetProperty::new("title", FacetPropertyType::String))
            .expect("add");
        facet
            .add_property(FacetProperty::new("pages", FacetPropertyType::Long))
            .expect("add");

        let names: Vec<_> = facet.properties().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["title", "pages"]);
    }

    #[test]
    fn duplicate_property_name_rejected() {
        let mut facet = Facet::new("book");
        facet
            .add_property(FacetProperty::new("title", FacetPropertyType::String))
            .expect("add");

        let result = facet.add_property(FacetProperty::new("title", FacetPropertyType::Long));
        assert!(matches!(
            result,
            Err(TreeStoreError::DuplicatePropertyName(name)) if name == "title"
        ));
        assert_eq!(facet.properties().len(), 1);
    }

    #[test]
    fn property_names_are_case_sensitive() {
        let mut facet = Facet::new("book");
        facet
            .add_property(FacetProperty::new("title", FacetPropertyType::String))
            .expect("add");
        assert!(
            facet
                .add_property(FacetProperty::new("Title", FacetPropertyType::String))
                .is_ok()
        );
    }

    #[test]
    fn remove_property_is_idempotent() {
        let mut facet = Facet::new("book");
        let property = FacetProperty::new("title", FacetPropertyType::String);
        let id = property.id();
        facet.add_property(property).expect("add");

        assert!(facet.remove_property(id).is_some());
        assert!(facet.remove_property(id).is_none());
        assert!(facet.get_property(id).is_none());
    }

    #[test]
    fn get_property_by_id_and_name() {
        let mut facet = Facet::new("book");
        let property = FacetProperty::new("isbn", FacetPropertyType::String);
        let id = property.id();
        facet.add_property(property).expect("add");

        assert_eq!(facet.get_property(id).map(|p| p.name()), Some("isbn"));
        assert_eq!(facet.get_property_by_name("isbn").map(|p| p.id()), Some(id));
        assert!(facet.get_property_by_name("missing").is_none());
    }

    #[test]
    fn rename_property_keeps_type_and_uniqueness() {
        let mut facet = Facet::new("book");
        let title = FacetProperty::new("title", FacetPropertyType::String);
        let pages = FacetProperty::new("pages", FacetPropertyType::Long);
        let (title_id, pages_id) = (title.id(), pages.id());
        facet.add_property(title).expect("add");
        facet.add_property(pages).expect("add");

        facet.rename_property(pages_id, "page_count").expect("rename");
        let renamed = facet.get_property(pages_id).expect("renamed");
        assert_eq!(renamed.name(), "page_count");
        assert_eq!(renamed.property_type(), FacetPropertyType::Long);

        assert!(facet.rename_property(title_id, "page_count").is_err());
    }

    #[test]
    fn clone_definitions_keeps_property_identity() {
        let mut facet = Facet::new("book");
        facet
            .add_property(FacetProperty::new("title", FacetPropertyType::String))
            .expect("add");

        let copy = facet.clone_definitions();
        assert_ne!(copy, facet);
        assert_eq!(copy.properties(), facet.properties());
    }

    #[test]
    fn property_type_parses_from_name() {
        for ty in FacetPropertyType::ALL {
            assert_eq!(ty.name().parse::<FacetPropertyType>().expect("parse"), ty);
        }
        assert_eq!(
            "DateTime".parse::<FacetPropertyType>().expect("parse"),
            FacetPropertyType::DateTime
        );
        assert!("blob".parse::<FacetPropertyType>().is_err());
    }

    fn facet_with(name: &str, properties: &[&FacetProperty]) -> Facet {
        let mut facet = Facet::new(name);
        for property in properties {
            facet.add_property((*property).clone()).expect("add");
        }
        facet
    }

    #[test]
    fn shared_names_are_addressed_by_facet() {
        let doc_owner = FacetProperty::new("owner", FacetPropertyType::String);
        let book_owner = FacetProperty::new("owner", FacetPropertyType::Long);
        let pages = FacetProperty::new("pages", FacetPropertyType::Long);
        let facets = vec![
            facet_with("docs", &[&doc_owner]),
            facet_with("book", &[&book_owner, &pages]),
        ];

        let keys: Vec<String> = addressed_properties(&facets)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["docs/owner", "book/owner", "pages"]);

        assert!(matches!(
            resolve_property(&facets, "owner"),
            Err(TreeStoreError::AmbiguousProperty(_))
        ));
        assert_eq!(resolve_property(&facets, "docs/owner").expect("docs"), doc_owner);
        assert_eq!(resolve_property(&facets, "BOOK/owner").expect("book"), book_owner);
        assert_eq!(resolve_property(&facets, "pages").expect("pages"), pages);
        assert_eq!(
            resolve_property(&facets, &book_owner.id().to_string()).expect("by id"),
            book_owner
        );
        assert!(matches!(
            resolve_property(&facets, "book/title"),
            Err(TreeStoreError::UnknownProperty(_))
        ));
    }

    #[test]
    fn same_facet_name_falls_back_to_ids() {
        let first = FacetProperty::new("owner", FacetPropertyType::String);
        let second = FacetProperty::new("owner", FacetPropertyType::Bool);
        let facets = vec![facet_with("book", &[&first]), facet_with("book", &[&second])];

        let addressed = addressed_properties(&facets);
        assert_eq!(addressed[0].0, first.id().to_string());
        assert_eq!(addressed[1].0, second.id().to_string());
        assert!(matches!(
            resolve_property(&facets, "book/owner"),
            Err(TreeStoreError::AmbiguousProperty(_))
        ));
    }

    #[test]
    fn inherited_copies_of_a_property_are_one_property() {
        let owner = FacetProperty::new("owner", FacetPropertyType::String);
        let original = facet_with("docs", &[&owner]);
        let facets = vec![original.clone_definitions(), original];

        let addressed = addressed_properties(&facets);
        assert_eq!(addressed.len(), 1);
        assert_eq!(addressed[0].0, "owner");
        assert_eq!(resolve_property(&facets, "owner").expect("owner"), owner);
    }
}
