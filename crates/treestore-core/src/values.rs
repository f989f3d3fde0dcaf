//! # Property Values
//!
//! Typed values stored on entities and relationships, keyed by the identity
//! of the `FacetProperty` they belong to.
//!
//! Values are never coerced: assigning a value whose runtime kind differs
//! from the declared property type fails with `PropertyTypeMismatch`.

use crate::facet::{Facet, FacetProperty, FacetPropertyType, addressed_properties};
use crate::types::{FacetPropertyId, Named};
use crate::TreeStoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// FACET VALUE
// =============================================================================

/// A value of one of the seven supported property kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FacetValue {
    String(String),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    Bool(bool),
}

impl FacetValue {
    /// The property type this value satisfies.
    #[must_use]
    pub const fn value_type(&self) -> FacetPropertyType {
        match self {
            Self::String(_) => FacetPropertyType::String,
            Self::Long(_) => FacetPropertyType::Long,
            Self::Double(_) => FacetPropertyType::Double,
            Self::Decimal(_) => FacetPropertyType::Decimal,
            Self::DateTime(_) => FacetPropertyType::DateTime,
            Self::Guid(_) => FacetPropertyType::Guid,
            Self::Bool(_) => FacetPropertyType::Bool,
        }
    }

    /// Parse a textual value according to a declared type.
    ///
    /// Used by the command line; the text must be a literal of exactly the
    /// declared type (`42` for long, RFC 3339 for datetime, ...).
    pub fn parse_as(property: &FacetProperty, text: &str) -> Result<Self, TreeStoreError> {
        let mismatch = || TreeStoreError::PropertyTypeMismatch {
            name: property.name().to_string(),
            expected: property.property_type(),
        };

        let value = match property.property_type() {
            FacetPropertyType::String => Self::String(text.to_string()),
            FacetPropertyType::Long => Self::Long(text.parse().map_err(|_| mismatch())?),
            FacetPropertyType::Double => Self::Double(text.parse().map_err(|_| mismatch())?),
            FacetPropertyType::Decimal => Self::Decimal(text.parse().map_err(|_| mismatch())?),
            FacetPropertyType::DateTime => Self::DateTime(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| mismatch())?
                    .with_timezone(&Utc),
            ),
            FacetPropertyType::Guid => Self::Guid(Uuid::parse_str(text).map_err(|_| mismatch())?),
            FacetPropertyType::Bool => Self::Bool(text.parse().map_err(|_| mismatch())?),
        };
        Ok(value)
    }
}

impl fmt::Display for FacetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => f.write_str(v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Decimal(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// The value map of an item: property identity -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValues(BTreeMap<FacetPropertyId, FacetValue>);

impl PropertyValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value after checking it against the property's declared type.
    pub fn set(&mut self, property: &FacetProperty, value: FacetValue) -> Result<(), TreeStoreError> {
        if value.value_type() != property.property_type() {
            return Err(TreeStoreError::PropertyTypeMismatch {
                name: property.name().to_string(),
                expected: property.property_type(),
            });
        }
        self.0.insert(property.id(), value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: FacetPropertyId) -> Option<&FacetValue> {
        self.0.get(&id)
    }

    pub fn remove(&mut self, id: FacetPropertyId) -> Option<FacetValue> {
        self.0.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: FacetPropertyId) -> bool {
        self.0.contains_key(&id)
    }

    /// Keep only values whose property is in `keep`. Returns the purge count.
    pub fn retain_properties(&mut self, keep: &BTreeSet<FacetPropertyId>) -> usize {
        let before = self.0.len();
        self.0.retain(|id, _| keep.contains(id));
        before - self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetPropertyId, &FacetValue)> {
        self.0.iter().map(|(id, value)| (*id, value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// VALUE HOLDER
// =============================================================================

/// Items that store property values (entities and relationships).
pub trait ValueHolder {
    fn values(&self) -> &PropertyValues;

    fn values_mut(&mut self) -> &mut PropertyValues;

    /// Drop every value whose property is not defined by `facets`.
    ///
    /// Returns the number of purged values.
    fn purge_stale_values(&mut self, facets: &[Facet]) -> usize {
        let keep: BTreeSet<FacetPropertyId> = facets
            .iter()
            .flat_map(|facet| facet.properties().iter().map(FacetProperty::id))
            .collect();
        self.values_mut().retain_properties(&keep)
    }
}

/// A stored value with the key its property answers to.
#[derive(Debug, Clone)]
pub struct AddressedValue {
    pub key: String,
    pub property: FacetProperty,
    pub value: FacetValue,
}

/// The values `holder` stores for the properties of `facets`, in effective
/// property order.
pub fn addressed_values<H: ValueHolder + ?Sized>(holder: &H, facets: &[Facet]) -> Vec<AddressedValue> {
    addressed_properties(facets)
        .into_iter()
        .filter_map(|(key, property)| {
            let value = holder.values().get(property.id())?.clone();
            Some(AddressedValue {
                key,
                property,
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_accepts_matching_type() {
        let property = FacetProperty::new("pages", FacetPropertyType::Long);
        let mut values = PropertyValues::new();

        values.set(&property, FacetValue::Long(42)).expect("set");
        assert_eq!(values.get(property.id()), Some(&FacetValue::Long(42)));
    }

    #[test]
    fn set_rejects_mismatched_type() {
        let property = FacetProperty::new("pages", FacetPropertyType::Long);
        let mut values = PropertyValues::new();

        let result = values.set(&property, FacetValue::String("42".to_string()));
        assert!(matches!(
            result,
            Err(TreeStoreError::PropertyTypeMismatch { ref name, expected })
                if name == "pages" && expected == FacetPropertyType::Long
        ));
        assert!(values.is_empty());
    }

    #[test]
    fn no_numeric_coercion_in_core() {
        let property = FacetProperty::new("ratio", FacetPropertyType::Double);
        let mut values = PropertyValues::new();
        assert!(values.set(&property, FacetValue::Long(1)).is_err());
    }

    #[test]
    fn retain_properties_purges_others() {
        let a = FacetProperty::new("a", FacetPropertyType::Bool);
        let b = FacetProperty::new("b", FacetPropertyType::Bool);
        let mut values = PropertyValues::new();
        values.set(&a, FacetValue::Bool(true)).expect("set");
        values.set(&b, FacetValue::Bool(false)).expect("set");

        let keep = BTreeSet::from([a.id()]);
        assert_eq!(values.retain_properties(&keep), 1);
        assert!(values.contains(a.id()));
        assert!(!values.contains(b.id()));
    }

    #[test]
    fn parse_as_follows_declared_type() {
        let when = FacetProperty::new("when", FacetPropertyType::DateTime);
        let parsed = FacetValue::parse_as(&when, "2024-05-01T10:00:00Z").expect("parse");
        assert_eq!(parsed.value_type(), FacetPropertyType::DateTime);

        let price = FacetProperty::new("price", FacetPropertyType::Decimal);
        let parsed = FacetValue::parse_as(&price, "19.99").expect("parse");
        assert_eq!(parsed.to_string(), "19.99");

        let count = FacetProperty::new("count", FacetPropertyType::Long);
        assert!(FacetValue::parse_as(&count, "many").is_err());
    }
}
