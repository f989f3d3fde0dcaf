//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API and the
//! conversion of JSON values into typed property values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;
use treestore_core::{
    AddressedValue, Category, Entity, FacetProperty, FacetPropertyType, FacetValue, Named,
    Relationship, SessionMetrics, Tag, TreeStoreError, addressed_values,
};
use uuid::Uuid;

// =============================================================================
// ENVELOPE
// =============================================================================

/// Every response body: `{success, error, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            data: None,
        }
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub persistent: bool,
    pub categories: usize,
    pub entities: usize,
    pub tags: usize,
    pub relationships: usize,
}

impl StatusResponse {
    #[must_use]
    pub fn new(persistent: bool, metrics: SessionMetrics) -> Self {
        Self {
            persistent,
            categories: metrics.categories,
            entities: metrics.entities,
            tags: metrics.tags,
            relationships: metrics.relationships,
        }
    }
}

// =============================================================================
// MODEL VIEWS
// =============================================================================

/// A property definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyJson {
    pub id: Uuid,
    pub name: String,
    pub property_type: FacetPropertyType,
}

impl From<&FacetProperty> for PropertyJson {
    fn from(property: &FacetProperty) -> Self {
        Self {
            id: property.id().as_uuid(),
            name: property.name().to_string(),
            property_type: property.property_type(),
        }
    }
}

/// A category with its own facet's properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryJson {
    pub id: Uuid,
    pub name: String,
    pub parent: Option<Uuid>,
    pub path: String,
    pub properties: Vec<PropertyJson>,
}

impl CategoryJson {
    #[must_use]
    pub fn new(category: &Category, path: String) -> Self {
        Self {
            id: category.id().as_uuid(),
            name: category.name().to_string(),
            parent: category.parent().map(|p| p.as_uuid()),
            path,
            properties: category
                .facet()
                .properties()
                .iter()
                .map(PropertyJson::from)
                .collect(),
        }
    }
}

/// A category together with its direct content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryListing {
    pub category: CategoryJson,
    pub children: Vec<CategoryJson>,
    pub entities: Vec<EntityJson>,
}

/// A tag reference inside an entity or relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRefJson {
    pub id: Uuid,
    pub name: String,
}

impl From<&Tag> for TagRefJson {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id().as_uuid(),
            name: tag.name().to_string(),
        }
    }
}

/// A tag with its facet's properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagJson {
    pub id: Uuid,
    pub name: String,
    pub properties: Vec<PropertyJson>,
}

impl From<&Tag> for TagJson {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id().as_uuid(),
            name: tag.name().to_string(),
            properties: tag
                .facet()
                .properties()
                .iter()
                .map(PropertyJson::from)
                .collect(),
        }
    }
}

/// An entity with its values keyed by property name, or by `facet/name`
/// where two effective properties share a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityJson {
    pub id: Uuid,
    pub name: String,
    pub category: Option<Uuid>,
    pub tags: Vec<TagRefJson>,
    pub values: BTreeMap<String, JsonValue>,
}

impl EntityJson {
    /// Build the view from an entity and its addressed values.
    #[must_use]
    pub fn new(entity: &Entity, values: &[AddressedValue]) -> Self {
        Self {
            id: entity.id().as_uuid(),
            name: entity.name().to_string(),
            category: entity.category().map(|c| c.as_uuid()),
            tags: entity.tags().iter().map(TagRefJson::from).collect(),
            values: values_to_json(values),
        }
    }
}

/// A relationship with its values keyed like `EntityJson::values`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipJson {
    pub id: Uuid,
    pub name: String,
    pub from: Option<Uuid>,
    pub to: Option<Uuid>,
    pub tags: Vec<TagRefJson>,
    pub values: BTreeMap<String, JsonValue>,
}

impl From<&Relationship> for RelationshipJson {
    fn from(relationship: &Relationship) -> Self {
        let values = addressed_values(relationship, &relationship.effective_facets());
        Self {
            id: relationship.id().as_uuid(),
            name: relationship.name().to_string(),
            from: relationship.from_entity().map(|e| e.as_uuid()),
            to: relationship.to_entity().map(|e| e.as_uuid()),
            tags: relationship.tags().iter().map(TagRefJson::from).collect(),
            values: values_to_json(&values),
        }
    }
}

/// Outcome of a delete request. `false` means the store refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

// =============================================================================
// REQUESTS
// =============================================================================

/// `GET /categories?path=docs/guides`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

/// `DELETE /categories/{id}?recursive=true`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RecursiveQuery {
    #[serde(default)]
    pub recursive: bool,
}

/// `DELETE /tags/{id}?force=true`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

/// Create a category under a parent given by id or path (root if neither).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub parent: Option<Uuid>,
    #[serde(default)]
    pub parent_path: Option<String>,
}

/// Rename and/or move a category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCategoryRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyCategoryRequest {
    pub destination: Uuid,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPropertyRequest {
    pub name: String,
    pub property_type: String,
}

impl AddPropertyRequest {
    pub fn parsed_type(&self) -> Result<FacetPropertyType, TreeStoreError> {
        self.property_type.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityRequest {
    pub category: Uuid,
    pub name: String,
}

/// Rename, move and re-tag an entity in one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEntityRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<Uuid>,
    #[serde(default)]
    pub add_tags: Vec<Uuid>,
    #[serde(default)]
    pub remove_tags: Vec<Uuid>,
}

/// Values keyed by property name, `facet/name` or property id; `null` clears
/// a value. All of them are applied or none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetValuesRequest {
    pub values: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationshipRequest {
    pub name: String,
    pub from: Uuid,
    pub to: Uuid,
    #[serde(default)]
    pub tags: Vec<Uuid>,
}

// =============================================================================
// VALUE CONVERSION
// =============================================================================

/// Convert a JSON value to the declared type of `property`.
///
/// Integer numbers are accepted for `double` and `decimal`; `decimal` also
/// accepts strings. Everything else must match exactly.
pub fn json_to_value(property: &FacetProperty, json: &JsonValue) -> Result<FacetValue, TreeStoreError> {
    let mismatch = || TreeStoreError::PropertyTypeMismatch {
        name: property.name().to_string(),
        expected: property.property_type(),
    };

    let value = match (property.property_type(), json) {
        (FacetPropertyType::String, JsonValue::String(s)) => FacetValue::String(s.clone()),
        (FacetPropertyType::Long, JsonValue::Number(n)) => {
            FacetValue::Long(n.as_i64().ok_or_else(mismatch)?)
        }
        (FacetPropertyType::Double, JsonValue::Number(n)) => {
            FacetValue::Double(n.as_f64().ok_or_else(mismatch)?)
        }
        (FacetPropertyType::Decimal, JsonValue::Number(n)) => {
            FacetValue::Decimal(parse_decimal(&n.to_string()).ok_or_else(mismatch)?)
        }
        (FacetPropertyType::Decimal, JsonValue::String(s)) => {
            FacetValue::Decimal(parse_decimal(s).ok_or_else(mismatch)?)
        }
        (FacetPropertyType::DateTime, JsonValue::String(s)) => FacetValue::DateTime(
            DateTime::parse_from_rfc3339(s)
                .map_err(|_| mismatch())?
                .with_timezone(&Utc),
        ),
        (FacetPropertyType::Guid, JsonValue::String(s)) => {
            FacetValue::Guid(Uuid::parse_str(s).map_err(|_| mismatch())?)
        }
        (FacetPropertyType::Bool, JsonValue::Bool(b)) => FacetValue::Bool(*b),
        _ => return Err(mismatch()),
    };
    Ok(value)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// JSON form of a value. Decimals, datetimes and guids are strings;
/// non-finite doubles become `null`.
#[must_use]
pub fn value_to_json(value: &FacetValue) -> JsonValue {
    match value {
        FacetValue::String(s) => JsonValue::String(s.clone()),
        FacetValue::Long(n) => JsonValue::from(*n),
        FacetValue::Double(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        FacetValue::Decimal(d) => JsonValue::String(d.to_string()),
        FacetValue::DateTime(t) => JsonValue::String(t.to_rfc3339()),
        FacetValue::Guid(g) => JsonValue::String(g.to_string()),
        FacetValue::Bool(b) => JsonValue::Bool(*b),
    }
}

fn values_to_json(values: &[AddressedValue]) -> BTreeMap<String, JsonValue> {
    values
        .iter()
        .map(|entry| (entry.key.clone(), value_to_json(&entry.value)))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
