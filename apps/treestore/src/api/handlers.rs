//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers and the mapping
//! of core errors to status codes.

use super::{
    AppState,
    types::{
        AddPropertyRequest, ApiResponse, CategoryJson, CategoryListing, CopyCategoryRequest,
        CreateCategoryRequest, CreateEntityRequest, CreateRelationshipRequest, CreateTagRequest,
        DeleteResponse, EntityJson, ForceQuery, HealthResponse, PathQuery, PropertyJson,
        RecursiveQuery, RelationshipJson, SetValuesRequest, StatusResponse, TagJson,
        UpdateCategoryRequest, UpdateEntityRequest, json_to_value,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use treestore_core::{
    Category, CategoryId, Entity, EntityId, FacetPropertyId, RelationshipId, Session, TagId,
    TreeStoreError,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for a core error.
#[must_use]
pub fn status_for(error: &TreeStoreError) -> StatusCode {
    match error {
        TreeStoreError::DuplicateName { .. }
        | TreeStoreError::DuplicatePropertyName(_)
        | TreeStoreError::ReferencedByRelationship(_) => StatusCode::CONFLICT,
        TreeStoreError::NotFound { .. }
        | TreeStoreError::PathNotFound(_)
        | TreeStoreError::UnknownProperty(_) => StatusCode::NOT_FOUND,
        TreeStoreError::MissingParent(_)
        | TreeStoreError::OrphanItem(_)
        | TreeStoreError::PropertyTypeMismatch { .. }
        | TreeStoreError::MissingArgument(_)
        | TreeStoreError::AmbiguousProperty(_)
        | TreeStoreError::InvalidName(_)
        | TreeStoreError::SubtreeCycle(_)
        | TreeStoreError::TreeTooDeep { .. } => StatusCode::BAD_REQUEST,
        TreeStoreError::RootProtected => StatusCode::FORBIDDEN,
        TreeStoreError::InvalidTree(_)
        | TreeStoreError::SerializationError(_)
        | TreeStoreError::StorageError(_)
        | TreeStoreError::IoError(_)
        | TreeStoreError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A core error rendered as an error envelope.
#[derive(Debug)]
pub struct ApiError(pub TreeStoreError);

impl From<TreeStoreError> for ApiError {
    fn from(error: TreeStoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

// =============================================================================
// VIEW HELPERS
// =============================================================================

fn category_json(session: &Session, category: &Category) -> Result<CategoryJson, TreeStoreError> {
    Ok(CategoryJson::new(category, session.category_path(category)?))
}

fn entity_json(session: &Session, entity: &Entity) -> Result<EntityJson, TreeStoreError> {
    Ok(EntityJson::new(entity, &session.entity_values(entity.id())?))
}

fn listing(session: &Session, category: &Category) -> Result<CategoryListing, TreeStoreError> {
    let children = session
        .children(category)?
        .iter()
        .map(|child| category_json(session, child))
        .collect::<Result<_, _>>()?;
    let entities = session
        .category_entities(category)?
        .iter()
        .map(|entity| entity_json(session, entity))
        .collect::<Result<_, _>>()?;

    Ok(CategoryListing {
        category: category_json(session, category)?,
        children,
        entities,
    })
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Item counts of the store.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let session = state.session.read().await;
    ok(StatusResponse::new(
        session.is_persistent(),
        session.metrics()?,
    ))
}

// =============================================================================
// CATEGORY HANDLERS
// =============================================================================

/// List the category at `?path=` (root by default) with its content.
pub async fn list_categories_handler(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<CategoryListing> {
    let session = state.session.read().await;
    let category = session.resolve_path(query.path.as_deref().unwrap_or_default())?;
    ok(listing(&session, &category)?)
}

pub async fn get_category_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CategoryListing> {
    let session = state.session.read().await;
    let category = session.category(CategoryId::from_uuid(id))?;
    ok(listing(&session, &category)?)
}

/// Create a category under `parent` (id), `parent_path`, or the root.
pub async fn create_category_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<CategoryJson> {
    let session = state.session.write().await;
    let parent = match (request.parent, request.parent_path.as_deref()) {
        (Some(id), _) => session.category(CategoryId::from_uuid(id))?,
        (None, Some(path)) => session.resolve_path(path)?,
        (None, None) => session.root()?,
    };
    let category = session.create_category(parent.id(), &request.name)?;
    created(category_json(&session, &category)?)
}

/// Rename and/or move a category.
pub async fn update_category_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCategoryRequest>,
) -> ApiResult<CategoryJson> {
    if request.name.is_none() && request.parent.is_none() {
        return Err(TreeStoreError::MissingArgument("name or parent").into());
    }

    let session = state.session.write().await;
    let category = session.update_category(
        CategoryId::from_uuid(id),
        request.name.as_deref(),
        request.parent.map(CategoryId::from_uuid),
    )?;
    ok(category_json(&session, &category)?)
}

pub async fn delete_category_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecursiveQuery>,
) -> ApiResult<DeleteResponse> {
    let session = state.session.write().await;
    let deleted = session.delete_category(CategoryId::from_uuid(id), query.recursive)?;
    ok(DeleteResponse { deleted })
}

pub async fn copy_category_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CopyCategoryRequest>,
) -> ApiResult<CategoryJson> {
    let session = state.session.write().await;
    let copy = session.copy_category(
        CategoryId::from_uuid(id),
        CategoryId::from_uuid(request.destination),
        request.recursive,
    )?;
    created(category_json(&session, &copy)?)
}

pub async fn add_category_property_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddPropertyRequest>,
) -> ApiResult<PropertyJson> {
    let property_type = request.parsed_type()?;
    let session = state.session.write().await;
    let property =
        session.add_category_property(CategoryId::from_uuid(id), &request.name, property_type)?;
    created(PropertyJson::from(&property))
}

pub async fn remove_category_property_handler(
    State(state): State<AppState>,
    Path((id, property)): Path<(Uuid, Uuid)>,
) -> ApiResult<DeleteResponse> {
    let session = state.session.write().await;
    let deleted = session.remove_category_property(
        CategoryId::from_uuid(id),
        FacetPropertyId::from_uuid(property),
    )?;
    ok(DeleteResponse { deleted })
}

// =============================================================================
// TAG HANDLERS
// =============================================================================

pub async fn list_tags_handler(State(state): State<AppState>) -> ApiResult<Vec<TagJson>> {
    let session = state.session.read().await;
    ok(session.all_tags()?.iter().map(TagJson::from).collect())
}

pub async fn create_tag_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<TagJson> {
    let session = state.session.write().await;
    let tag = session.create_tag(&request.name)?;
    created(TagJson::from(&tag))
}

pub async fn rename_tag_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<TagJson> {
    let session = state.session.write().await;
    let tag = session.rename_tag(TagId::from_uuid(id), &request.name)?;
    ok(TagJson::from(&tag))
}

/// Delete a tag; `?force=true` detaches it everywhere first.
pub async fn delete_tag_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<DeleteResponse> {
    let session = state.session.write().await;
    let deleted = session.delete_tag(TagId::from_uuid(id), query.force)?;
    ok(DeleteResponse { deleted })
}

pub async fn add_tag_property_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddPropertyRequest>,
) -> ApiResult<PropertyJson> {
    let property_type = request.parsed_type()?;
    let session = state.session.write().await;
    let property = session.add_tag_property(TagId::from_uuid(id), &request.name, property_type)?;
    created(PropertyJson::from(&property))
}

pub async fn remove_tag_property_handler(
    State(state): State<AppState>,
    Path((id, property)): Path<(Uuid, Uuid)>,
) -> ApiResult<DeleteResponse> {
    let session = state.session.write().await;
    let deleted =
        session.remove_tag_property(TagId::from_uuid(id), FacetPropertyId::from_uuid(property))?;
    ok(DeleteResponse { deleted })
}

// =============================================================================
// ENTITY HANDLERS
// =============================================================================

pub async fn create_entity_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateEntityRequest>,
) -> ApiResult<EntityJson> {
    let session = state.session.write().await;
    let entity = session.create_entity(CategoryId::from_uuid(request.category), &request.name)?;
    created(entity_json(&session, &entity)?)
}

pub async fn get_entity_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<EntityJson> {
    let session = state.session.read().await;
    let entity = session.entity(EntityId::from_uuid(id))?;
    ok(entity_json(&session, &entity)?)
}

/// Apply a name, category and tag delta to an entity, in that order.
pub async fn update_entity_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEntityRequest>,
) -> ApiResult<EntityJson> {
    if request.name.is_none()
        && request.category.is_none()
        && request.add_tags.is_empty()
        && request.remove_tags.is_empty()
    {
        return Err(TreeStoreError::MissingArgument("name, category or tags").into());
    }

    let session = state.session.write().await;
    let id = EntityId::from_uuid(id);
    let mut entity = session.entity(id)?;
    if let Some(name) = &request.name {
        entity = session.rename_entity(id, name)?;
    }
    if let Some(category) = request.category {
        entity = session.move_entity(id, CategoryId::from_uuid(category))?;
    }
    for tag in &request.add_tags {
        entity = session.assign_tag(id, TagId::from_uuid(*tag))?;
    }
    for tag in &request.remove_tags {
        entity = session.unassign_tag(id, TagId::from_uuid(*tag))?;
    }
    ok(entity_json(&session, &entity)?)
}

pub async fn delete_entity_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DeleteResponse> {
    let session = state.session.write().await;
    let deleted = session.delete_entity(EntityId::from_uuid(id))?;
    ok(DeleteResponse { deleted })
}

/// Set values by property key; `null` clears a value. Nothing is written if
/// any entry is rejected.
pub async fn set_values_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetValuesRequest>,
) -> ApiResult<EntityJson> {
    if request.values.is_empty() {
        return Err(TreeStoreError::MissingArgument("values").into());
    }

    let session = state.session.write().await;
    let id = EntityId::from_uuid(id);
    let mut changes = Vec::with_capacity(request.values.len());
    for (key, json) in &request.values {
        let property = session.entity_property(id, key)?;
        let value = match json {
            JsonValue::Null => None,
            json => Some(json_to_value(&property, json)?),
        };
        changes.push((key.clone(), value));
    }
    let entity = session.update_entity_values(id, changes)?;
    ok(entity_json(&session, &entity)?)
}

// =============================================================================
// RELATIONSHIP HANDLERS
// =============================================================================

pub async fn list_relationships_handler(
    State(state): State<AppState>,
) -> ApiResult<Vec<RelationshipJson>> {
    let session = state.session.read().await;
    ok(session
        .all_relationships()?
        .iter()
        .map(RelationshipJson::from)
        .collect())
}

pub async fn create_relationship_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateRelationshipRequest>,
) -> ApiResult<RelationshipJson> {
    let session = state.session.write().await;
    let mut relationship = session.create_relationship(
        &request.name,
        EntityId::from_uuid(request.from),
        EntityId::from_uuid(request.to),
    )?;
    for tag in &request.tags {
        relationship =
            session.assign_relationship_tag(relationship.id(), TagId::from_uuid(*tag))?;
    }
    created(RelationshipJson::from(&relationship))
}

/// Set relationship values by property name. `null` is a type mismatch here.
pub async fn set_relationship_values_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetValuesRequest>,
) -> ApiResult<RelationshipJson> {
    if request.values.is_empty() {
        return Err(TreeStoreError::MissingArgument("values").into());
    }

    let session = state.session.write().await;
    let id = RelationshipId::from_uuid(id);
    let mut changes = Vec::with_capacity(request.values.len());
    for (key, json) in &request.values {
        let property = session.relationship_property(id, key)?;
        changes.push((key.clone(), json_to_value(&property, json)?));
    }
    let relationship = session.update_relationship_values(id, changes)?;
    ok(RelationshipJson::from(&relationship))
}

pub async fn delete_relationship_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DeleteResponse> {
    let session = state.session.write().await;
    let deleted = session.delete_relationship(RelationshipId::from_uuid(id))?;
    ok(DeleteResponse { deleted })
}

// =============================================================================
// TESTS
// =============================================================================
