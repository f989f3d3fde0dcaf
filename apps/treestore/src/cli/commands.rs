//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. Every
//! command prints plain text, or JSON with `--json-mode` (the same views the
//! HTTP API returns).

use super::{CategoryCommand, EntityCommand, RelationshipCommand, TagCommand};
use crate::api::{self, CategoryJson, EntityJson, PropertyJson, RelationshipJson, TagJson};
use crate::config::{Backend, Config};
use serde::Serialize;
use treestore_core::{
    Category, Entity, EntityId, FacetValue, Named, Relationship, RelationshipId, Session, Tag,
    TreeStoreError, addressed_values,
    primitives::PATH_SEPARATOR,
};

// =============================================================================
// HELPERS
// =============================================================================

/// Open the session selected by the configuration.
pub fn load_session(config: &Config) -> Result<Session, TreeStoreError> {
    match config.backend {
        Backend::Redb => Session::with_redb(&config.database),
        Backend::Memory => {
            tracing::warn!("Using the in-memory backend: changes are lost on exit");
            Ok(Session::new())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TreeStoreError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| TreeStoreError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Split `a/b/name` into (`a/b`, `name`).
fn split_path(path: &str) -> Result<(&str, &str), TreeStoreError> {
    let trimmed = path.trim_matches(PATH_SEPARATOR);
    let (parent, name) = trimmed.rsplit_once(PATH_SEPARATOR).unwrap_or(("", trimmed));
    if name.is_empty() {
        return Err(TreeStoreError::MissingArgument("name"));
    }
    Ok((parent, name))
}

fn require_tag(session: &Session, name: &str) -> Result<Tag, TreeStoreError> {
    session
        .find_tag(name)?
        .ok_or_else(|| TreeStoreError::PathNotFound(name.to_string()))
}

fn category_json(session: &Session, category: &Category) -> Result<CategoryJson, TreeStoreError> {
    Ok(CategoryJson::new(category, session.category_path(category)?))
}

fn entity_json(session: &Session, entity: &Entity) -> Result<EntityJson, TreeStoreError> {
    Ok(EntityJson::new(entity, &session.entity_values(entity.id())?))
}

fn report_category(
    session: &Session,
    category: &Category,
    verb: &str,
    json_mode: bool,
) -> Result<(), TreeStoreError> {
    if json_mode {
        return print_json(&category_json(session, category)?);
    }
    println!("{} {}", verb, session.category_path(category)?);
    Ok(())
}

fn report_entity(
    session: &Session,
    entity: &Entity,
    json_mode: bool,
) -> Result<(), TreeStoreError> {
    let view = entity_json(session, entity)?;
    if json_mode {
        return print_json(&view);
    }

    let location = match entity.category() {
        Some(id) => session.category_path(&session.category(id)?)?,
        None => "-".to_string(),
    };
    println!("Entity:   {}", entity.name());
    println!("Id:       {}", entity.id());
    println!("Category: {}", location);
    if !view.tags.is_empty() {
        let names: Vec<&str> = view.tags.iter().map(|t| t.name.as_str()).collect();
        println!("Tags:     {}", names.join(", "));
    }
    for entry in session.entity_values(entity.id())? {
        println!("  {} = {}", entry.key, entry.value);
    }
    Ok(())
}

fn endpoint_name(session: &Session, id: Option<EntityId>) -> Result<String, TreeStoreError> {
    match id {
        Some(id) => Ok(session.entity(id)?.name().to_string()),
        None => Ok("-".to_string()),
    }
}

fn print_relationship_line(
    session: &Session,
    relationship: &Relationship,
) -> Result<(), TreeStoreError> {
    println!(
        "{} {} -> {} ({})",
        relationship.name(),
        endpoint_name(session, relationship.from_entity())?,
        endpoint_name(session, relationship.to_entity())?,
        relationship.id()
    );
    Ok(())
}

fn report_relationship(
    session: &Session,
    relationship: &Relationship,
    json_mode: bool,
) -> Result<(), TreeStoreError> {
    if json_mode {
        return print_json(&RelationshipJson::from(relationship));
    }
    print_relationship_line(session, relationship)?;
    for tag in relationship.tags() {
        println!("  #{}", tag.name());
    }
    for entry in addressed_values(relationship, &relationship.effective_facets()) {
        println!("  {} = {}", entry.key, entry.value);
    }
    Ok(())
}

fn report_deleted(what: &str, deleted: bool, json_mode: bool) -> Result<(), TreeStoreError> {
    if json_mode {
        return print_json(&api::DeleteResponse { deleted });
    }
    if deleted {
        println!("Deleted {}", what);
    } else {
        println!("Refused to delete {}", what);
    }
    Ok(())
}

// =============================================================================
// INIT / STATUS / SERVER
// =============================================================================

/// Initialize a new database and create its root category.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), TreeStoreError> {
    if config.backend == Backend::Memory {
        println!("The memory backend needs no initialization");
        return Ok(());
    }

    if config.database.exists() {
        if !force {
            return Err(TreeStoreError::IoError(format!(
                "Database {:?} already exists. Use --force to overwrite.",
                config.database
            )));
        }
        std::fs::remove_file(&config.database)
            .map_err(|e| TreeStoreError::IoError(format!("Remove old database: {}", e)))?;
    }

    let session = Session::with_redb(&config.database)?;
    let root = session.root()?;
    tracing::debug!(root = %root.id(), "Initialized database");
    println!("Initialized new redb database at {:?}", config.database);
    Ok(())
}

/// Show item counts.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), TreeStoreError> {
    let session = load_session(config)?;
    let metrics = session.metrics()?;

    if json_mode {
        return print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "backend": config.backend.name(),
            "categories": metrics.categories,
            "entities": metrics.entities,
            "tags": metrics.tags,
            "relationships": metrics.relationships,
        }));
    }

    println!("TreeStore Status");
    println!("================");
    println!("Database: {:?}", config.database);
    println!("Backend:  {}", config.backend.name());
    println!();
    println!("Categories:    {}", metrics.categories);
    println!("Entities:      {}", metrics.entities);
    println!("Tags:          {}", metrics.tags);
    println!("Relationships: {}", metrics.relationships);
    Ok(())
}

/// Start the HTTP server.
pub async fn cmd_server(config: &Config) -> Result<(), TreeStoreError> {
    let session = load_session(config)?;
    session.root()?;

    println!("TreeStore Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", config.server.host);
    println!("  Port:       {}", config.server.port);
    println!("  Backend:    {}", config.backend.name());
    println!("  Database:   {:?}", config.database);
    println!("  Rate limit: {}/s", config.server.rate_limit);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(session, &config.server).await
}

// =============================================================================
// CATEGORY COMMANDS
// =============================================================================

pub fn cmd_category(
    session: &Session,
    action: CategoryCommand,
    json_mode: bool,
) -> Result<(), TreeStoreError> {
    match action {
        CategoryCommand::Ls { path } => {
            let category = session.resolve_path(&path)?;
            let children = session.children(&category)?;
            let entities = session.category_entities(&category)?;

            if json_mode {
                return print_json(&api::CategoryListing {
                    category: category_json(session, &category)?,
                    children: children
                        .iter()
                        .map(|c| category_json(session, c))
                        .collect::<Result<_, _>>()?,
                    entities: entities
                        .iter()
                        .map(|e| entity_json(session, e))
                        .collect::<Result<_, _>>()?,
                });
            }

            println!("{}", session.category_path(&category)?);
            for child in &children {
                println!("  {}/", child.name());
            }
            for entity in &entities {
                println!("  {}", entity.name());
            }
            Ok(())
        }
        CategoryCommand::Create { path } => {
            let (parent, name) = split_path(&path)?;
            let parent = session.resolve_path(parent)?;
            let category = session.create_category(parent.id(), name)?;
            report_category(session, &category, "Created", json_mode)
        }
        CategoryCommand::Rename { path, name } => {
            let category = session.resolve_path(&path)?;
            let category = session.rename_category(category.id(), &name)?;
            report_category(session, &category, "Renamed to", json_mode)
        }
        CategoryCommand::Move { path, to } => {
            let category = session.resolve_path(&path)?;
            let target = session.resolve_path(&to)?;
            let category = session.move_category(category.id(), target.id())?;
            report_category(session, &category, "Moved to", json_mode)
        }
        CategoryCommand::Copy {
            path,
            to,
            recursive,
        } => {
            let source = session.resolve_path(&path)?;
            let target = session.resolve_path(&to)?;
            let copy = session.copy_category(source.id(), target.id(), recursive)?;
            report_category(session, &copy, "Copied to", json_mode)
        }
        CategoryCommand::Rm { path, recursive } => {
            let category = session.resolve_path(&path)?;
            let deleted = session.delete_category(category.id(), recursive)?;
            if !deleted && !json_mode && !recursive {
                println!("Category is not empty; use --recursive to delete its content");
            }
            report_deleted(&path, deleted, json_mode)
        }
        CategoryCommand::Facet { path } => {
            let category = session.resolve_path(&path)?;
            let facets = session.category_facets(category.id())?;

            if json_mode {
                let properties: Vec<PropertyJson> = facets
                    .iter()
                    .flat_map(|facet| facet.properties().iter().map(PropertyJson::from))
                    .collect();
                return print_json(&properties);
            }

            for facet in &facets {
                println!("[{}]", facet.name());
                for property in facet.properties() {
                    println!("  {}: {}", property.name(), property.property_type());
                }
            }
            Ok(())
        }
        CategoryCommand::AddProperty {
            path,
            name,
            property_type,
        } => {
            let category = session.resolve_path(&path)?;
            let property = session.add_category_property(category.id(), &name, property_type)?;
            if json_mode {
                return print_json(&PropertyJson::from(&property));
            }
            println!("Added {}: {} to {}", name, property_type, path);
            Ok(())
        }
        CategoryCommand::RemoveProperty { path, name } => {
            let category = session.resolve_path(&path)?;
            let property = category
                .facet()
                .get_property_by_name(&name)
                .ok_or_else(|| TreeStoreError::UnknownProperty(name.clone()))?;
            let removed = session.remove_category_property(category.id(), property.id())?;
            report_deleted(&name, removed, json_mode)
        }
    }
}

// =============================================================================
// ENTITY COMMANDS
// =============================================================================

pub fn cmd_entity(
    session: &Session,
    action: EntityCommand,
    json_mode: bool,
) -> Result<(), TreeStoreError> {
    match action {
        EntityCommand::Create { path } => {
            let (category, name) = split_path(&path)?;
            let category = session.resolve_path(category)?;
            let entity = session.create_entity(category.id(), name)?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Show { path } => {
            let entity = session.resolve_entity_path(&path)?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Set {
            path,
            property,
            value,
        } => {
            let entity = session.resolve_entity_path(&path)?;
            let definition = session.entity_property(entity.id(), &property)?;
            let value = FacetValue::parse_as(&definition, &value)?;
            let entity = session.set_entity_value(entity.id(), &property, value)?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Unset { path, property } => {
            let entity = session.resolve_entity_path(&path)?;
            let entity = session.clear_entity_value(entity.id(), &property)?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Rename { path, name } => {
            let entity = session.resolve_entity_path(&path)?;
            let entity = session.rename_entity(entity.id(), &name)?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Move { path, to } => {
            let entity = session.resolve_entity_path(&path)?;
            let target = session.resolve_path(&to)?;
            let entity = session.move_entity(entity.id(), target.id())?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Copy { path, to } => {
            let entity = session.resolve_entity_path(&path)?;
            let target = session.resolve_path(&to)?;
            let copy = session.copy_entity(entity.id(), target.id())?;
            report_entity(session, &copy, json_mode)
        }
        EntityCommand::Rm { path } => {
            let entity = session.resolve_entity_path(&path)?;
            let deleted = session.delete_entity(entity.id())?;
            if !deleted && !json_mode {
                println!("Entity is still referenced by a relationship");
            }
            report_deleted(&path, deleted, json_mode)
        }
        EntityCommand::Tag { path, tag } => {
            let entity = session.resolve_entity_path(&path)?;
            let tag = require_tag(session, &tag)?;
            let entity = session.assign_tag(entity.id(), tag.id())?;
            report_entity(session, &entity, json_mode)
        }
        EntityCommand::Untag { path, tag } => {
            let entity = session.resolve_entity_path(&path)?;
            let tag = require_tag(session, &tag)?;
            let entity = session.unassign_tag(entity.id(), tag.id())?;
            report_entity(session, &entity, json_mode)
        }
    }
}

// =============================================================================
// TAG COMMANDS
// =============================================================================

pub fn cmd_tag(session: &Session, action: TagCommand, json_mode: bool) -> Result<(), TreeStoreError> {
    match action {
        TagCommand::Ls => {
            let tags = session.all_tags()?;
            if json_mode {
                let views: Vec<TagJson> = tags.iter().map(TagJson::from).collect();
                return print_json(&views);
            }
            for tag in &tags {
                let properties: Vec<String> = tag
                    .facet()
                    .properties()
                    .iter()
                    .map(|p| format!("{}: {}", p.name(), p.property_type()))
                    .collect();
                println!("{} [{}]", tag.name(), properties.join(", "));
            }
            Ok(())
        }
        TagCommand::Create { name } => {
            let tag = session.create_tag(&name)?;
            if json_mode {
                return print_json(&TagJson::from(&tag));
            }
            println!("Created tag {}", tag.name());
            Ok(())
        }
        TagCommand::Rename { name, new_name } => {
            let tag = require_tag(session, &name)?;
            let tag = session.rename_tag(tag.id(), &new_name)?;
            if json_mode {
                return print_json(&TagJson::from(&tag));
            }
            println!("Renamed tag {} to {}", name, tag.name());
            Ok(())
        }
        TagCommand::AddProperty {
            tag,
            name,
            property_type,
        } => {
            let found = require_tag(session, &tag)?;
            let property = session.add_tag_property(found.id(), &name, property_type)?;
            if json_mode {
                return print_json(&PropertyJson::from(&property));
            }
            println!("Added {}: {} to tag {}", name, property_type, tag);
            Ok(())
        }
        TagCommand::RemoveProperty { tag, name } => {
            let found = require_tag(session, &tag)?;
            let property = found
                .facet()
                .get_property_by_name(&name)
                .ok_or_else(|| TreeStoreError::UnknownProperty(name.clone()))?;
            let removed = session.remove_tag_property(found.id(), property.id())?;
            report_deleted(&name, removed, json_mode)
        }
        TagCommand::Rm { name, force } => {
            let tag = require_tag(session, &name)?;
            let deleted = session.delete_tag(tag.id(), force)?;
            if !deleted && !json_mode {
                println!("Tag is still in use; use --force to detach it everywhere");
            }
            report_deleted(&name, deleted, json_mode)
        }
    }
}

// =============================================================================
// RELATIONSHIP COMMANDS
// =============================================================================

pub fn cmd_relationship(
    session: &Session,
    action: RelationshipCommand,
    json_mode: bool,
) -> Result<(), TreeStoreError> {
    match action {
        RelationshipCommand::Create { name, from, to } => {
            let from = session.resolve_entity_path(&from)?;
            let to = session.resolve_entity_path(&to)?;
            let relationship = session.create_relationship(&name, from.id(), to.id())?;
            report_relationship(session, &relationship, json_mode)
        }
        RelationshipCommand::Ls { entity } => {
            let relationships = match entity {
                Some(path) => {
                    let entity = session.resolve_entity_path(&path)?;
                    session.relationships_of(entity.id())?
                }
                None => session.all_relationships()?,
            };

            if json_mode {
                let views: Vec<RelationshipJson> =
                    relationships.iter().map(RelationshipJson::from).collect();
                return print_json(&views);
            }

            for relationship in &relationships {
                print_relationship_line(session, relationship)?;
            }
            Ok(())
        }
        RelationshipCommand::Tag { id, tag } => {
            let tag = require_tag(session, &tag)?;
            let relationship =
                session.assign_relationship_tag(RelationshipId::from_uuid(id), tag.id())?;
            report_relationship(session, &relationship, json_mode)
        }
        RelationshipCommand::Set {
            id,
            property,
            value,
        } => {
            let id = RelationshipId::from_uuid(id);
            let definition = session.relationship_property(id, &property)?;
            let value = FacetValue::parse_as(&definition, &value)?;
            let relationship = session.set_relationship_value(id, &property, value)?;
            report_relationship(session, &relationship, json_mode)
        }
        RelationshipCommand::Rm { id } => {
            let deleted = session.delete_relationship(RelationshipId::from_uuid(id))?;
            report_deleted(&id.to_string(), deleted, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_takes_last_segment() {
        assert_eq!(split_path("/docs/guides/").expect("split"), ("docs", "guides"));
        assert_eq!(split_path("docs").expect("split"), ("", "docs"));
        assert!(matches!(
            split_path("/"),
            Err(TreeStoreError::MissingArgument(_))
        ));
    }

    #[test]
    fn commands_drive_a_session() {
        let session = Session::new();
        cmd_category(
            &session,
            CategoryCommand::Create {
                path: "docs".into(),
            },
            true,
        )
        .expect("create category");
        cmd_entity(
            &session,
            EntityCommand::Create {
                path: "docs/readme".into(),
            },
            true,
        )
        .expect("create entity");
        cmd_tag(
            &session,
            TagCommand::Create {
                name: "draft".into(),
            },
            true,
        )
        .expect("create tag");
        cmd_entity(
            &session,
            EntityCommand::Tag {
                path: "docs/readme".into(),
                tag: "DRAFT".into(),
            },
            true,
        )
        .expect("tag");

        let readme = session.resolve_entity_path("docs/readme").expect("readme");
        assert_eq!(readme.tags().len(), 1);

        let result = cmd_tag(
            &session,
            TagCommand::Rm {
                name: "missing".into(),
                force: false,
            },
            true,
        );
        assert!(matches!(result, Err(TreeStoreError::PathNotFound(_))));
    }

    #[test]
    fn init_refuses_existing_database_without_force() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config = Config {
            database: temp.path().join("store.redb"),
            ..Config::default()
        };

        cmd_init(&config, false).expect("first init");
        assert!(matches!(
            cmd_init(&config, false),
            Err(TreeStoreError::IoError(_))
        ));
        cmd_init(&config, true).expect("forced init");
    }
}
