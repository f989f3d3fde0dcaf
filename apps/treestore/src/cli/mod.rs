//! # TreeStore CLI Module
//!
//! This module implements the CLI interface for TreeStore.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show item counts
//! - `server` - Start the HTTP server
//! - `category` - Browse and edit the category tree
//! - `entity` - Create, edit and tag entities
//! - `tag` - Manage tags and their properties
//! - `relationship` - Connect entities
//!
//! Categories are addressed by slash paths from the root (`docs/guides`),
//! entities by their category path plus name (`docs/guides/readme`).

mod commands;

use crate::config::{Backend, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use treestore_core::{FacetPropertyType, TreeStoreError};
use uuid::Uuid;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// TreeStore - hierarchical, schema-flexible tagging store
///
/// Categories form a tree whose facets are inherited by everything below
/// them; tags add more facets; values are typed and never left stale.
#[derive(Parser, Debug)]
#[command(name = "treestore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Path to a TOML config file (default: ./treestore.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new database with its root category
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show item counts
    Status,

    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Browse and edit the category tree
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    /// Create, edit and tag entities
    Entity {
        #[command(subcommand)]
        action: EntityCommand,
    },

    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: TagCommand,
    },

    /// Connect entities
    Relationship {
        #[command(subcommand)]
        action: RelationshipCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// List a category's sub-categories and entities
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Create a category (the last path segment is the new name)
    Create { path: String },
    /// Rename a category
    Rename { path: String, name: String },
    /// Move a category under another one
    Move { path: String, to: String },
    /// Copy a category under another one
    Copy {
        path: String,
        to: String,
        /// Copy sub-categories and entities too
        #[arg(short, long)]
        recursive: bool,
    },
    /// Delete a category
    Rm {
        path: String,
        /// Delete sub-categories and entities too
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show the effective facets of a category
    Facet { path: String },
    /// Add a property to a category's facet
    AddProperty {
        path: String,
        name: String,
        #[arg(value_parser = parse_property_type)]
        property_type: FacetPropertyType,
    },
    /// Remove a property from a category's facet
    RemoveProperty { path: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum EntityCommand {
    /// Create an entity (`category/path/name`)
    Create { path: String },
    /// Show an entity with its tags and values
    Show { path: String },
    /// Set a property value (parsed according to the property type). The
    /// property is a name, `facet/name` or property id.
    Set {
        path: String,
        property: String,
        value: String,
    },
    /// Clear a property value
    Unset { path: String, property: String },
    /// Rename an entity
    Rename { path: String, name: String },
    /// Move an entity to another category
    Move { path: String, to: String },
    /// Copy an entity into another category
    Copy { path: String, to: String },
    /// Delete an entity
    Rm { path: String },
    /// Attach a tag
    Tag { path: String, tag: String },
    /// Detach a tag
    Untag { path: String, tag: String },
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// List tags
    Ls,
    /// Create a tag
    Create { name: String },
    /// Rename a tag
    Rename { name: String, new_name: String },
    /// Add a property to a tag's facet
    AddProperty {
        tag: String,
        name: String,
        #[arg(value_parser = parse_property_type)]
        property_type: FacetPropertyType,
    },
    /// Remove a property from a tag's facet
    RemoveProperty { tag: String, name: String },
    /// Delete a tag
    Rm {
        name: String,
        /// Detach the tag everywhere first
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RelationshipCommand {
    /// Create a relationship between two entities (by entity path)
    Create {
        name: String,
        from: String,
        to: String,
    },
    /// List relationships, optionally only those touching an entity
    Ls {
        #[arg(short, long)]
        entity: Option<String>,
    },
    /// Attach a tag to a relationship
    Tag { id: Uuid, tag: String },
    /// Set a relationship property value (from its tags)
    Set {
        id: Uuid,
        property: String,
        value: String,
    },
    /// Delete a relationship by id
    Rm { id: Uuid },
}

fn parse_property_type(s: &str) -> Result<FacetPropertyType, String> {
    s.parse().map_err(|e: TreeStoreError| e.to_string())
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve the effective configuration: flags > env > file > defaults.
pub fn resolve_config(cli: &Cli) -> Result<Config, TreeStoreError> {
    let mut config = Config::load(cli.config.as_deref())?.with_env_overrides();
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TreeStoreError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Category { action }) => {
            let session = load_session(&config)?;
            cmd_category(&session, action, json_mode)
        }
        Some(Commands::Entity { action }) => {
            let session = load_session(&config)?;
            cmd_entity(&session, action, json_mode)
        }
        Some(Commands::Tag { action }) => {
            let session = load_session(&config)?;
            cmd_tag(&session, action, json_mode)
        }
        Some(Commands::Relationship { action }) => {
            let session = load_session(&config)?;
            cmd_relationship(&session, action, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
