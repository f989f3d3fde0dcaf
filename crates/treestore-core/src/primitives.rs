//! # Primitives
//!
//! Hardcoded constants and name validation for the TreeStore core.
//!
//! These values are compiled into the binary and are immutable at runtime.

use crate::TreeStoreError;

/// Name given to the single parentless category.
pub const ROOT_CATEGORY_NAME: &str = "_<root>";

/// Parent marker used in the uniqueness key of items without a parent.
///
/// `uniqueName = lower(name) + "_" + (parent id | ROOT_MARKER)`
pub const ROOT_MARKER: &str = "<root>";

/// Separator of category paths (`docs/guides/intro`).
pub const PATH_SEPARATOR: char = '/';

/// Maximum length for item and property names, in bytes.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum depth of the category tree.
///
/// Every ancestor walk and recursive traversal is bounded by this value, so
/// a corrupted parent chain is reported instead of looping forever.
pub const MAX_TREE_DEPTH: usize = 256;

/// Validate a user supplied item or property name.
///
/// A name is valid if it is non-empty, at most `MAX_NAME_LENGTH` bytes,
/// carries no leading/trailing whitespace and does not contain the path
/// separator.
pub fn validate_name(name: &str) -> Result<(), TreeStoreError> {
    if name.is_empty() {
        return Err(TreeStoreError::InvalidName("name must not be empty".to_string()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(TreeStoreError::InvalidName(format!(
            "name length {} exceeds maximum {} bytes",
            name.len(),
            MAX_NAME_LENGTH
        )));
    }

    if name.trim() != name {
        return Err(TreeStoreError::InvalidName(format!(
            "'{}' has leading or trailing whitespace",
            name
        )));
    }

    if name.contains(PATH_SEPARATOR) {
        return Err(TreeStoreError::InvalidName(format!(
            "'{}' contains '{}'",
            name, PATH_SEPARATOR
        )));
    }

    Ok(())
}

/// Reject a write whose deepest category, `name`, would end up at `depth`
/// (the root is at depth 0).
pub fn validate_depth(name: &str, depth: usize) -> Result<(), TreeStoreError> {
    if depth > MAX_TREE_DEPTH {
        return Err(TreeStoreError::TreeTooDeep {
            name: name.to_string(),
            depth,
        });
    }
    Ok(())
}

/// Build a uniqueness key from a name and its optional parent key.
#[must_use]
pub fn unique_key(name: &str, parent: Option<impl std::fmt::Display>) -> String {
    match parent {
        Some(parent) => format!("{}_{}", name.to_lowercase(), parent),
        None => format!("{}_{}", name.to_lowercase(), ROOT_MARKER),
    }
}
