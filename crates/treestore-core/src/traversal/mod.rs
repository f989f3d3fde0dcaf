//! # Subtree Traversal
//!
//! The two recursive algorithms that operate across the category and entity
//! repositories:
//!
//! - `CategoryCopyTraverser`: copy a category (and optionally its whole
//!   subtree) under a destination
//! - `CategoryRemovalTraverser`: delete a category if empty, or with its
//!   whole subtree
//!
//! Neither is atomic end-to-end. Each repository write commits on its own,
//! so a failure mid-traversal leaves the writes already done in place.
//! Traversals over the same subtree must not run concurrently.

mod copy;
mod removal;

pub use copy::CategoryCopyTraverser;
pub use removal::CategoryRemovalTraverser;

use crate::category::Category;
use crate::entity::Entity;
use crate::primitives::MAX_TREE_DEPTH;
use crate::repository::{CategoryRepository, EntityRepository};
use crate::types::Named;
use crate::TreeStoreError;

/// Everything below a category, gathered before any write happens.
#[derive(Debug, Clone, Default)]
pub struct Subtree {
    /// Descendant categories in depth-first pre-order (parents before
    /// children). The start category itself is not included.
    pub categories: Vec<Category>,
    /// Entities of the start category and of every descendant.
    pub entities: Vec<Entity>,
    /// Levels below the start category (0 without sub-categories).
    pub height: usize,
}

impl Subtree {
    /// Number of collected items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len() + self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.entities.is_empty()
    }
}

/// Depth-first pre-collection of the subtree below `start`.
///
/// Fails with `InvalidTree` if the stored tree is deeper than
/// `MAX_TREE_DEPTH`.
pub fn collect_subtree<C, E>(
    categories: &C,
    entities: &E,
    start: &Category,
) -> Result<Subtree, TreeStoreError>
where
    C: CategoryRepository + ?Sized,
    E: EntityRepository + ?Sized,
{
    let mut subtree = Subtree::default();
    let mut stack: Vec<(Category, usize)> = vec![(start.clone(), 0)];

    while let Some((category, depth)) = stack.pop() {
        if depth > MAX_TREE_DEPTH {
            return Err(TreeStoreError::InvalidTree(format!(
                "subtree of '{}' exceeds {} levels",
                start.name(),
                MAX_TREE_DEPTH
            )));
        }

        subtree.height = subtree.height.max(depth);
        subtree.entities.extend(entities.find_by_category(&category)?);

        let children = categories.find_by_parent(&category)?;
        for child in children.into_iter().rev() {
            stack.push((child, depth + 1));
        }
        if depth > 0 {
            subtree.categories.push(category);
        }
    }

    tracing::debug!(
        category = %start.id(),
        categories = subtree.categories.len(),
        entities = subtree.entities.len(),
        "Collected subtree"
    );
    Ok(subtree)
}
