//! Course Repository.
//!
//! Entity CRUD for courses, units, sections and assistants on top of a
//! [`KeyValueStore`] and an [`ObjectStore`], with the invariants that span
//! rows: dense sibling ordering, globally unique course codes and section
//! ids, cascade deletes, and whole-course copies.
//!
//! Reads go through the [`ReadCache`]; every write flushes it. Store failures
//! are logged here with context and returned to the caller.

mod assistants;
mod copy;
mod courses;
pub(crate) mod rows;
mod sections;
mod units;

use std::sync::Arc;

use tracing::error;

use crate::cache::ReadCache;
use crate::dynamodb::KeyValueStore;
use crate::error::{RepositoryError, Result};
use crate::objects::ObjectStore;

/// System prompt of the built-in assistant.
pub const DEFAULT_ASSISTANT_PROMPT: &str = "You are a patient, encouraging tutor. Help the \
student understand the material in this section by asking guiding questions and explaining \
concepts step by step. Do not simply give away answers to assignments.";

/// Display name of the built-in assistant.
pub const DEFAULT_ASSISTANT_NAME: &str = "Default";

#[derive(Clone)]
pub struct CourseRepository {
    store: Arc<dyn KeyValueStore>,
    objects: Arc<dyn ObjectStore>,
    cache: ReadCache,
    default_prompt: String,
}

impl std::fmt::Debug for CourseRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseRepository")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl CourseRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        objects: Arc<dyn ObjectStore>,
        cache: ReadCache,
    ) -> Self {
        Self {
            store,
            objects,
            cache,
            default_prompt: DEFAULT_ASSISTANT_PROMPT.to_string(),
        }
    }

    pub fn with_default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_prompt = prompt.into();
        self
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub fn default_prompt(&self) -> &str {
        &self.default_prompt
    }

    /// Flushes the read cache after a write and logs a failed write.
    ///
    /// The flush also runs on failure: multi-step writes may have committed
    /// some steps before failing.
    async fn finish_write<T>(&self, context: &str, result: Result<T>) -> Result<T> {
        self.cache.invalidate_all().await;
        log_failure(context, result)
    }
}

/// Logs store failures at the repository boundary. Validation failures are
/// the caller's concern and pass through silently.
fn log_failure<T>(context: &str, result: Result<T>) -> Result<T> {
    result.inspect_err(|e| {
        if !e.is_validation() {
            error!("Error {context}: {e}");
        }
    })
}

/// Renames the generic "Item" entity in conditional-write errors.
fn as_entity(err: RepositoryError, entity_type: &'static str) -> RepositoryError {
    match err {
        RepositoryError::AlreadyExists { id, .. } => RepositoryError::AlreadyExists { entity_type, id },
        RepositoryError::NotFound { id, .. } => RepositoryError::NotFound { entity_type, id },
        other => other,
    }
}

/// True when two siblings share an order value.
fn has_duplicate_orders(orders: impl IntoIterator<Item = u32>) -> bool {
    let mut seen = std::collections::HashSet::new();
    orders.into_iter().any(|order| !seen.insert(order))
}

/// Dense 1..N renumbering of `(id, order)` pairs, stable on `(order, id)`.
/// Returns only the pairs whose order changes.
fn dense_renumbering(mut siblings: Vec<(String, u32)>) -> Vec<(String, u32)> {
    siblings.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    siblings
        .into_iter()
        .zip(1u32..)
        .filter(|((_, order), position)| order != position)
        .map(|((id, _), position)| (id, position))
        .collect()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_orders() {
        assert!(!has_duplicate_orders([1, 2, 3]));
        assert!(has_duplicate_orders([1, 2, 2]));
        assert!(!has_duplicate_orders([]));
    }

    #[test]
    fn test_dense_renumbering_is_stable() {
        let changes = dense_renumbering(vec![
            ("c".into(), 3),
            ("b".into(), 2),
            ("a".into(), 2),
            ("d".into(), 7),
        ]);
        assert_eq!(
            changes,
            vec![("a".to_string(), 1), ("d".to_string(), 4)]
        );
    }

    #[test]
    fn test_dense_renumbering_noop() {
        assert!(dense_renumbering(vec![("a".into(), 1), ("b".into(), 2)]).is_empty());
    }
}
