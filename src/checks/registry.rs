//! Check registry
//!
//! Ordered table from check id to constructor. Ordering is deterministic and
//! drives execution order. A scenario document may replace the active list
//! without code changes; ids it names must be registered here to run.

use std::sync::Arc;

use super::{crud, indexes, pipeline, search, Check, CheckContext};

/// Built-in catalogue, in execution order
pub const DEFAULT_CHECKS: [&str; 16] = [
    "index",
    "crud-1",
    "crud-2",
    "crud-3",
    "crud-4",
    "crud-5",
    "crud-6",
    "crud-7",
    "crud-8",
    "pipeline-1",
    "pipeline-2",
    "search-index",
    "search-1",
    "search-2",
    "vector-search-index",
    "vector-search-1",
];

/// Builds a check for one run
pub type CheckFactory = Arc<dyn Fn(&CheckContext) -> Box<dyn Check> + Send + Sync>;

/// One registered check
#[derive(Clone)]
pub struct CheckDefinition {
    pub id: String,
    pub build: CheckFactory,
}

impl std::fmt::Debug for CheckDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckDefinition").field("id", &self.id).finish()
    }
}

/// Ordered catalogue of checks
#[derive(Clone, Debug, Default)]
pub struct CheckRegistry {
    definitions: Vec<CheckDefinition>,
}

impl CheckRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in check in [`DEFAULT_CHECKS`] order
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("index", |ctx| Box::new(indexes::CompoundIndex::new(ctx)))
            .register("crud-1", |ctx| Box::new(crud::PagedFind::new(ctx)))
            .register("crud-2", |ctx| Box::new(crud::FindById::new(ctx)))
            .register("crud-3", |ctx| Box::new(crud::DistinctValues::new(ctx)))
            .register("crud-4", |ctx| Box::new(crud::FilteredFind::new(ctx)))
            .register("crud-5", |ctx| Box::new(crud::InsertListing::new(ctx)))
            .register("crud-6", |ctx| Box::new(crud::UpdateField::new(ctx)))
            .register("crud-7", |ctx| Box::new(crud::AddReview::new(ctx)))
            .register("crud-8", |ctx| Box::new(crud::DeleteListing::new(ctx)))
            .register("pipeline-1", |ctx| Box::new(pipeline::PriceStatistics::new(ctx)))
            .register("pipeline-2", |ctx| Box::new(pipeline::SuperhostAnalytics::new(ctx)))
            .register("search-index", |ctx| Box::new(indexes::SearchIndex::new(ctx)))
            .register("search-1", |ctx| Box::new(search::Autocomplete::new(ctx)))
            .register("search-2", |ctx| Box::new(search::FacetSearch::new(ctx)))
            .register("vector-search-index", |ctx| {
                Box::new(indexes::VectorSearchIndex::new(ctx))
            })
            .register("vector-search-1", |ctx| Box::new(search::VectorSearch::new(ctx)));
        registry
    }

    /// Add a check, or replace the constructor of an id already registered
    /// while keeping its position
    pub fn register<F>(&mut self, id: impl Into<String>, build: F) -> &mut Self
    where
        F: Fn(&CheckContext) -> Box<dyn Check> + Send + Sync + 'static,
    {
        let id = id.into();
        let build: CheckFactory = Arc::new(build);
        match self.definitions.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.build = build,
            None => self.definitions.push(CheckDefinition { id, build }),
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&CheckDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Registered ids in catalogue order
    pub fn ids(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Active check list for a run
    ///
    /// A non-empty dynamic list wins; otherwise the catalogue order is used.
    /// Duplicate ids in the dynamic list are dropped after their first
    /// occurrence so every id maps to exactly one outcome.
    pub fn active_list(&self, dynamic: Option<Vec<String>>) -> Vec<String> {
        match dynamic {
            Some(list) if !list.is_empty() => {
                let mut seen = std::collections::HashSet::new();
                list.into_iter()
                    .filter(|id| seen.insert(id.clone()))
                    .collect()
            }
            _ => self.ids(),
        }
    }

    /// Construct the check registered under `id`
    pub fn build(&self, id: &str, ctx: &CheckContext) -> Option<Box<dyn Check>> {
        self.get(id).map(|d| (d.build)(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckFailure;

    struct Noop;

    #[async_trait::async_trait]
    impl Check for Noop {
        async fn run(&self) -> Result<(), CheckFailure> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_order_matches_default_list() {
        let registry = CheckRegistry::builtin();
        assert_eq!(registry.ids(), DEFAULT_CHECKS.map(String::from).to_vec());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = CheckRegistry::new();
        registry
            .register("a", |_| Box::new(Noop))
            .register("b", |_| Box::new(Noop))
            .register("a", |_| Box::new(Noop));
        assert_eq!(registry.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_dynamic_list_overrides_default() {
        let registry = CheckRegistry::builtin();
        let active = registry.active_list(Some(vec![
            "crud-2".into(),
            "index".into(),
            "crud-2".into(),
        ]));
        assert_eq!(active, vec!["crud-2", "index"]);
    }

    #[test]
    fn test_empty_dynamic_list_falls_back() {
        let registry = CheckRegistry::builtin();
        assert_eq!(registry.active_list(Some(Vec::new())).len(), DEFAULT_CHECKS.len());
        assert_eq!(registry.active_list(None).len(), DEFAULT_CHECKS.len());
    }
}
