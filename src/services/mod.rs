// Service exports
pub mod cache;
pub mod catalog;
pub mod engine;
pub mod explainer;
pub mod memory;
pub mod postgres;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use catalog::{CatalogError, CatalogReader};
pub use engine::{MatchError, MatchService};
pub use explainer::{
    Explainer, ExplainerError, ExplainerLimits, Explanation, ExplanationBackend,
    ExplanationRequest, HttpExplanationBackend,
};
pub use memory::{InMemoryCatalog, InMemoryResultStore};
pub use postgres::{PostgresClient, PostgresError};
pub use store::{MatchResultStore, StoreError, WriteOutcome};
