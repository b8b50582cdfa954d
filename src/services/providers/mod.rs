//! Metagame data provider abstraction
//!
//! Archetype standings are fetched from an external aggregator, never computed
//! here. Each source returns finalized records: tier, confidence and normalized
//! name are filled in even when the upstream data left them empty.

use crate::{error::AppResult, models::AggregatedMeta};

pub mod http;
pub mod snapshot;

pub use http::HttpMetaSource;
pub use snapshot::SnapshotMetaSource;

/// Trait for metagame data sources
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetaSource: Send + Sync {
    /// Fetch the aggregated archetype list for a format
    async fn get_aggregated_meta(&self, format: &str) -> AppResult<AggregatedMeta>;

    /// Source name for logging and debugging
    fn name(&self) -> &'static str;
}
