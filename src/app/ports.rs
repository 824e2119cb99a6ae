use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{AttributeSpec, EnrichmentQuery, EnrichmentResult, IntegratedRecord};
use crate::error::{FetchError, Result};

/// A source of enrichment attributes that may fail (a live service) or not
/// (the synthetic source).
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn service(&self) -> &str;
    async fn fetch(&self, query: &EnrichmentQuery) -> std::result::Result<BTreeMap<String, f64>, FetchError>;
}

/// What the integration engine talks to: every call resolves to live or
/// fallback attributes, never to an error.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    fn service(&self) -> &str;
    /// Attributes this client contributes to each output row
    fn attributes(&self) -> &[AttributeSpec];
    async fn fetch(&self, query: &EnrichmentQuery) -> EnrichmentResult;
    /// Live and fallback results served so far
    fn stats(&self) -> ServiceCallStats;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCallStats {
    pub service: String,
    pub live: usize,
    pub fallback: usize,
}

/// Destination of integrated rows. Writes are serialized by the implementation.
#[async_trait]
pub trait IntegratedOutputPort: Send + Sync {
    async fn write_integrated_record(&self, record: &IntegratedRecord) -> Result<()>;

    /// Flush buffered rows; called once after the last record
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Result of versioning the output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing changed since the last commit
    Unchanged,
    Committed { commit_id: String, pushed: bool },
}

/// Records a written output file in version control
#[async_trait]
pub trait PublishPort: Send + Sync {
    async fn publish(&self, file: &Path, message: &str) -> Result<PublishOutcome>;
}
