use async_trait::async_trait;
use metrics::counter;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, warn};

use crate::app::ports::{EnrichmentClient, EnrichmentProvider, ServiceCallStats};
use crate::config::Config;
use crate::domain::{AttributeSpec, DataOrigin, EnrichmentQuery, EnrichmentResult};
use crate::error::{FetchError, Result};
use crate::infra::http_provider::HttpEnrichmentProvider;
use crate::pipeline::processing::fallback;

/// Enrichment source that synthesizes deterministic values from the query
pub struct SyntheticProvider {
    service: String,
    attributes: Vec<AttributeSpec>,
}

impl SyntheticProvider {
    pub fn new(service: &str, attributes: Vec<AttributeSpec>) -> Self {
        Self {
            service: service.to_string(),
            attributes,
        }
    }

    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    pub fn synthesize(&self, query: &EnrichmentQuery) -> BTreeMap<String, f64> {
        fallback::synthesize(&self.service, &self.attributes, query)
    }
}

#[async_trait]
impl EnrichmentProvider for SyntheticProvider {
    fn service(&self) -> &str {
        &self.service
    }

    async fn fetch(&self, query: &EnrichmentQuery) -> std::result::Result<BTreeMap<String, f64>, FetchError> {
        Ok(self.synthesize(query))
    }
}

/// Wraps a live provider with bounded immediate retries and falls back to
/// synthetic values once they are exhausted. Without a live provider every
/// call is served from the fallback.
pub struct ResilientEnrichmentClient {
    live: Option<Box<dyn EnrichmentProvider>>,
    fallback: SyntheticProvider,
    max_retries: u32,
    live_results: AtomicUsize,
    fallback_results: AtomicUsize,
}

impl ResilientEnrichmentClient {
    pub fn new(live: Box<dyn EnrichmentProvider>, fallback: SyntheticProvider, max_retries: u32) -> Self {
        Self {
            live: Some(live),
            fallback,
            max_retries: max_retries.max(1),
            live_results: AtomicUsize::new(0),
            fallback_results: AtomicUsize::new(0),
        }
    }

    pub fn fallback_only(fallback: SyntheticProvider) -> Self {
        Self {
            live: None,
            fallback,
            max_retries: 0,
            live_results: AtomicUsize::new(0),
            fallback_results: AtomicUsize::new(0),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    async fn fetch_live(&self, live: &dyn EnrichmentProvider, query: &EnrichmentQuery) -> Option<BTreeMap<String, f64>> {
        for attempt in 1..=self.max_retries {
            match live.fetch(query).await {
                Ok(attributes) => return Some(attributes),
                Err(e) => {
                    warn!(
                        service = %live.service(),
                        "Attempt {}/{} failed: {}",
                        attempt,
                        self.max_retries,
                        e
                    );
                    counter!("agri_enrichment_attempt_failures_total", "service" => live.service().to_string())
                        .increment(1);
                }
            }
        }
        error!(
            service = %live.service(),
            "Final failure after {} attempts at ({}, {}); using fallback values",
            self.max_retries,
            query.latitude,
            query.longitude
        );
        None
    }
}

#[async_trait]
impl EnrichmentClient for ResilientEnrichmentClient {
    fn service(&self) -> &str {
        &self.fallback.service
    }

    fn attributes(&self) -> &[AttributeSpec] {
        self.fallback.attributes()
    }

    async fn fetch(&self, query: &EnrichmentQuery) -> EnrichmentResult {
        if let Some(live) = self.live.as_deref() {
            if let Some(attributes) = self.fetch_live(live, query).await {
                self.live_results.fetch_add(1, Ordering::Relaxed);
                return EnrichmentResult {
                    service: self.service().to_string(),
                    origin: DataOrigin::Live,
                    attributes,
                };
            }
        }

        self.fallback_results.fetch_add(1, Ordering::Relaxed);
        counter!("agri_enrichment_fallbacks_total", "service" => self.service().to_string()).increment(1);
        EnrichmentResult {
            service: self.service().to_string(),
            origin: DataOrigin::Fallback,
            attributes: self.fallback.synthesize(query),
        }
    }

    fn stats(&self) -> ServiceCallStats {
        ServiceCallStats {
            service: self.service().to_string(),
            live: self.live_results.load(Ordering::Relaxed),
            fallback: self.fallback_results.load(Ordering::Relaxed),
        }
    }
}

/// Build one client per configured service. Services without an API key,
/// or every service when running offline, are fallback-only.
pub fn build_clients(config: &Config) -> Result<Vec<Box<dyn EnrichmentClient>>> {
    let timeout = Duration::from_secs(config.retry.timeout_secs);
    let mut clients: Vec<Box<dyn EnrichmentClient>> = Vec::with_capacity(config.services.len());

    for service in config.missing_api_keys() {
        warn!(
            service = %service.name,
            "No API key configured ({}); enrichment will use fallback values only",
            service.api_key_env.as_deref().unwrap_or("no key variable")
        );
    }

    for service in &config.services {
        let fallback = SyntheticProvider::new(&service.name, service.attributes.clone());
        let client = match (&service.api_key, config.offline) {
            (Some(api_key), false) => {
                let live = HttpEnrichmentProvider::new(service, api_key, timeout)?;
                ResilientEnrichmentClient::new(Box::new(live), fallback, config.retry.max_retries)
            }
            _ => ResilientEnrichmentClient::fallback_only(fallback),
        };
        clients.push(Box::new(client));
    }

    Ok(clients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Fails a fixed number of times, then succeeds
    struct FlakyProvider {
        failures_left: Mutex<u32>,
        calls: Arc<AtomicUsize>,
    }

    impl FlakyProvider {
        fn new(failures: u32) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Self {
                failures_left: Mutex::new(failures),
                calls: calls.clone(),
            };
            (provider, calls)
        }
    }

    #[async_trait]
    impl EnrichmentProvider for FlakyProvider {
        fn service(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self, _query: &EnrichmentQuery) -> std::result::Result<BTreeMap<String, f64>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(FetchError::Timeout);
            }
            Ok(BTreeMap::from([("rainfall".to_string(), 1234.0)]))
        }
    }

    fn synthetic() -> SyntheticProvider {
        SyntheticProvider::new(
            "flaky",
            vec![
                AttributeSpec::new("rainfall", 800.0, 1800.0, 0),
                AttributeSpec::new("temperature_anomaly", -1.0, 1.0, 2),
            ],
        )
    }

    fn query() -> EnrichmentQuery {
        EnrichmentQuery {
            latitude: 18.52,
            longitude: 73.85,
            year: Some(2020),
        }
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let (provider, calls) = FlakyProvider::new(2);
        let client = ResilientEnrichmentClient::new(Box::new(provider), synthetic(), 3);

        let result = client.fetch(&query()).await;
        assert_eq!(result.origin, DataOrigin::Live);
        assert_eq!(result.attributes["rainfall"], 1234.0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.stats().live, 1);
    }

    #[tokio::test]
    async fn test_falls_back_after_exhausting_retries() {
        let (provider, calls) = FlakyProvider::new(10);
        let client = ResilientEnrichmentClient::new(Box::new(provider), synthetic(), 3);

        let result = client.fetch(&query()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.origin, DataOrigin::Fallback);
        // Fallback is atomic: every attribute is synthetic
        assert_eq!(result.attributes, synthetic().synthesize(&query()));
        assert_eq!(client.stats(), ServiceCallStats { service: "flaky".to_string(), live: 0, fallback: 1 });
    }

    #[tokio::test]
    async fn test_fallback_only_never_calls_live() {
        let client = ResilientEnrichmentClient::fallback_only(synthetic());
        assert!(!client.is_live());

        let first = client.fetch(&query()).await;
        let second = client.fetch(&query()).await;
        assert_eq!(first.origin, DataOrigin::Fallback);
        assert_eq!(first, second);
        assert_eq!(client.stats().fallback, 2);
    }

    #[test]
    fn test_build_clients_without_keys_is_fallback_only() {
        let config = Config::default();
        let clients = build_clients(&config).unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].service(), "bhuvan");
        assert_eq!(clients[1].attributes().len(), 2);
    }
}
