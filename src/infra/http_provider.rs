use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::EnrichmentProvider;
use crate::config::ServiceConfig;
use crate::domain::{AttributeSpec, EnrichmentQuery};
use crate::error::{FetchError, Result};

/// Live enrichment service reached over HTTP GET:
/// `{base_url}/{endpoint}?lat=..&lon=..[&year=..]&key=..`, answering with a
/// flat JSON object of attributes.
pub struct HttpEnrichmentProvider {
    client: reqwest::Client,
    service: String,
    url: String,
    api_key: String,
    attributes: Vec<AttributeSpec>,
}

impl HttpEnrichmentProvider {
    pub fn new(service: &ServiceConfig, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            service: service.name.clone(),
            url: join_url(&service.base_url, &service.endpoint),
            api_key: api_key.to_string(),
            attributes: service.attributes.clone(),
        })
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    fn service(&self) -> &str {
        &self.service
    }

    async fn fetch(&self, query: &EnrichmentQuery) -> std::result::Result<BTreeMap<String, f64>, FetchError> {
        let mut params = vec![
            ("lat", query.latitude.to_string()),
            ("lon", query.longitude.to_string()),
        ];
        if let Some(year) = query.year {
            params.push(("year", year.to_string()));
        }
        params.push(("key", self.api_key.clone()));

        debug!(service = %self.service, "GET {}", self.url);
        let resp = self.client.get(&self.url).query(&params).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: Value = resp.json().await.map_err(|e| FetchError::Decode(e.to_string()))?;
        decode_attributes(&body, &self.attributes)
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// Pick the configured attributes out of a flat JSON object. Numbers and
/// numeric strings are accepted; anything else is ignored. A body with none of
/// the attributes is an error, a partial one is returned as-is.
pub fn decode_attributes(
    body: &Value,
    attributes: &[AttributeSpec],
) -> std::result::Result<BTreeMap<String, f64>, FetchError> {
    let object = body
        .as_object()
        .ok_or_else(|| FetchError::Decode("expected a JSON object".to_string()))?;

    let decoded: BTreeMap<String, f64> = attributes
        .iter()
        .filter_map(|spec| {
            let value = object
                .get(spec.response_field())
                .or_else(|| object.get(&spec.name))?;
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            number.is_finite().then(|| (spec.name.clone(), number))
        })
        .collect();

    if decoded.is_empty() {
        return Err(FetchError::EmptyResponse);
    }
    Ok(decoded)
}
