//! Status provider interface and carrier registry
//!
//! One provider per carrier system behind a uniform trait. Timeouts and
//! network failures surface as `PollError::Transient` and are retried on the
//! next sweep — they are never treated as "no status change". Carriers we
//! recognize but have no integration for go through the stub provider, which
//! always answers so the poll attempt still records progress.

use crate::domain::types::{Carrier, StatusResult};
use crate::infra::Config;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    /// Timeout, connection failure, or upstream error status.
    /// Retried naturally on the next scheduled sweep.
    #[error("transient provider failure: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PollError::Transient("request timed out".to_string())
        } else if e.is_connect() {
            PollError::Transient(format!("connection failed: {e}"))
        } else {
            PollError::Transient(e.to_string())
        }
    }
}

/// Uniform status-check interface, one implementation per carrier system.
#[async_trait]
pub trait StatusProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check_status(&self, tracking_id: &str) -> Result<StatusResult, PollError>;
}

/// Fallback for carriers without a tracking integration. Returns an
/// "Unknown" result instead of erroring so the attempt still counts.
pub struct StubProvider;

#[async_trait]
impl StatusProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn check_status(&self, _tracking_id: &str) -> Result<StatusResult, PollError> {
        Ok(StatusResult {
            status: "Unknown".to_string(),
            message: Some("no tracking integration for this carrier".to_string()),
            ..Default::default()
        })
    }
}

/// Maps resolved carrier identities to their providers.
pub struct ProviderRegistry {
    providers: FxHashMap<Carrier, Arc<dyn StatusProvider>>,
    stub: Arc<dyn StatusProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: FxHashMap::default(), stub: Arc::new(StubProvider) }
    }

    /// Build the production registry from configured provider endpoints.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        if !config.eshipper().base_url.is_empty() {
            registry.register(
                Carrier::Eshipper,
                Arc::new(crate::io::eshipper::EshipperProvider::new(config.eshipper())),
            );
        }
        if !config.freightcom().base_url.is_empty() {
            registry.register(
                Carrier::Freightcom,
                Arc::new(crate::io::freightcom::FreightcomProvider::new(config.freightcom())),
            );
        }
        registry
    }

    pub fn register(&mut self, carrier: Carrier, provider: Arc<dyn StatusProvider>) {
        self.providers.insert(carrier, provider);
    }

    /// Provider for a carrier, falling back to the stub.
    pub fn provider_for(&self, carrier: &Carrier) -> Arc<dyn StatusProvider> {
        self.providers.get(carrier).cloned().unwrap_or_else(|| self.stub.clone())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// GET a JSON document with optional bearer auth. Upstream non-2xx and
/// malformed bodies map to `PollError::Transient`.
pub(crate) async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
) -> Result<Value, PollError> {
    let mut request = client.get(url);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PollError::Transient(format!("upstream returned {status}")));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| PollError::Transient(format!("malformed payload: {e}")))
}

/// First non-empty string found under any of the given keys.
pub(crate) fn extract_str(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Some(s.trim().to_string());
            }
        }
    }
    None
}

/// First array found under any of the given keys.
pub(crate) fn extract_array<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    for key in keys {
        if let Some(arr) = value.get(key).and_then(Value::as_array) {
            return Some(arr);
        }
    }
    None
}

/// Parse carrier timestamps: RFC 3339, "YYYY-MM-DD HH:MM:SS", or bare dates.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    None
}

pub(crate) fn extract_timestamp(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    extract_str(value, keys).and_then(|raw| parse_timestamp(&raw))
}
