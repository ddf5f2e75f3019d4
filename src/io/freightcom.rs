//! Freightcom tracking provider
//!
//! Freight/LTL shipments tracked by confirmation number. Payloads nest the
//! shipment under a `shipment` key and call scan events `checkpoints` or
//! `statusLogs`; city and province arrive as separate fields.

use crate::domain::types::{StatusResult, TrackingUpdate};
use crate::infra::config::ProviderSection;
use crate::io::provider::{
    extract_array, extract_str, extract_timestamp, fetch_json, PollError, StatusProvider,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct FreightcomProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FreightcomProvider {
    pub fn new(section: &ProviderSection) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            api_key: section.api_key.clone(),
        }
    }
}

#[async_trait]
impl StatusProvider for FreightcomProvider {
    fn name(&self) -> &'static str {
        "freightcom"
    }

    async fn check_status(&self, tracking_id: &str) -> Result<StatusResult, PollError> {
        let url = format!("{}/shipments/{}/status", self.base_url, tracking_id);
        let payload = fetch_json(&self.client, &url, self.api_key.as_deref()).await?;
        Ok(normalize(&payload))
    }
}

/// City + province combined when no single location field exists.
fn checkpoint_location(event: &Value) -> Option<String> {
    if let Some(location) = extract_str(event, &["location"]) {
        return Some(location);
    }
    let city = extract_str(event, &["city"]);
    let province = extract_str(event, &["province", "state"]);
    match (city, province) {
        (Some(c), Some(p)) => Some(format!("{}, {}", c, p)),
        (Some(c), None) => Some(c),
        (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

/// Flatten a Freightcom status payload into a `StatusResult`.
fn normalize(payload: &Value) -> StatusResult {
    let root = payload.get("shipment").unwrap_or(payload);

    let status = extract_str(root, &["status", "shipmentStatus"]).unwrap_or_default();
    let location = checkpoint_location(root);
    let timestamp = extract_timestamp(root, &["statusDate", "lastUpdated"]);

    let mut tracking_updates = Vec::new();
    if let Some(checkpoints) = extract_array(root, &["checkpoints", "events", "statusLogs"]) {
        for event in checkpoints {
            tracking_updates.push(TrackingUpdate {
                status: extract_str(event, &["status", "statusCode"]).unwrap_or_default(),
                description: extract_str(event, &["activity", "statusDescription", "description"])
                    .unwrap_or_default(),
                location: checkpoint_location(event),
                timestamp: extract_timestamp(event, &["date", "statusDate", "timestamp"]),
            });
        }
    }

    StatusResult {
        status,
        location,
        timestamp,
        tracking_updates,
        estimated_delivery: extract_timestamp(root, &["estimatedDeliveryDate"]),
        actual_delivery: extract_timestamp(root, &["actualDeliveryDate", "deliveredDate"]),
        message: None,
    }
}
