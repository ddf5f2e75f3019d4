//! eShipper tracking provider
//!
//! eShipper aggregates courier sub-carriers (FedEx, Purolator, Canpar, ...)
//! behind one tracking API. Response shapes vary by sub-carrier: the status
//! may live under `status`, `trackingStatus`, or `currentStatus`, and scan
//! history under `events`, `history`, or `scanHistory`, sometimes nested in a
//! `trackingInformation` envelope. Normalization flattens all of them.

use crate::domain::types::{StatusResult, TrackingUpdate};
use crate::infra::config::ProviderSection;
use crate::io::provider::{
    extract_array, extract_str, extract_timestamp, fetch_json, PollError, StatusProvider,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct EshipperProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl EshipperProvider {
    pub fn new(section: &ProviderSection) -> Self {
        // Client built once for connection reuse
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
impl StatusProvider for EshipperProvider {
    fn name(&self) -> &'static str {
        "eshipper"
    }

    async fn check_status(&self, tracking_id: &str) -> Result<StatusResult, PollError> {
        let url = format!("{}/track/{}", self.base_url, tracking_id);
        let payload = fetch_json(&self.client, &url, self.api_key.as_deref()).await?;
        Ok(normalize(&payload))
    }
}

/// Flatten an eShipper tracking payload into a `StatusResult`.
fn normalize(payload: &Value) -> StatusResult {
    let root = payload.get("trackingInformation").unwrap_or(payload);

    let status = extract_str(root, &["status", "trackingStatus", "currentStatus"])
        .unwrap_or_default();
    let location = extract_str(root, &["currentLocation", "location"]);
    let timestamp = extract_timestamp(root, &["statusDate", "lastUpdated"]);

    let mut tracking_updates = Vec::new();
    if let Some(events) = extract_array(root, &["events", "history", "scanHistory"]) {
        for event in events {
            tracking_updates.push(TrackingUpdate {
                status: extract_str(event, &["status", "statusName"]).unwrap_or_default(),
                description: extract_str(event, &["description", "statusDescription", "comment"])
                    .unwrap_or_default(),
                location: extract_str(event, &["location", "city", "depot"]),
                timestamp: extract_timestamp(event, &["date", "dateTime", "timestamp"]),
            });
        }
    }

    StatusResult {
        status,
        location,
        timestamp,
        tracking_updates,
        estimated_delivery: extract_timestamp(root, &["estimatedDeliveryDate", "expectedDelivery"]),
        actual_delivery: extract_timestamp(root, &["deliveryDate", "deliveredOn"]),
        message: None,
    }
}
