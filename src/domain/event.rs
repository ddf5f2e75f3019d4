//! Append-only event model for a shipment's audit timeline
//!
//! Events are never mutated or deleted. Status-change and tracking-update
//! events carry enough payload for the dedup checks in the event log:
//! (from, to, source) for status changes, a content fingerprint for
//! tracking updates.

use crate::domain::types::{normalize_token, ShipmentId, TrackingUpdate};
use chrono::{DateTime, Utc};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::hash::Hasher;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) event id
pub fn new_event_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StatusUpdate,
    TrackingUpdate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StatusUpdate => "status_update",
            EventType::TrackingUpdate => "tracking_update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    SystemPolling,
    User,
    Carrier,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::SystemPolling => "system_polling",
            EventSource::User => "user",
            EventSource::Carrier => "carrier",
        }
    }
}

/// One record in a shipment's timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub shipment_id: ShipmentId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub source: EventSource,
    pub payload: serde_json::Value,
}

impl Event {
    /// Build a status-change event.
    pub fn status_change(
        shipment_id: &ShipmentId,
        from: &str,
        to: &str,
        reason: &str,
        source: EventSource,
    ) -> Self {
        Self {
            event_id: new_event_id(),
            shipment_id: shipment_id.clone(),
            timestamp: Utc::now(),
            event_type: EventType::StatusUpdate,
            source,
            payload: json!({
                "from": from,
                "to": to,
                "reason": reason,
            }),
        }
    }

    /// Build a tracking-update event carrying the update's fingerprint.
    pub fn tracking_update(
        shipment_id: &ShipmentId,
        update: &TrackingUpdate,
        carrier: &str,
        fingerprint: &str,
    ) -> Self {
        Self {
            event_id: new_event_id(),
            shipment_id: shipment_id.clone(),
            timestamp: Utc::now(),
            event_type: EventType::TrackingUpdate,
            source: EventSource::SystemPolling,
            payload: json!({
                "status": update.status,
                "description": update.description,
                "location": update.location,
                "timestamp": update.timestamp,
                "carrier": carrier,
                "fingerprint": fingerprint,
            }),
        }
    }
}

/// Deterministic digest over a tracking update's canonical field subset.
///
/// Timestamps are truncated to the minute before hashing; this rounding rule
/// decides which near-duplicate scans collapse and must stay stable across
/// releases.
pub fn tracking_fingerprint(update: &TrackingUpdate) -> String {
    let minute = update
        .timestamp
        .map(|t| t.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_default();
    let canonical = format!(
        "{}|{}|{}|{}",
        normalize_token(&update.status),
        normalize_token(&update.description),
        normalize_token(update.location.as_deref().unwrap_or("")),
        minute,
    );

    let mut hasher = FxHasher::default();
    hasher.write(canonical.as_bytes());
    format!("{:016x}", hasher.finish())
}
