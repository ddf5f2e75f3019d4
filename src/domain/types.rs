//! Shared types for shipment status reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Newtype wrapper for shipment IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub String);

impl ShipmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShipmentId {
    fn from(s: &str) -> Self {
        ShipmentId(s.to_string())
    }
}

/// Normalize a raw status/carrier string for comparison:
/// lowercase, trimmed, spaces and hyphens collapsed to underscores.
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Shipment lifecycle status, parsed from the raw stored spelling.
///
/// Historical data contains spelling variants ("canceled"/"cancelled",
/// "void"/"voided", "in transit"/"in_transit"); parsing collapses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipmentStatus {
    Booked,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
    Void,
    Other(String),
}

impl ShipmentStatus {
    pub fn parse(raw: &str) -> Self {
        match normalize_token(raw).as_str() {
            "booked" => ShipmentStatus::Booked,
            "in_transit" => ShipmentStatus::InTransit,
            "out_for_delivery" => ShipmentStatus::OutForDelivery,
            "delivered" => ShipmentStatus::Delivered,
            "cancelled" | "canceled" => ShipmentStatus::Cancelled,
            "void" | "voided" => ShipmentStatus::Void,
            other => ShipmentStatus::Other(other.to_string()),
        }
    }

    /// Terminal statuses permanently stop polling.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered | ShipmentStatus::Cancelled | ShipmentStatus::Void
        )
    }

    /// Statuses indicating a courier shipment is actively moving.
    pub fn is_in_motion(&self) -> bool {
        matches!(self, ShipmentStatus::InTransit | ShipmentStatus::OutForDelivery)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ShipmentStatus::Booked => "booked",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Cancelled => "cancelled",
            ShipmentStatus::Void => "void",
            ShipmentStatus::Other(s) => s,
        }
    }
}

/// Shipment mode, parsed leniently from stored type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentType {
    Freight,
    Courier,
}

impl ShipmentType {
    pub fn parse(raw: &str) -> Self {
        let n = normalize_token(raw);
        if n.contains("freight") || n.contains("ltl") {
            ShipmentType::Freight
        } else {
            ShipmentType::Courier
        }
    }
}

/// Carrier identity, resolved from noisy historical fields.
///
/// Eshipper and Freightcom are the carrier systems we poll directly.
/// CanadaPost is recognized but has no tracking integration yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Carrier {
    Eshipper,
    Freightcom,
    CanadaPost,
    /// A recognizable carrier name we have no integration for.
    Other(String),
    /// No carrier name stored at all.
    Unknown,
}

impl Carrier {
    pub fn as_str(&self) -> &str {
        match self {
            Carrier::Eshipper => "eshipper",
            Carrier::Freightcom => "freightcom",
            Carrier::CanadaPost => "canadapost",
            Carrier::Other(s) => s,
            Carrier::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One carrier scan event from a tracking history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub status: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Normalized result of one carrier status check. Transient — never
/// persisted as-is; the sweeper projects it into shipment fields and events.
#[derive(Debug, Clone, Default)]
pub struct StatusResult {
    pub status: String,
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub tracking_updates: Vec<TrackingUpdate>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    /// Explanatory message for stub results.
    pub message: Option<String>,
}

/// A shipment as stored. Created by the booking pipeline; this core mutates
/// only the status/poll bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    /// Raw lifecycle status as stored (heterogeneous spellings).
    pub status: String,
    pub shipment_type: ShipmentType,

    // Carrier metadata, redundant across historical data sources.
    #[serde(default)]
    pub carrier: Option<String>,
    /// Carrier name recorded on the booking quote.
    #[serde(default)]
    pub quote_carrier: Option<String>,
    /// Explicit internal carrier-system marker; authoritative when present.
    #[serde(default)]
    pub carrier_system: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub confirmation_number: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_status_poll: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_poll_error: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_delivery: Option<DateTime<Utc>>,

    /// Manual-override flag: when set, this core never touches the shipment.
    #[serde(default)]
    pub auto_update_blocked: bool,

    /// Last known tracking history snapshot, written on a status change.
    #[serde(default)]
    pub tracking_data: Vec<TrackingUpdate>,
}

impl Shipment {
    pub fn parsed_status(&self) -> ShipmentStatus {
        ShipmentStatus::parse(&self.status)
    }
}
