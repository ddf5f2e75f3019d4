//! Carrier identity resolution from noisy historical shipment data
//!
//! Carrier names were stored in different places by successive booking
//! pipelines, and eShipper resells courier sub-carriers under their own
//! brand names. Resolution is one explicit normalization pass:
//!
//! 1. The internal carrier-system marker, when present, is authoritative —
//!    a "FedEx" shipment booked through eShipper must poll eShipper.
//! 2. Otherwise the carrier name (first non-empty of the stored fields) is
//!    matched against a curated list of eShipper sub-carrier brands.
//! 3. Otherwise the raw name stands as-is.
//!
//! Tracking identifiers also live under carrier-specific historical fields.
//! Resolution fails closed: no identifier, or no recognized carrier at all,
//! means the shipment is not pollable.

use crate::domain::types::{normalize_token, Carrier, Shipment};

/// Sub-carrier brand names commonly stored for eShipper bookings.
pub const ESHIPPER_SUB_CARRIERS: &[&str] =
    &["fedex", "purolator", "canpar", "dhl", "gls", "ups", "flashbird"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierIdentity {
    pub carrier: Carrier,
    pub tracking_id: Option<String>,
    pub can_poll: bool,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn classify_marker(marker: &str) -> Option<Carrier> {
    match normalize_token(marker).as_str() {
        "eshipper" => Some(Carrier::Eshipper),
        "freightcom" => Some(Carrier::Freightcom),
        "canadapost" | "canada_post" => Some(Carrier::CanadaPost),
        _ => None,
    }
}

fn classify_name(name: &str) -> Carrier {
    let normalized = normalize_token(name);
    if normalized.contains("eshipper") {
        return Carrier::Eshipper;
    }
    if normalized.contains("freightcom") {
        return Carrier::Freightcom;
    }
    if normalized.contains("canada_post") || normalized.contains("canadapost") {
        return Carrier::CanadaPost;
    }
    if ESHIPPER_SUB_CARRIERS.iter().any(|brand| normalized.contains(brand)) {
        return Carrier::Eshipper;
    }
    Carrier::Other(normalized)
}

/// Resolve carrier identity and tracking identifier for one shipment.
pub fn resolve(shipment: &Shipment) -> CarrierIdentity {
    let name = non_empty(&shipment.carrier).or_else(|| non_empty(&shipment.quote_carrier));

    let carrier = match non_empty(&shipment.carrier_system).and_then(classify_marker) {
        Some(carrier) => carrier,
        None => match name {
            Some(name) => classify_name(name),
            None => Carrier::Unknown,
        },
    };

    let tracking_id = match &carrier {
        Carrier::Eshipper => non_empty(&shipment.tracking_number)
            .or_else(|| non_empty(&shipment.barcode)),
        Carrier::Freightcom => non_empty(&shipment.confirmation_number)
            .or_else(|| non_empty(&shipment.tracking_number)),
        Carrier::CanadaPost => non_empty(&shipment.barcode)
            .or_else(|| non_empty(&shipment.tracking_number)),
        Carrier::Other(_) | Carrier::Unknown => non_empty(&shipment.tracking_number)
            .or_else(|| non_empty(&shipment.barcode)),
    }
    .map(str::to_string);

    // Fail closed: never attempt to poll an unrecognized upstream, and never
    // poll without an identifier.
    let can_poll = tracking_id.is_some()
        && !matches!(carrier, Carrier::Other(_) | Carrier::Unknown);

    CarrierIdentity { carrier, tracking_id, can_poll }
}
