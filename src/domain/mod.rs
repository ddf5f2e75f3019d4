//! Domain layer - core business types
//!
//! - `types` - Shipment, statuses, carriers, normalized status results
//! - `event` - Append-only timeline events and the tracking fingerprint

pub mod event;
pub mod types;
