//! Services - business logic and sweep orchestration
//!
//! This module contains the core reconciliation logic:
//! - `sweeper` - periodic sweep over poll-eligible shipments
//! - `eligibility` - decides whether a shipment is due for a poll
//! - `resolver` - carrier identity resolution from noisy stored fields
//! - `event_log` - idempotent timeline event recording

pub mod eligibility;
pub mod event_log;
pub mod resolver;
pub mod sweeper;

// Re-export commonly used types
pub use eligibility::EligibilityPolicy;
pub use event_log::EventLog;
pub use resolver::{resolve, CarrierIdentity};
pub use sweeper::{SweepReport, Sweeper};
