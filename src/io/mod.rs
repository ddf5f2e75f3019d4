//! External interfaces - stores and carrier status providers
//!
//! - `store` - shipment/event store traits and file-backed implementations
//! - `memory` - in-memory stores for tests and simulation
//! - `provider` - status provider trait, registry, stub
//! - `eshipper` / `freightcom` - carrier tracking adapters

pub mod eshipper;
pub mod freightcom;
pub mod memory;
pub mod provider;
pub mod store;

pub use provider::{PollError, ProviderRegistry, StatusProvider, StubProvider};
pub use store::{EventStore, ShipmentPatch, ShipmentStore, StoreError};
