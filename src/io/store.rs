//! Store interfaces and file-backed implementations
//!
//! The sweeper and event log only see the `ShipmentStore` / `EventStore`
//! traits; production wiring uses the file-backed stores below, tests use
//! the in-memory ones from `io::memory`. Shipment writes are partial
//! (`ShipmentPatch`) and atomic per document; the event file is append-only
//! JSONL (one JSON object per line).

use crate::domain::event::{Event, EventType};
use crate::domain::types::{Shipment, ShipmentId, TrackingUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("shipment not found: {0}")]
    NotFound(ShipmentId),
    #[error("store lookup failed: {0}")]
    Lookup(String),
}

/// Partial shipment write. `None` fields are left untouched;
/// `last_poll_error` uses a nested Option so it can be cleared explicitly.
#[derive(Debug, Clone, Default)]
pub struct ShipmentPatch {
    pub status: Option<String>,
    pub last_status_poll: Option<DateTime<Utc>>,
    pub status_last_checked: Option<DateTime<Utc>>,
    pub last_poll_error: Option<Option<String>>,
    pub tracking_data: Option<Vec<TrackingUpdate>>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
}

impl ShipmentPatch {
    pub fn apply(&self, shipment: &mut Shipment) {
        if let Some(status) = &self.status {
            shipment.status = status.clone();
        }
        if let Some(ts) = self.last_status_poll {
            shipment.last_status_poll = Some(ts);
        }
        if let Some(ts) = self.status_last_checked {
            shipment.status_last_checked = Some(ts);
        }
        if let Some(err) = &self.last_poll_error {
            shipment.last_poll_error = err.clone();
        }
        if let Some(updates) = &self.tracking_data {
            shipment.tracking_data = updates.clone();
        }
        if let Some(ts) = self.estimated_delivery {
            shipment.estimated_delivery = Some(ts);
        }
        if let Some(ts) = self.actual_delivery {
            shipment.actual_delivery = Some(ts);
        }
    }
}

/// Shipment persistence seen by the core. Reads may be eventually
/// consistent; `update` is atomic per document.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn get(&self, id: &ShipmentId) -> Result<Option<Shipment>, StoreError>;
    /// All shipments whose parsed status is non-terminal.
    async fn query_non_terminal(&self) -> Result<Vec<Shipment>, StoreError>;
    async fn update(&self, id: &ShipmentId, patch: ShipmentPatch) -> Result<(), StoreError>;
}

/// Append-only event persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: Event) -> Result<(), StoreError>;
    /// Most recent events of one type for a shipment, newest first.
    async fn query_recent(
        &self,
        shipment_id: &ShipmentId,
        event_type: EventType,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError>;
}

/// Shipments persisted as one JSON snapshot file, cached in memory.
pub struct FileShipmentStore {
    path: PathBuf,
    shipments: RwLock<HashMap<ShipmentId, Shipment>>,
}

impl FileShipmentStore {
    /// Load the snapshot; a missing file starts empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut shipments = HashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let list: Vec<Shipment> = serde_json::from_str(&content)?;
            for shipment in list {
                shipments.insert(shipment.id.clone(), shipment);
            }
        }

        info!(path = %path.display(), shipments = %shipments.len(), "shipment_store_loaded");
        Ok(Self { path, shipments: RwLock::new(shipments) })
    }

    fn persist(&self, snapshot: &[Shipment]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), shipments = %snapshot.len(), "shipment_store_persisted");
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for FileShipmentStore {
    async fn get(&self, id: &ShipmentId) -> Result<Option<Shipment>, StoreError> {
        Ok(self.shipments.read().get(id).cloned())
    }

    async fn query_non_terminal(&self) -> Result<Vec<Shipment>, StoreError> {
        Ok(self
            .shipments
            .read()
            .values()
            .filter(|s| !s.parsed_status().is_terminal())
            .cloned()
            .collect())
    }

    async fn update(&self, id: &ShipmentId, patch: ShipmentPatch) -> Result<(), StoreError> {
        // The lock is held through persist so snapshots reach disk in apply
        // order; releasing first would let concurrent updates commit an older
        // snapshot over a newer one.
        let mut shipments = self.shipments.write();
        let shipment = shipments.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply(shipment);
        let snapshot: Vec<Shipment> = shipments.values().cloned().collect();
        self.persist(&snapshot)
    }
}

/// Events persisted as append-only JSONL, cached in memory for lookups.
pub struct FileEventStore {
    path: PathBuf,
    events: RwLock<Vec<Event>>,
}

impl FileEventStore {
    /// Load existing events; malformed lines are skipped with a warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut events = Vec::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(path = %path.display(), line = %(line_no + 1), error = %e, "event_line_skipped");
                    }
                }
            }
        }

        info!(path = %path.display(), events = %events.len(), "event_store_loaded");
        Ok(Self { path, events: RwLock::new(events) })
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, event: Event) -> Result<(), StoreError> {
        let line = serde_json::to_string(&event)?;
        self.append_line(&line)?;
        self.events.write().push(event);
        Ok(())
    }

    async fn query_recent(
        &self,
        shipment_id: &ShipmentId,
        event_type: EventType,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read();
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| &e.shipment_id == shipment_id && e.event_type == event_type)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }
}
