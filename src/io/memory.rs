//! In-memory store implementations
//!
//! Used by tests and the simulation path; same trait contract as the
//! file-backed stores.

use crate::domain::event::{Event, EventType};
use crate::domain::types::{Shipment, ShipmentId};
use crate::io::store::{EventStore, ShipmentPatch, ShipmentStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryShipmentStore {
    shipments: RwLock<HashMap<ShipmentId, Shipment>>,
}

impl MemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, shipment: Shipment) {
        self.shipments.write().insert(shipment.id.clone(), shipment);
    }
}

#[async_trait]
impl ShipmentStore for MemoryShipmentStore {
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
        let mut shipments = self.shipments.write();
        let shipment = shipments.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply(shipment);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, append order.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: Event) -> Result<(), StoreError> {
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
