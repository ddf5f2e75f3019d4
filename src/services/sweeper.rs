//! Poll sweep orchestration
//!
//! One `sweep()` selects due shipments, resolves their carrier identity,
//! checks status through the provider registry, and commits results per
//! item. Batches run sequentially with a pause in between to bound the
//! aggregate upstream call rate; members of a batch run concurrently.
//!
//! Every per-item effect is committed independently and is idempotent on
//! retry, so an overlapping or budget-cut sweep never leaves partial state.
//! Per-item failures are counted, never escalated; only a failure to list
//! candidates aborts the sweep.

use crate::domain::event::EventSource;
use crate::domain::types::{Carrier, Shipment, ShipmentStatus};
use crate::infra::{Config, Metrics};
use crate::io::provider::ProviderRegistry;
use crate::io::store::{ShipmentPatch, ShipmentStore, StoreError};
use crate::services::eligibility::EligibilityPolicy;
use crate::services::event_log::EventLog;
use crate::services::resolver;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("candidate query failed: {0}")]
    CandidateQuery(#[from] StoreError),
}

/// Outcome of one complete sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepReport {
    /// Shipments attempted against their carrier upstream
    pub processed: u64,
    /// Shipments whose status changed
    pub updated: u64,
    /// Shipments whose poll attempt failed
    pub errored: u64,
    /// Shipments filtered out or abandoned before an attempt
    pub skipped: u64,
    pub timestamp: DateTime<Utc>,
}

enum ItemOutcome {
    Updated,
    Unchanged,
    Skipped,
    Errored,
}

#[derive(Clone)]
pub struct Sweeper {
    shipments: Arc<dyn ShipmentStore>,
    event_log: Arc<EventLog>,
    providers: Arc<ProviderRegistry>,
    policy: EligibilityPolicy,
    batch_size: usize,
    batch_pause: Duration,
    budget: Duration,
    grace_period: chrono::Duration,
    floor: chrono::Duration,
    metrics: Arc<Metrics>,
}

impl Sweeper {
    pub fn new(
        shipments: Arc<dyn ShipmentStore>,
        event_log: Arc<EventLog>,
        providers: Arc<ProviderRegistry>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            shipments,
            event_log,
            providers,
            policy: EligibilityPolicy::from_config(config),
            batch_size: config.batch_size().max(1),
            batch_pause: Duration::from_millis(config.batch_pause_ms()),
            budget: Duration::from_secs(config.sweep_budget_secs()),
            grace_period: chrono::Duration::minutes(config.grace_period_mins()),
            floor: chrono::Duration::minutes(config.floor_mins()),
            metrics,
        }
    }

    /// Whether a candidate is due right now. The grace period keeps freshly
    /// booked shipments out of the sweep until the booking pipeline has
    /// settled; the floor caps attempt frequency independent of policy.
    fn is_due(&self, shipment: &Shipment, now: DateTime<Utc>) -> bool {
        if now - shipment.created_at <= self.grace_period {
            return false;
        }
        if let Some(last) = shipment.last_status_poll {
            if now - last <= self.floor {
                return false;
            }
        }
        self.policy.should_poll(shipment, now)
    }

    /// Run one complete sweep over all eligible candidates.
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let deadline = started + self.budget;
        let now = Utc::now();

        let candidates = self.shipments.query_non_terminal().await?;
        let total = candidates.len();
        let due: Vec<Shipment> =
            candidates.into_iter().filter(|s| self.is_due(s, now)).collect();

        let mut skipped = (total - due.len()) as u64;
        let mut processed = 0u64;
        let mut updated = 0u64;
        let mut errored = 0u64;

        info!(candidates = %total, due = %due.len(), "sweep_started");

        let mut batches: VecDeque<Vec<Shipment>> =
            due.chunks(self.batch_size).map(|c| c.to_vec()).collect();

        while let Some(batch) = batches.pop_front() {
            if Instant::now() >= deadline {
                let abandoned =
                    batch.len() + batches.iter().map(Vec::len).sum::<usize>();
                skipped += abandoned as u64;
                warn!(abandoned = %abandoned, "sweep_budget_exhausted");
                break;
            }

            let mut set = JoinSet::new();
            for shipment in batch {
                let sweeper = self.clone();
                set.spawn(async move { sweeper.process_one(shipment).await });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(ItemOutcome::Updated) => {
                        processed += 1;
                        updated += 1;
                    }
                    Ok(ItemOutcome::Unchanged) => processed += 1,
                    Ok(ItemOutcome::Skipped) => skipped += 1,
                    Ok(ItemOutcome::Errored) => {
                        processed += 1;
                        errored += 1;
                    }
                    Err(e) => {
                        // Still an attempt: keep processed = attempted
                        error!(error = %e, "sweep_task_panicked");
                        processed += 1;
                        errored += 1;
                    }
                }
            }

            if !batches.is_empty() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        self.metrics.record_sweep(processed, updated, errored, skipped);
        info!(
            processed = %processed,
            updated = %updated,
            errored = %errored,
            skipped = %skipped,
            elapsed_ms = %started.elapsed().as_millis(),
            "sweep_completed"
        );

        Ok(SweepReport { processed, updated, errored, skipped, timestamp: now })
    }

    /// Poll one shipment and commit its effects. Never returns an error:
    /// failures are folded into the outcome so they cannot abort the sweep.
    async fn process_one(&self, shipment: Shipment) -> ItemOutcome {
        let identity = resolver::resolve(&shipment);
        if !identity.can_poll {
            match &identity.carrier {
                Carrier::Other(_) | Carrier::Unknown => {
                    debug!(
                        shipment_id = %shipment.id,
                        carrier = %identity.carrier,
                        "carrier_unsupported_skipped"
                    );
                }
                carrier => {
                    // Eligible shipment on a recognized carrier without a
                    // usable identifier is a data problem worth surfacing.
                    // Poll timestamps stay untouched.
                    warn!(
                        shipment_id = %shipment.id,
                        carrier = %carrier,
                        "tracking_identifier_missing"
                    );
                }
            }
            return ItemOutcome::Skipped;
        }
        let tracking_id = identity.tracking_id.as_deref().unwrap_or_default();

        let provider = self.providers.provider_for(&identity.carrier);
        let call_start = Instant::now();

        match provider.check_status(tracking_id).await {
            Err(e) => {
                let now = Utc::now();
                warn!(
                    shipment_id = %shipment.id,
                    carrier = %identity.carrier,
                    provider = %provider.name(),
                    error = %e,
                    "status_check_failed"
                );
                // Advance the backoff clock even on failure so a perpetually
                // failing shipment is not retried on every sweep.
                let patch = ShipmentPatch {
                    last_status_poll: Some(now),
                    last_poll_error: Some(Some(e.to_string())),
                    ..Default::default()
                };
                if let Err(store_err) = self.shipments.update(&shipment.id, patch).await {
                    error!(shipment_id = %shipment.id, error = %store_err, "poll_bookkeeping_write_failed");
                }
                ItemOutcome::Errored
            }
            Ok(result) => {
                self.metrics.record_provider_latency(call_start.elapsed().as_millis() as u64);
                let now = Utc::now();

                if !status_changed(&shipment.status, &result.status) {
                    let patch = ShipmentPatch {
                        last_status_poll: Some(now),
                        status_last_checked: Some(now),
                        last_poll_error: Some(None),
                        ..Default::default()
                    };
                    if let Err(e) = self.shipments.update(&shipment.id, patch).await {
                        error!(shipment_id = %shipment.id, error = %e, "poll_bookkeeping_write_failed");
                        return ItemOutcome::Errored;
                    }
                    return ItemOutcome::Unchanged;
                }

                let from = shipment.parsed_status().as_str().to_string();
                let to = ShipmentStatus::parse(&result.status).as_str().to_string();

                let patch = ShipmentPatch {
                    status: Some(to.clone()),
                    last_status_poll: Some(now),
                    status_last_checked: Some(now),
                    last_poll_error: Some(None),
                    tracking_data: if result.tracking_updates.is_empty() {
                        None
                    } else {
                        Some(result.tracking_updates.clone())
                    },
                    estimated_delivery: result.estimated_delivery,
                    actual_delivery: result.actual_delivery,
                };
                if let Err(e) = self.shipments.update(&shipment.id, patch).await {
                    error!(shipment_id = %shipment.id, error = %e, "status_update_write_failed");
                    return ItemOutcome::Errored;
                }

                if let Err(e) = self
                    .event_log
                    .append_status_change(
                        &shipment.id,
                        &from,
                        &to,
                        "carrier status poll",
                        EventSource::SystemPolling,
                    )
                    .await
                {
                    warn!(shipment_id = %shipment.id, error = %e, "status_event_log_failed");
                }
                if !result.tracking_updates.is_empty() {
                    self.event_log
                        .append_tracking_updates(
                            &shipment.id,
                            &result.tracking_updates,
                            identity.carrier.as_str(),
                        )
                        .await;
                }

                info!(
                    shipment_id = %shipment.id,
                    carrier = %identity.carrier,
                    from = %from,
                    to = %to,
                    "status_changed"
                );
                ItemOutcome::Updated
            }
        }
    }
}

/// A reported status counts as a change only when it parses to a different
/// canonical status. Empty or "Unknown" reports (stub providers, carriers
/// that have not seen the shipment yet) are bookkeeping-only.
fn status_changed(stored: &str, reported: &str) -> bool {
    let reported = reported.trim();
    if reported.is_empty() || reported.eq_ignore_ascii_case("unknown") {
        return false;
    }
    ShipmentStatus::parse(stored) != ShipmentStatus::parse(reported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ShipmentId, ShipmentType, StatusResult};
    use crate::io::memory::{MemoryEventStore, MemoryShipmentStore};
    use crate::io::provider::{PollError, StatusProvider};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripted provider: maps tracking ids to canned outcomes.
    #[derive(Default)]
    struct MockProvider {
        scripts: Mutex<HashMap<String, Result<StatusResult, String>>>,
    }

    impl MockProvider {
        fn ok(self, tracking_id: &str, status: &str) -> Self {
            self.scripts.lock().insert(
                tracking_id.to_string(),
                Ok(StatusResult { status: status.to_string(), ..Default::default() }),
            );
            self
        }

        fn ok_with(self, tracking_id: &str, result: StatusResult) -> Self {
            self.scripts.lock().insert(tracking_id.to_string(), Ok(result));
            self
        }

        fn err(self, tracking_id: &str, message: &str) -> Self {
            self.scripts.lock().insert(tracking_id.to_string(), Err(message.to_string()));
            self
        }
    }

    #[async_trait]
    impl StatusProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn check_status(&self, tracking_id: &str) -> Result<StatusResult, PollError> {
            match self.scripts.lock().get(tracking_id) {
                Some(Ok(result)) => Ok(result.clone()),
                Some(Err(message)) => Err(PollError::Transient(message.clone())),
                None => Err(PollError::Transient("unscripted tracking id".to_string())),
            }
        }
    }

    struct Fixture {
        shipments: Arc<MemoryShipmentStore>,
        events: Arc<MemoryEventStore>,
        sweeper: Sweeper,
    }

    fn fixture(provider: impl StatusProvider + 'static, config: Config) -> Fixture {
        let shipments = Arc::new(MemoryShipmentStore::new());
        let events = Arc::new(MemoryEventStore::new());
        let metrics = Arc::new(Metrics::new());
        let mut registry = ProviderRegistry::new();
        registry.register(Carrier::Eshipper, Arc::new(provider));

        let event_log = Arc::new(EventLog::new(events.clone(), &config, metrics.clone()));
        let sweeper = Sweeper::new(
            shipments.clone(),
            event_log,
            Arc::new(registry),
            &config,
            metrics,
        );
        Fixture { shipments, events, sweeper }
    }

    fn config() -> Config {
        // Tight pauses, 10-minute floor so an 11-minute-old poll is due
        Config::default().with_batch_pause_ms(1).with_floor_mins(10)
    }

    fn shipment(id: &str, status: &str, tracking: &str, polled_ago_mins: Option<i64>) -> Shipment {
        let now = Utc::now();
        Shipment {
            id: ShipmentId(id.to_string()),
            status: status.to_string(),
            shipment_type: ShipmentType::Courier,
            carrier: Some("eShipper".to_string()),
            quote_carrier: None,
            carrier_system: None,
            tracking_number: Some(tracking.to_string()),
            barcode: None,
            confirmation_number: None,
            created_at: now - ChronoDuration::hours(3),
            last_status_poll: polled_ago_mins.map(|m| now - ChronoDuration::minutes(m)),
            status_last_checked: None,
            last_poll_error: None,
            estimated_delivery: None,
            actual_delivery: None,
            auto_update_blocked: false,
            tracking_data: vec![],
        }
    }

    #[tokio::test]
    async fn test_end_to_end_delivery() {
        let f = fixture(MockProvider::default().ok("TN1", "delivered"), config());
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(11)));

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.errored, 0);

        let s = f.shipments.get(&"s1".into()).await.unwrap().unwrap();
        assert_eq!(s.status, "delivered");
        assert!(s.last_status_poll.is_some());
        assert!(s.status_last_checked.is_some());

        let events = f.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["from"], "in_transit");
        assert_eq!(events[0].payload["to"], "delivered");
        assert_eq!(events[0].source, EventSource::SystemPolling);
    }

    #[tokio::test]
    async fn test_provider_errors_are_counted_not_fatal() {
        let provider = MockProvider::default()
            .ok("TN1", "in_transit")
            .err("TN2", "gateway timeout")
            .ok("TN3", "in_transit");
        let f = fixture(provider, config());
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(30)));
        f.shipments.insert(shipment("s2", "in_transit", "TN2", Some(30)));
        f.shipments.insert(shipment("s3", "in_transit", "TN3", Some(30)));

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.errored, 1);
        assert_eq!(report.updated, 0);

        // Every attempt advanced the poll clock, including the failed one
        for id in ["s1", "s2", "s3"] {
            let s = f.shipments.get(&id.into()).await.unwrap().unwrap();
            assert!(s.last_status_poll.unwrap() > Utc::now() - ChronoDuration::minutes(1), "{id}");
        }
        let failed = f.shipments.get(&"s2".into()).await.unwrap().unwrap();
        assert!(failed.last_poll_error.unwrap().contains("gateway timeout"));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_bookkeeping_only() {
        let f = fixture(MockProvider::default().ok("TN1", "In Transit"), config());
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(30)));

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.updated, 0);
        assert!(f.events.events().is_empty());

        let s = f.shipments.get(&"s1".into()).await.unwrap().unwrap();
        assert_eq!(s.status, "in_transit");
        assert!(s.status_last_checked.is_some());
    }

    #[tokio::test]
    async fn test_floor_and_grace_filtering() {
        let f = fixture(
            MockProvider::default().ok("TN1", "delivered"),
            config().with_grace_period_mins(15),
        );
        // Polled 5 minutes ago: under the 10-minute floor
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(5)));
        // Created 10 minutes ago: inside the widened grace period
        let mut fresh = shipment("s2", "in_transit", "TN2", None);
        fresh.created_at = Utc::now() - ChronoDuration::minutes(10);
        f.shipments.insert(fresh);

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn test_unsupported_carrier_skipped_without_mutation() {
        let f = fixture(MockProvider::default(), config());
        let mut s = shipment("s1", "in_transit", "JT-1", Some(30));
        s.carrier = Some("Joe's Trucking".to_string());
        f.shipments.insert(s);

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);

        let s = f.shipments.get(&"s1".into()).await.unwrap().unwrap();
        assert!(s.last_status_poll.unwrap() < Utc::now() - ChronoDuration::minutes(20));
    }

    #[tokio::test]
    async fn test_missing_tracking_id_skipped_without_mutation() {
        let f = fixture(MockProvider::default(), config());
        let mut s = shipment("s1", "in_transit", "unused", Some(30));
        s.tracking_number = None;
        f.shipments.insert(s);

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.skipped, 1);

        let s = f.shipments.get(&"s1".into()).await.unwrap().unwrap();
        assert!(s.status_last_checked.is_none());
    }

    #[tokio::test]
    async fn test_stub_provider_records_progress_for_recognized_carrier() {
        let f = fixture(MockProvider::default(), config());
        let mut s = shipment("s1", "booked", "unused", Some(700));
        s.carrier = Some("Canada Post".to_string());
        s.barcode = Some("CP-BC1".to_string());
        s.tracking_number = None;
        f.shipments.insert(s);

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.updated, 0);

        // Stub answered "Unknown": status untouched, poll clock advanced
        let s = f.shipments.get(&"s1".into()).await.unwrap().unwrap();
        assert_eq!(s.status, "booked");
        assert!(s.last_status_poll.unwrap() > Utc::now() - ChronoDuration::minutes(1));
    }

    #[tokio::test]
    async fn test_repeat_sweep_is_idempotent() {
        let result = StatusResult {
            status: "delivered".to_string(),
            tracking_updates: vec![crate::domain::types::TrackingUpdate {
                status: "Delivered".to_string(),
                description: "Left at front door".to_string(),
                location: Some("Ottawa, ON".to_string()),
                timestamp: Some(Utc::now()),
            }],
            ..Default::default()
        };
        let f = fixture(MockProvider::default().ok_with("TN1", result), config());
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(30)));

        f.sweeper.sweep().await.unwrap();
        // Second sweep: s1 is now terminal and excluded entirely
        let second = f.sweeper.sweep().await.unwrap();
        assert_eq!(second.processed, 0);

        let status_events: Vec<_> = f
            .events
            .events()
            .into_iter()
            .filter(|e| e.event_type == crate::domain::event::EventType::StatusUpdate)
            .collect();
        assert_eq!(status_events.len(), 1);
    }

    /// Provider whose task dies mid-flight.
    struct PanickingProvider;

    #[async_trait]
    impl StatusProvider for PanickingProvider {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn check_status(&self, _tracking_id: &str) -> Result<StatusResult, PollError> {
            panic!("provider fault");
        }
    }

    #[tokio::test]
    async fn test_panicked_task_counts_as_processed_and_errored() {
        let f = fixture(PanickingProvider, config());
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(30)));
        f.shipments.insert(shipment("s2", "in_transit", "TN2", Some(30)));

        let report = f.sweeper.sweep().await.unwrap();
        // processed = attempted holds even when the task dies
        assert_eq!(report.processed, 2);
        assert_eq!(report.errored, 2);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_abandons_remaining_batches() {
        let f = fixture(
            MockProvider::default().ok("TN1", "delivered"),
            config().with_sweep_budget_secs(0),
        );
        f.shipments.insert(shipment("s1", "in_transit", "TN1", Some(30)));

        let report = f.sweeper.sweep().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);

        // Nothing was attempted, so nothing was committed
        let s = f.shipments.get(&"s1".into()).await.unwrap().unwrap();
        assert_eq!(s.status, "in_transit");
    }
}
