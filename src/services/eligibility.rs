//! Poll eligibility policy
//!
//! Pure function of (shipment, now). Freshness scales with how "in motion" a
//! shipment is: couriers actively moving are polled every few minutes, dormant
//! couriers every few hours, and slow freight twice a day to control upstream
//! API cost. Terminal shipments are never polled again.

use crate::domain::types::{Shipment, ShipmentType};
use crate::infra::Config;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    freight_interval: Duration,
    courier_active_interval: Duration,
    courier_idle_interval: Duration,
}

impl EligibilityPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            freight_interval: Duration::hours(config.freight_hours()),
            courier_active_interval: Duration::minutes(config.courier_active_mins()),
            courier_idle_interval: Duration::hours(config.courier_idle_hours()),
        }
    }

    /// Whether a shipment is due for a status poll at `now`.
    ///
    /// Thresholds are strict: a shipment polled exactly 12h ago is not yet
    /// due. A shipment never polled is due immediately (the sweeper's grace
    /// period keeps freshly booked shipments out).
    pub fn should_poll(&self, shipment: &Shipment, now: DateTime<Utc>) -> bool {
        let status = shipment.parsed_status();
        if status.is_terminal() {
            return false;
        }
        if shipment.auto_update_blocked {
            return false;
        }

        let interval = match shipment.shipment_type {
            ShipmentType::Freight => self.freight_interval,
            ShipmentType::Courier if status.is_in_motion() => self.courier_active_interval,
            ShipmentType::Courier => self.courier_idle_interval,
        };

        match shipment.last_status_poll {
            None => true,
            Some(last) => now - last > interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ShipmentId;

    fn policy() -> EligibilityPolicy {
        EligibilityPolicy::from_config(&Config::default())
    }

    fn shipment(
        status: &str,
        shipment_type: ShipmentType,
        now: DateTime<Utc>,
        polled_ago: Option<Duration>,
    ) -> Shipment {
        Shipment {
            id: ShipmentId("s1".to_string()),
            status: status.to_string(),
            shipment_type,
            carrier: Some("eShipper".to_string()),
            quote_carrier: None,
            carrier_system: None,
            tracking_number: Some("TN1".to_string()),
            barcode: None,
            confirmation_number: None,
            created_at: now - Duration::days(2),
            last_status_poll: polled_ago.map(|ago| now - ago),
            status_last_checked: None,
            last_poll_error: None,
            estimated_delivery: None,
            actual_delivery: None,
            auto_update_blocked: false,
            tracking_data: vec![],
        }
    }

    #[test]
    fn test_terminal_never_polls() {
        let p = policy();
        let now = Utc::now();
        for status in ["delivered", "cancelled", "canceled", "void", "Voided"] {
            for ago in [None, Some(Duration::days(30))] {
                let s = shipment(status, ShipmentType::Courier, now, ago);
                assert!(!p.should_poll(&s, now), "{status} must never poll");
            }
        }
    }

    #[test]
    fn test_blocked_shipment_never_polls() {
        let p = policy();
        let now = Utc::now();
        let mut s = shipment("in_transit", ShipmentType::Courier, now, Some(Duration::days(1)));
        s.auto_update_blocked = true;
        assert!(!p.should_poll(&s, now));
    }

    #[test]
    fn test_freight_twelve_hour_boundary() {
        let p = policy();
        let now = Utc::now();

        let exactly = shipment("in_transit", ShipmentType::Freight, now, Some(Duration::hours(12)));
        assert!(!p.should_poll(&exactly, now), "exactly 12h is not yet due");

        let just_past = shipment(
            "in_transit",
            ShipmentType::Freight,
            now,
            Some(Duration::hours(12) + Duration::seconds(1)),
        );
        assert!(p.should_poll(&just_past, now), "12h + 1s is due");
    }

    #[test]
    fn test_active_courier_ten_minute_boundary() {
        let p = policy();
        let now = Utc::now();

        for status in ["in_transit", "out for delivery"] {
            let exactly = shipment(status, ShipmentType::Courier, now, Some(Duration::minutes(10)));
            assert!(!p.should_poll(&exactly, now));

            let just_past = shipment(
                status,
                ShipmentType::Courier,
                now,
                Some(Duration::minutes(10) + Duration::seconds(1)),
            );
            assert!(p.should_poll(&just_past, now), "{status} at 10min + 1s is due");
        }
    }

    #[test]
    fn test_idle_courier_six_hour_interval() {
        let p = policy();
        let now = Utc::now();

        let recent = shipment("booked", ShipmentType::Courier, now, Some(Duration::hours(5)));
        assert!(!p.should_poll(&recent, now));

        let stale = shipment("booked", ShipmentType::Courier, now, Some(Duration::hours(7)));
        assert!(p.should_poll(&stale, now));
    }

    #[test]
    fn test_never_polled_is_due() {
        let p = policy();
        let now = Utc::now();
        let s = shipment("booked", ShipmentType::Courier, now, None);
        assert!(p.should_poll(&s, now));
    }
}
