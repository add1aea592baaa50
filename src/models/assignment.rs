use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub offered_commission: f64,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_accepted: bool,
    pub responded_at: Option<DateTime<Utc>>,
}

impl DeliveryAssignment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_accepted && self.responded_at.is_none() && now >= self.expires_at
    }

    /// Open means still awaiting a response within the acceptance window.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.is_accepted && self.responded_at.is_none() && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::DeliveryAssignment;

    fn assignment(expires_in_secs: i64) -> DeliveryAssignment {
        let now = Utc::now();
        DeliveryAssignment {
            id: Uuid::new_v4(),
            delivery_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            offered_commission: 2.25,
            assigned_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            is_accepted: false,
            responded_at: None,
        }
    }

    #[test]
    fn open_within_window_expired_after() {
        let now = Utc::now();
        let fresh = assignment(300);
        assert!(fresh.is_open(now));
        assert!(!fresh.is_expired(now));

        let stale = assignment(-10);
        assert!(!stale.is_open(now));
        assert!(stale.is_expired(now));
    }

    #[test]
    fn accepted_assignment_never_expires() {
        let mut accepted = assignment(-10);
        accepted.is_accepted = true;
        accepted.responded_at = Some(Utc::now());
        assert!(!accepted.is_expired(Utc::now()));
        assert!(!accepted.is_open(Utc::now()));
    }
}
