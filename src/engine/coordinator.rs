use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::matching::find_candidates;
use crate::engine::scoring::{ScoredCandidate, rank_candidates};
use crate::error::DispatchError;
use crate::geo::estimate_route;
use crate::models::assignment::DeliveryAssignment;
use crate::models::delivery::{Contact, Delivery, DeliveryPriority, DeliveryStatus};
use crate::models::driver::{DriverStatus, GeoPoint};
use crate::models::tracking::TrackingEventType;
use crate::realtime::Broadcaster;
use crate::realtime::messages::{DeliveryStatusUpdate, DriverStatusUpdate};
use crate::store::{AssignmentCommit, DispatchStore};
use crate::tracking::TrackingEventLog;

/// Everything needed to open a new delivery; identifiers come from the order
/// flow, which is outside this engine.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDelivery {
    pub order_id: String,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub priority: DeliveryPriority,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_contact: Contact,
    pub dropoff_contact: Contact,
    pub delivery_fee: f64,
    pub items_count: u32,
}

/// Optional context attached to a status transition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitionMetadata {
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
    pub failure_reason: Option<String>,
}

/// Structured auto-assign result: the ranked field is what an admin screen
/// shows when the attempt found nobody or lost a race.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub delivery_id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub assigned_driver_id: Option<Uuid>,
    pub score: i64,
    pub recommended: Vec<ScoredCandidate>,
    pub estimated_pickup_at: Option<DateTime<Utc>>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub reason: String,
}

/// Drives the delivery state machine. Every sanctioned mutation of a
/// delivery goes through here; each transition writes exactly one tracking
/// event and one realtime push.
pub struct AssignmentCoordinator {
    store: Arc<DispatchStore>,
    tracking: Arc<TrackingEventLog>,
    broadcaster: Arc<Broadcaster>,
    acceptance_window: Duration,
    search_radius_km: f64,
}

impl AssignmentCoordinator {
    pub fn new(
        store: Arc<DispatchStore>,
        tracking: Arc<TrackingEventLog>,
        broadcaster: Arc<Broadcaster>,
        acceptance_window: Duration,
        search_radius_km: f64,
    ) -> Self {
        Self {
            store,
            tracking,
            broadcaster,
            acceptance_window,
            search_radius_km,
        }
    }

    pub fn store(&self) -> &Arc<DispatchStore> {
        &self.store
    }

    pub fn tracking(&self) -> &Arc<TrackingEventLog> {
        &self.tracking
    }

    pub fn create_delivery(&self, new: NewDelivery) -> Result<Delivery, DispatchError> {
        if !new.pickup.is_valid() || !new.dropoff.is_valid() {
            return Err(DispatchError::Validation("coordinates out of range".to_string()));
        }
        if new.delivery_fee < 0.0 {
            return Err(DispatchError::Validation("delivery fee cannot be negative".to_string()));
        }

        let now = Utc::now();
        let (distance_km, duration_mins) = estimate_route(&new.pickup, &new.dropoff);
        let estimated_pickup_at = now + Duration::minutes(30);

        let delivery = Delivery {
            id: Uuid::new_v4(),
            order_id: new.order_id,
            customer_id: new.customer_id,
            restaurant_id: new.restaurant_id,
            partner_id: new.partner_id,
            driver_id: None,
            status: DeliveryStatus::Pending,
            priority: new.priority,
            pickup: new.pickup,
            dropoff: new.dropoff,
            pickup_contact: new.pickup_contact,
            dropoff_contact: new.dropoff_contact,
            delivery_fee: new.delivery_fee,
            driver_commission: None,
            items_count: new.items_count,
            estimated_distance_km: distance_km,
            estimated_duration_mins: duration_mins,
            estimated_pickup_at,
            estimated_delivery_at: estimated_pickup_at + Duration::seconds((duration_mins * 60.0) as i64),
            actual_pickup_at: None,
            actual_delivery_at: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_delivery(delivery.clone());
        self.tracking.append(
            delivery.id,
            TrackingEventType::OrderPlaced,
            None,
            "Delivery order created".to_string(),
            Some("Order placed and ready for driver assignment".to_string()),
        );

        info!(delivery_id = %delivery.id, priority = ?delivery.priority, "delivery created");
        Ok(delivery)
    }

    /// The exclusive hand-off. The store commit validates PENDING/AVAILABLE
    /// under both row locks, so of N concurrent attempts for one delivery
    /// exactly one returns Ok.
    pub fn manual_assign(
        &self,
        delivery_id: Uuid,
        driver_id: Uuid,
    ) -> Result<AssignmentCommit, DispatchError> {
        let commit = self
            .store
            .commit_assignment(delivery_id, driver_id, self.acceptance_window)?;

        self.tracking.append(
            delivery_id,
            TrackingEventType::DriverAssigned,
            commit.driver.location,
            format!("Driver {} assigned to delivery", commit.driver.full_name),
            Some(format!("Driver commission: {:.2}", commit.assignment.offered_commission)),
        );

        self.broadcaster.publish_delivery_status(DeliveryStatusUpdate {
            delivery_id,
            status: commit.delivery.status,
            driver_id: Some(driver_id),
            location: commit.driver.location,
            message: Some(format!("Driver {} assigned", commit.driver.full_name)),
            timestamp: Utc::now(),
        });

        info!(
            delivery_id = %delivery_id,
            driver_id = %driver_id,
            commission = commit.assignment.offered_commission,
            "delivery assigned"
        );

        Ok(commit)
    }

    /// Match, score, and attempt the best candidate. A lost race is reported
    /// in the outcome, not retried against the next candidate.
    pub fn auto_assign(&self, delivery_id: Uuid) -> Result<AssignmentOutcome, DispatchError> {
        let delivery = self
            .store
            .get_delivery(delivery_id)
            .ok_or_else(|| DispatchError::NotFound(format!("delivery {delivery_id} not found")))?;

        let candidates = find_candidates(
            &self.store,
            delivery.pickup.lat,
            delivery.pickup.lng,
            self.search_radius_km,
        )?;

        if candidates.is_empty() {
            return Ok(AssignmentOutcome {
                delivery_id,
                assignment_id: None,
                assigned_driver_id: None,
                score: 0,
                recommended: Vec::new(),
                estimated_pickup_at: None,
                estimated_delivery_at: None,
                reason: "No available drivers found".to_string(),
            });
        }

        let ranked = rank_candidates(candidates, &delivery);
        let best = &ranked[0];
        let best_driver_id = best.candidate.driver_id;
        let best_score = best.score;
        let best_name = best.candidate.driver_name.clone();
        let arrival_mins = best.candidate.estimated_arrival_mins;

        match self.manual_assign(delivery_id, best_driver_id) {
            Ok(commit) => {
                let now = Utc::now();
                let pickup_at = now + Duration::seconds((arrival_mins * 60.0) as i64);
                Ok(AssignmentOutcome {
                    delivery_id,
                    assignment_id: Some(commit.assignment.id),
                    assigned_driver_id: Some(best_driver_id),
                    score: best_score,
                    recommended: ranked,
                    estimated_pickup_at: Some(pickup_at),
                    estimated_delivery_at: Some(
                        pickup_at + Duration::seconds((delivery.estimated_duration_mins * 60.0) as i64),
                    ),
                    reason: format!("Successfully assigned to {best_name}"),
                })
            }
            Err(err) => {
                warn!(delivery_id = %delivery_id, error = %err, "auto-assign attempt failed");
                Ok(AssignmentOutcome {
                    delivery_id,
                    assignment_id: None,
                    assigned_driver_id: None,
                    score: 0,
                    recommended: ranked,
                    estimated_pickup_at: None,
                    estimated_delivery_at: None,
                    reason: format!("Assignment failed: {err}"),
                })
            }
        }
    }

    /// Validates and applies one state-machine step, appends the mapped
    /// tracking event, releases/updates the driver where the step requires
    /// it, and pushes the change to subscribers.
    pub fn advance_status(
        &self,
        delivery_id: Uuid,
        new_status: DeliveryStatus,
        metadata: TransitionMetadata,
    ) -> Result<Delivery, DispatchError> {
        if new_status == DeliveryStatus::Assigned {
            return Err(DispatchError::IllegalTransition(
                "ASSIGNED is entered through driver assignment, not a status update".to_string(),
            ));
        }

        let delivery = self.store.with_delivery(delivery_id, |delivery| {
            if !delivery.status.can_transition_to(new_status) {
                return Err(DispatchError::IllegalTransition(format!(
                    "cannot move delivery {delivery_id} from {} to {new_status}",
                    delivery.status
                )));
            }

            let now = Utc::now();
            delivery.status = new_status;
            delivery.updated_at = now;
            match new_status {
                DeliveryStatus::PickedUp => delivery.actual_pickup_at = Some(now),
                DeliveryStatus::Delivered => delivery.actual_delivery_at = Some(now),
                DeliveryStatus::Failed => delivery.failure_reason = metadata.failure_reason.clone(),
                _ => {}
            }
            Ok(delivery.clone())
        })?;

        self.apply_driver_side_effects(&delivery, new_status);

        let event_type = TrackingEventType::from_status(new_status).ok_or_else(|| {
            DispatchError::Internal(format!("no tracking event mapped for {new_status}"))
        })?;
        let notes = metadata.failure_reason.clone().or_else(|| metadata.notes.clone());
        self.tracking.append(
            delivery_id,
            event_type,
            metadata.location,
            format!("Delivery status changed to {new_status}"),
            notes,
        );

        self.broadcaster.publish_delivery_status(DeliveryStatusUpdate {
            delivery_id,
            status: new_status,
            driver_id: delivery.driver_id,
            location: metadata.location,
            message: metadata.notes,
            timestamp: Utc::now(),
        });

        info!(delivery_id = %delivery_id, status = %new_status, "delivery status advanced");
        Ok(delivery)
    }

    fn apply_driver_side_effects(&self, delivery: &Delivery, new_status: DeliveryStatus) {
        let Some(driver_id) = delivery.driver_id else {
            return;
        };

        match new_status {
            DeliveryStatus::PickedUp => {
                // Taking the order is acceptance, whether or not the driver
                // answered the offer explicitly.
                self.store.close_open_assignment(delivery.id, driver_id, true);
                let updated = self.store.with_driver(driver_id, |driver| {
                    driver.status = DriverStatus::OnDelivery;
                    driver.updated_at = Utc::now();
                    Ok(driver.clone())
                });
                if let Ok(driver) = updated {
                    self.broadcaster.publish_driver_status(DriverStatusUpdate {
                        driver_id,
                        status: driver.status,
                        location: driver.location,
                        timestamp: Utc::now(),
                    });
                }
            }
            DeliveryStatus::Delivered | DeliveryStatus::Failed => {
                let successful = new_status == DeliveryStatus::Delivered;
                let duration_mins = delivery
                    .actual_delivery_at
                    .unwrap_or_else(Utc::now)
                    .signed_duration_since(delivery.created_at)
                    .num_seconds() as f64
                    / 60.0;
                let distance_km = if successful { delivery.estimated_distance_km } else { 0.0 };
                let earnings = if successful {
                    delivery.driver_commission.unwrap_or(0.0)
                } else {
                    0.0
                };

                let updated = self.store.with_driver(driver_id, |driver| {
                    driver.status = DriverStatus::Available;
                    driver.record_delivery(successful, duration_mins, distance_km, earnings);
                    Ok(driver.clone())
                });
                if let Ok(driver) = updated {
                    self.broadcaster.publish_driver_status(DriverStatusUpdate {
                        driver_id,
                        status: driver.status,
                        location: driver.location,
                        timestamp: Utc::now(),
                    });
                }
            }
            DeliveryStatus::Cancelled => {
                self.store.close_open_assignment(delivery.id, driver_id, false);
                let updated = self.store.with_driver(driver_id, |driver| {
                    driver.status = DriverStatus::Available;
                    driver.updated_at = Utc::now();
                    Ok(driver.clone())
                });
                if let Ok(driver) = updated {
                    self.broadcaster.publish_driver_status(DriverStatusUpdate {
                        driver_id,
                        status: driver.status,
                        location: driver.location,
                        timestamp: Utc::now(),
                    });
                }
            }
            _ => {}
        }
    }

    /// Driver answer to an open offer. Rejection reopens the delivery.
    pub fn respond_assignment(
        &self,
        assignment_id: Uuid,
        accepted: bool,
    ) -> Result<DeliveryAssignment, DispatchError> {
        let commit = self.store.respond_assignment(assignment_id, accepted)?;

        self.broadcaster.publish_driver_status(DriverStatusUpdate {
            driver_id: commit.driver.id,
            status: commit.driver.status,
            location: commit.driver.location,
            timestamp: Utc::now(),
        });
        if !accepted {
            self.broadcaster.publish_delivery_status(DeliveryStatusUpdate {
                delivery_id: commit.delivery.id,
                status: commit.delivery.status,
                driver_id: None,
                location: None,
                message: Some("Driver declined the assignment".to_string()),
                timestamp: Utc::now(),
            });
            info!(
                assignment_id = %assignment_id,
                delivery_id = %commit.delivery.id,
                "assignment rejected, delivery reopened"
            );
        } else {
            info!(assignment_id = %assignment_id, "assignment accepted");
        }

        Ok(commit.assignment)
    }

    /// One sweep over open assignments; reverted deliveries are announced so
    /// admin screens see them reappear as PENDING.
    pub fn expire_stale_assignments(&self) -> usize {
        let reverted = self.store.expire_open_assignments();
        for revert in &reverted {
            warn!(
                assignment_id = %revert.assignment_id,
                delivery_id = %revert.delivery.id,
                driver_id = %revert.driver_id,
                "assignment acceptance window lapsed, delivery reopened"
            );
            self.broadcaster.publish_delivery_status(DeliveryStatusUpdate {
                delivery_id: revert.delivery.id,
                status: revert.delivery.status,
                driver_id: None,
                location: None,
                message: Some("Assignment expired".to_string()),
                timestamp: Utc::now(),
            });
        }
        reverted.len()
    }
}

/// Background sweeper: reverts lapsed assignments on a fixed cadence.
pub async fn run_expiry_sweeper(coordinator: Arc<AssignmentCoordinator>, every: std::time::Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = every.as_secs(), "assignment expiry sweeper started");

    loop {
        ticker.tick().await;
        let reverted = coordinator.expire_stale_assignments();
        if reverted > 0 {
            info!(count = reverted, "expired assignments reverted");
        }
    }
}
