use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::assignment::DeliveryAssignment;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::driver::{Driver, DriverStatus};

/// Everything an assignment commit touched, cloned out from under the locks.
#[derive(Debug, Clone)]
pub struct AssignmentCommit {
    pub assignment: DeliveryAssignment,
    pub delivery: Delivery,
    pub driver: Driver,
}

/// A reverted assignment: the delivery went back to PENDING and the driver
/// back to AVAILABLE.
#[derive(Debug, Clone)]
pub struct AssignmentRevert {
    pub assignment_id: Uuid,
    pub delivery: Delivery,
    pub driver_id: Uuid,
}

/// In-memory dispatch store. Constructed once at startup and handed to every
/// component that needs it.
///
/// Multi-entry operations take locks in a fixed order (delivery, then driver,
/// then assignment); the assignment commit re-validates both statuses while
/// holding the locks, so of N concurrent commits for one delivery exactly one
/// observes PENDING + AVAILABLE and wins.
pub struct DispatchStore {
    drivers: DashMap<Uuid, Driver>,
    deliveries: DashMap<Uuid, Delivery>,
    assignments: DashMap<Uuid, DeliveryAssignment>,
}

impl DispatchStore {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
            deliveries: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    // ---- drivers ----

    pub fn insert_driver(&self, driver: Driver) {
        self.drivers.insert(driver.id, driver);
    }

    pub fn get_driver(&self, id: Uuid) -> Option<Driver> {
        self.drivers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn list_drivers(&self) -> Vec<Driver> {
        self.drivers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn with_driver<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Driver) -> Result<R, DispatchError>,
    ) -> Result<R, DispatchError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("driver {id} not found")))?;
        f(driver.value_mut())
    }

    /// Drivers eligible for matching: AVAILABLE with a known position.
    pub fn available_drivers(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .filter(|entry| {
                let driver = entry.value();
                driver.status == DriverStatus::Available && driver.location.is_some()
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// The delivery this driver is currently serving, if any.
    pub fn active_delivery_of(&self, driver_id: Uuid) -> Option<Uuid> {
        self.deliveries
            .iter()
            .filter(|entry| {
                let delivery = entry.value();
                delivery.driver_id == Some(driver_id) && delivery.status.is_active()
            })
            .map(|entry| *entry.key())
            .next()
    }

    /// Number of deliveries currently riding with this driver.
    pub fn active_load(&self, driver_id: Uuid) -> usize {
        self.deliveries
            .iter()
            .filter(|entry| {
                let delivery = entry.value();
                delivery.driver_id == Some(driver_id) && delivery.status.is_active()
            })
            .count()
    }

    // ---- deliveries ----

    pub fn insert_delivery(&self, delivery: Delivery) {
        self.deliveries.insert(delivery.id, delivery);
    }

    pub fn get_delivery(&self, id: Uuid) -> Option<Delivery> {
        self.deliveries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn with_delivery<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Delivery) -> Result<R, DispatchError>,
    ) -> Result<R, DispatchError> {
        let mut delivery = self
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("delivery {id} not found")))?;
        f(delivery.value_mut())
    }

    // ---- assignments ----

    pub fn get_assignment(&self, id: Uuid) -> Option<DeliveryAssignment> {
        self.assignments.get(&id).map(|entry| entry.value().clone())
    }

    fn assignment_for_driver_on(&self, delivery_id: Uuid, driver_id: Uuid) -> Option<DeliveryAssignment> {
        self.assignments
            .iter()
            .filter(|entry| {
                let a = entry.value();
                a.delivery_id == delivery_id && a.driver_id == driver_id
            })
            .max_by_key(|entry| entry.value().assigned_at)
            .map(|entry| entry.value().clone())
    }

    /// The validate-and-commit sequence for an assignment, executed entirely
    /// under the delivery and driver entry locks.
    pub fn commit_assignment(
        &self,
        delivery_id: Uuid,
        driver_id: Uuid,
        acceptance_window: Duration,
    ) -> Result<AssignmentCommit, DispatchError> {
        let now = Utc::now();

        let mut delivery = self
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| DispatchError::NotFound(format!("delivery {delivery_id} not found")))?;

        // An assignment whose acceptance window lapsed does not block a fresh
        // attempt: fold the delivery back to PENDING first.
        if delivery.status == DeliveryStatus::Assigned {
            if let Some(stale_driver_id) = delivery.driver_id {
                let expired = self
                    .assignment_for_driver_on(delivery_id, stale_driver_id)
                    .is_some_and(|a| a.is_expired(now));
                if expired {
                    delivery.status = DeliveryStatus::Pending;
                    delivery.driver_id = None;
                    delivery.driver_commission = None;
                    delivery.updated_at = now;
                    if let Some(mut stale_driver) = self.drivers.get_mut(&stale_driver_id) {
                        if stale_driver.status == DriverStatus::Busy {
                            stale_driver.status = DriverStatus::Available;
                            stale_driver.updated_at = now;
                        }
                    }
                }
            }
        }

        if delivery.status != DeliveryStatus::Pending {
            return Err(DispatchError::InvalidState(format!(
                "delivery {delivery_id} is not available for assignment"
            )));
        }

        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;

        if driver.status != DriverStatus::Available {
            return Err(DispatchError::DriverUnavailable(format!(
                "driver {driver_id} is not available"
            )));
        }

        let commission = delivery.delivery_fee * driver.commission_rate;
        let assignment = DeliveryAssignment {
            id: Uuid::new_v4(),
            delivery_id,
            driver_id,
            offered_commission: commission,
            assigned_at: now,
            expires_at: now + acceptance_window,
            is_accepted: false,
            responded_at: None,
        };

        delivery.status = DeliveryStatus::Assigned;
        delivery.driver_id = Some(driver_id);
        delivery.driver_commission = Some(commission);
        delivery.estimated_pickup_at = now + Duration::minutes(15);
        delivery.estimated_delivery_at =
            delivery.estimated_pickup_at + Duration::seconds((delivery.estimated_duration_mins * 60.0) as i64);
        delivery.updated_at = now;

        driver.status = DriverStatus::Busy;
        driver.updated_at = now;

        self.assignments.insert(assignment.id, assignment.clone());

        Ok(AssignmentCommit {
            assignment,
            delivery: delivery.clone(),
            driver: driver.clone(),
        })
    }

    /// Accept or reject an open assignment. Rejection reverts the delivery to
    /// PENDING and frees the driver.
    pub fn respond_assignment(
        &self,
        assignment_id: Uuid,
        accepted: bool,
    ) -> Result<AssignmentCommit, DispatchError> {
        let now = Utc::now();

        let (delivery_id, driver_id) = {
            let assignment = self
                .assignments
                .get(&assignment_id)
                .ok_or_else(|| DispatchError::NotFound(format!("assignment {assignment_id} not found")))?;
            (assignment.delivery_id, assignment.driver_id)
        };

        let mut delivery = self
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| DispatchError::NotFound(format!("delivery {delivery_id} not found")))?;
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;
        let mut assignment = self
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| DispatchError::NotFound(format!("assignment {assignment_id} not found")))?;

        if !assignment.is_open(now) {
            return Err(DispatchError::InvalidState(format!(
                "assignment {assignment_id} is not open"
            )));
        }
        if delivery.status != DeliveryStatus::Assigned || delivery.driver_id != Some(driver_id) {
            return Err(DispatchError::InvalidState(format!(
                "delivery {delivery_id} is no longer held by this assignment"
            )));
        }

        assignment.responded_at = Some(now);
        if accepted {
            assignment.is_accepted = true;
            driver.status = DriverStatus::OnDelivery;
            driver.updated_at = now;
        } else {
            delivery.status = DeliveryStatus::Pending;
            delivery.driver_id = None;
            delivery.driver_commission = None;
            delivery.updated_at = now;
            driver.status = DriverStatus::Available;
            driver.updated_at = now;
        }

        Ok(AssignmentCommit {
            assignment: assignment.clone(),
            delivery: delivery.clone(),
            driver: driver.clone(),
        })
    }

    /// Closes the open assignment on a delivery without reverting anything.
    /// Used when the delivery itself leaves ASSIGNED: pickup counts as
    /// acceptance, cancellation does not.
    pub fn close_open_assignment(&self, delivery_id: Uuid, driver_id: Uuid, accepted: bool) {
        let now = Utc::now();
        let open_id = self
            .assignment_for_driver_on(delivery_id, driver_id)
            .filter(|a| a.is_open(now))
            .map(|a| a.id);
        if let Some(id) = open_id {
            if let Some(mut assignment) = self.assignments.get_mut(&id) {
                assignment.responded_at = Some(now);
                assignment.is_accepted = accepted;
            }
        }
    }

    /// Sweep pass: revert every assignment whose acceptance window lapsed.
    /// Collects candidates first so no iterator lock is held while the
    /// per-entry locks are taken.
    pub fn expire_open_assignments(&self) -> Vec<AssignmentRevert> {
        let now = Utc::now();
        let expired_ids: Vec<Uuid> = self
            .assignments
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        let mut reverted = Vec::new();
        for assignment_id in expired_ids {
            if let Some(revert) = self.expire_assignment(assignment_id) {
                reverted.push(revert);
            }
        }
        reverted
    }

    fn expire_assignment(&self, assignment_id: Uuid) -> Option<AssignmentRevert> {
        let now = Utc::now();
        let (delivery_id, driver_id) = {
            let assignment = self.assignments.get(&assignment_id)?;
            (assignment.delivery_id, assignment.driver_id)
        };

        let mut delivery = self.deliveries.get_mut(&delivery_id)?;
        // Re-check under the lock: the driver may have accepted, or a fresh
        // commit may already have reopened and re-assigned this delivery.
        let still_current = delivery.status == DeliveryStatus::Assigned
            && delivery.driver_id == Some(driver_id);
        let expired = self
            .assignments
            .get(&assignment_id)
            .is_some_and(|a| a.is_expired(now));
        if !still_current || !expired {
            return None;
        }

        delivery.status = DeliveryStatus::Pending;
        delivery.driver_id = None;
        delivery.driver_commission = None;
        delivery.updated_at = now;

        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            if driver.status == DriverStatus::Busy {
                driver.status = DriverStatus::Available;
                driver.updated_at = now;
            }
        }

        Some(AssignmentRevert {
            assignment_id,
            delivery: delivery.clone(),
            driver_id,
        })
    }
}

impl Default for DispatchStore {
    fn default() -> Self {
        Self::new()
    }
}
