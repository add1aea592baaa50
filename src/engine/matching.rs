use serde::Serialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::{estimated_arrival_mins, haversine_km};
use crate::models::driver::{GeoPoint, VehicleType};
use crate::store::DispatchStore;

/// Candidate sets are bounded before scoring.
const CANDIDATE_LIMIT: usize = 20;

const PREFERRED_MIN_RATING: f64 = 4.5;
const PREFERRED_MAX_LOAD: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct CandidateDriver {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub estimated_arrival_mins: f64,
    pub current_load: usize,
    pub rating: f64,
    pub vehicle_type: VehicleType,
    pub is_preferred: bool,
    pub commission_rate: f64,
}

/// Available drivers with a known position within `max_distance_km` of the
/// pickup point, closest first (rating breaks distance ties), capped at 20.
/// Pure query, no side effects.
pub fn find_candidates(
    store: &DispatchStore,
    pickup_lat: f64,
    pickup_lng: f64,
    max_distance_km: f64,
) -> Result<Vec<CandidateDriver>, DispatchError> {
    let pickup = GeoPoint { lat: pickup_lat, lng: pickup_lng };
    if !pickup.is_valid() {
        return Err(DispatchError::Validation(format!(
            "pickup coordinates out of range: ({pickup_lat}, {pickup_lng})"
        )));
    }
    if max_distance_km <= 0.0 {
        return Err(DispatchError::Validation(format!(
            "search radius must be positive, got {max_distance_km}"
        )));
    }

    let mut candidates: Vec<CandidateDriver> = store
        .available_drivers()
        .into_iter()
        .filter_map(|driver| {
            let location = driver.location?;
            let distance_km = haversine_km(&location, &pickup);
            if distance_km > max_distance_km {
                return None;
            }
            let current_load = store.active_load(driver.id);
            Some(CandidateDriver {
                driver_id: driver.id,
                driver_name: driver.full_name,
                location,
                distance_km,
                estimated_arrival_mins: estimated_arrival_mins(distance_km, driver.vehicle_type),
                current_load,
                rating: driver.rating,
                vehicle_type: driver.vehicle_type,
                is_preferred: driver.rating >= PREFERRED_MIN_RATING
                    && current_load <= PREFERRED_MAX_LOAD,
                commission_rate: driver.commission_rate,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then(b.rating.total_cmp(&a.rating))
    });
    candidates.truncate(CANDIDATE_LIMIT);

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::driver::{Driver, DriverStatus};

    fn available_driver(name: &str, lat: f64, lng: f64, rating: f64) -> Driver {
        let mut driver = Driver::new(name.to_string(), "+84900000000".to_string(), VehicleType::Motorbike);
        driver.status = DriverStatus::Available;
        driver.location = Some(GeoPoint { lat, lng });
        driver.location_updated_at = Some(Utc::now());
        driver.rating = rating;
        driver
    }

    #[test]
    fn filters_by_status_position_and_radius() {
        let store = DispatchStore::new();

        store.insert_driver(available_driver("near", 10.01, 106.01, 4.8));

        let mut offline = available_driver("offline", 10.01, 106.01, 4.8);
        offline.status = DriverStatus::Offline;
        store.insert_driver(offline);

        let mut unlocated = available_driver("unlocated", 10.01, 106.01, 4.8);
        unlocated.location = None;
        store.insert_driver(unlocated);

        // Roughly 110 km north of the pickup.
        store.insert_driver(available_driver("far", 11.0, 106.0, 5.0));

        let candidates = find_candidates(&store, 10.0, 106.0, 10.0).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].driver_name, "near");
        assert!(candidates[0].distance_km < 2.0);
    }

    #[test]
    fn orders_by_distance_then_rating() {
        let store = DispatchStore::new();
        store.insert_driver(available_driver("close-low", 10.005, 106.005, 3.0));
        store.insert_driver(available_driver("tied-high", 10.01, 106.01, 5.0));
        store.insert_driver(available_driver("tied-low", 10.01, 106.01, 4.0));

        let candidates = find_candidates(&store, 10.0, 106.0, 10.0).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.driver_name.as_str()).collect();
        assert_eq!(names, vec!["close-low", "tied-high", "tied-low"]);
    }

    #[test]
    fn caps_the_candidate_set() {
        let store = DispatchStore::new();
        for i in 0..30 {
            store.insert_driver(available_driver(&format!("d{i}"), 10.001 + i as f64 * 1e-4, 106.0, 4.0));
        }
        let candidates = find_candidates(&store, 10.0, 106.0, 10.0).unwrap();
        assert_eq!(candidates.len(), 20);
    }

    #[test]
    fn rejects_malformed_queries() {
        let store = DispatchStore::new();
        assert!(matches!(
            find_candidates(&store, 95.0, 106.0, 10.0),
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            find_candidates(&store, 10.0, 181.0, 10.0),
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            find_candidates(&store, 10.0, 106.0, 0.0),
            Err(DispatchError::Validation(_))
        ));
    }
}
