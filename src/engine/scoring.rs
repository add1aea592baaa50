use serde::Serialize;

use crate::engine::matching::CandidateDriver;
use crate::models::delivery::{Delivery, DeliveryPriority};
use crate::models::driver::VehicleType;

const LARGE_ORDER_ITEMS: u32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub rating_score: f64,
    pub load_score: f64,
    pub priority_bonus: f64,
    pub preferred_bonus: f64,
    pub vehicle_bonus: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub candidate: CandidateDriver,
    pub score: i64,
    pub breakdown: ScoreBreakdown,
}

/// Weighted suitability of one candidate for one delivery. Each term is
/// bounded on its own: drivers beyond 10 km or juggling 4+ deliveries
/// contribute nothing through that term.
pub fn compute_score(candidate: &CandidateDriver, delivery: &Delivery) -> (i64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        distance_score: (40.0 - candidate.distance_km * 4.0).max(0.0),
        rating_score: candidate.rating / 5.0 * 30.0,
        load_score: (20.0 - candidate.current_load as f64 * 5.0).max(0.0),
        priority_bonus: match delivery.priority {
            DeliveryPriority::Urgent => 10.0,
            DeliveryPriority::High => 5.0,
            DeliveryPriority::Normal | DeliveryPriority::Low => 0.0,
        },
        preferred_bonus: if candidate.is_preferred { 10.0 } else { 0.0 },
        vehicle_bonus: if delivery.items_count > LARGE_ORDER_ITEMS
            && candidate.vehicle_type == VehicleType::Car
        {
            5.0
        } else {
            0.0
        },
    };

    let total = breakdown.distance_score
        + breakdown.rating_score
        + breakdown.load_score
        + breakdown.priority_bonus
        + breakdown.preferred_bonus
        + breakdown.vehicle_bonus;

    (total.round() as i64, breakdown)
}

/// Ranks candidates best first. Ties break by ascending distance, then
/// descending rating, so the ordering is deterministic.
pub fn rank_candidates(candidates: Vec<CandidateDriver>, delivery: &Delivery) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let (score, breakdown) = compute_score(&candidate, delivery);
            ScoredCandidate { candidate, score, breakdown }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.candidate.distance_km.total_cmp(&b.candidate.distance_km))
            .then(b.candidate.rating.total_cmp(&a.candidate.rating))
    });

    scored
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::delivery::{Contact, DeliveryStatus};
    use crate::models::driver::GeoPoint;

    fn candidate(distance_km: f64, rating: f64, load: usize, vehicle: VehicleType) -> CandidateDriver {
        CandidateDriver {
            driver_id: Uuid::new_v4(),
            driver_name: "candidate".to_string(),
            location: GeoPoint { lat: 10.0, lng: 106.0 },
            distance_km,
            estimated_arrival_mins: 5.0,
            current_load: load,
            rating,
            vehicle_type: vehicle,
            is_preferred: rating >= 4.5 && load <= 2,
            commission_rate: 0.15,
        }
    }

    fn delivery(priority: DeliveryPriority, items_count: u32) -> Delivery {
        let now = Utc::now();
        Delivery {
            id: Uuid::new_v4(),
            order_id: "ORD-2001".to_string(),
            customer_id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
            partner_id: None,
            driver_id: None,
            status: DeliveryStatus::Pending,
            priority,
            pickup: GeoPoint { lat: 10.0, lng: 106.0 },
            dropoff: GeoPoint { lat: 10.05, lng: 106.03 },
            pickup_contact: Contact { name: "a".to_string(), phone: "1".to_string() },
            dropoff_contact: Contact { name: "b".to_string(), phone: "2".to_string() },
            delivery_fee: 5.0,
            driver_commission: None,
            items_count,
            estimated_distance_km: 6.5,
            estimated_duration_mins: 15.6,
            estimated_pickup_at: now,
            estimated_delivery_at: now,
            actual_pickup_at: None,
            actual_delivery_at: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn full_formula_on_a_preferred_nearby_driver() {
        // distance 2 km -> 32, rating 4.8 -> 28.8, load 0 -> 20,
        // urgent +10, preferred +10, no vehicle bonus. Total 100.8 -> 101.
        let (score, breakdown) = compute_score(
            &candidate(2.0, 4.8, 0, VehicleType::Motorbike),
            &delivery(DeliveryPriority::Urgent, 2),
        );
        assert_eq!(score, 101);
        assert!((breakdown.distance_score - 32.0).abs() < 1e-9);
        assert!((breakdown.rating_score - 28.8).abs() < 1e-9);
        assert!((breakdown.load_score - 20.0).abs() < 1e-9);
        assert_eq!(breakdown.priority_bonus, 10.0);
        assert_eq!(breakdown.preferred_bonus, 10.0);
        assert_eq!(breakdown.vehicle_bonus, 0.0);
    }

    #[test]
    fn distance_and_load_terms_floor_at_zero() {
        let (_, far) = compute_score(
            &candidate(12.0, 3.0, 0, VehicleType::Motorbike),
            &delivery(DeliveryPriority::Normal, 1),
        );
        assert_eq!(far.distance_score, 0.0);

        let (_, loaded) = compute_score(
            &candidate(1.0, 3.0, 4, VehicleType::Motorbike),
            &delivery(DeliveryPriority::Normal, 1),
        );
        assert_eq!(loaded.load_score, 0.0);
    }

    #[test]
    fn car_gets_the_large_order_bonus() {
        let big_order = delivery(DeliveryPriority::Normal, 6);
        let (car_score, car) = compute_score(&candidate(2.0, 4.0, 0, VehicleType::Car), &big_order);
        let (bike_score, _) = compute_score(&candidate(2.0, 4.0, 0, VehicleType::Motorbike), &big_order);
        assert_eq!(car.vehicle_bonus, 5.0);
        assert_eq!(car_score - bike_score, 5);
    }

    #[test]
    fn identical_candidates_score_identically() {
        let order = delivery(DeliveryPriority::High, 3);
        let (a, _) = compute_score(&candidate(3.0, 4.2, 1, VehicleType::Bicycle), &order);
        let (b, _) = compute_score(&candidate(3.0, 4.2, 1, VehicleType::Bicycle), &order);
        assert_eq!(a, b);
    }

    #[test]
    fn score_ties_break_by_ascending_distance() {
        let order = delivery(DeliveryPriority::Normal, 1);

        // 32 + 24 + 20 = 76 vs 36 + 25 + 15 = 76: tied score, b is closer.
        let mut a = candidate(2.0, 4.0, 0, VehicleType::Motorbike);
        a.driver_name = "farther".to_string();
        let mut b = candidate(1.0, 25.0 / 6.0, 1, VehicleType::Motorbike);
        b.driver_name = "closer".to_string();

        let ranked = rank_candidates(vec![a, b], &order);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].candidate.driver_name, "closer");
    }

    #[test]
    fn equal_distance_ties_break_by_descending_rating() {
        let order = delivery(DeliveryPriority::Normal, 1);

        // 76.0 and 76.3 both round to 76 at the same distance.
        let mut low = candidate(2.0, 4.0, 0, VehicleType::Motorbike);
        low.driver_name = "low-rating".to_string();
        let mut high = candidate(2.0, 4.05, 0, VehicleType::Motorbike);
        high.driver_name = "high-rating".to_string();

        let ranked = rank_candidates(vec![low, high], &order);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].candidate.driver_name, "high-rating");
    }
}
