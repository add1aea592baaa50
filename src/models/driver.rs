use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Offline,
    Available,
    Busy,
    OnDelivery,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Motorbike,
    Bicycle,
    Car,
    Truck,
    Walking,
}

impl VehicleType {
    /// Average urban speed in km/h, used for arrival estimates.
    pub fn average_speed_kmh(&self) -> f64 {
        match self {
            VehicleType::Walking => 5.0,
            VehicleType::Bicycle => 15.0,
            VehicleType::Motorbike => 30.0,
            VehicleType::Car => 25.0,
            VehicleType::Truck => 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub status: DriverStatus,
    pub vehicle_type: VehicleType,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub rating: f64,
    pub commission_rate: f64,
    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub average_delivery_time_mins: f64,
    pub total_distance_km: f64,
    pub total_earnings: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(full_name: String, phone: String, vehicle_type: VehicleType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            full_name,
            phone,
            status: DriverStatus::Offline,
            vehicle_type,
            location: None,
            location_updated_at: None,
            rating: 5.0,
            commission_rate: 0.15,
            total_deliveries: 0,
            successful_deliveries: 0,
            average_delivery_time_mins: 0.0,
            total_distance_km: 0.0,
            total_earnings: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds one completed delivery into the rolling counters. The running
    /// average uses the pre-increment total as its weight.
    pub fn record_delivery(&mut self, successful: bool, duration_mins: f64, distance_km: f64, earnings: f64) {
        let prior = self.total_deliveries as f64;
        self.average_delivery_time_mins =
            (self.average_delivery_time_mins * prior + duration_mins) / (prior + 1.0);
        self.total_deliveries += 1;
        if successful {
            self.successful_deliveries += 1;
        }
        self.total_distance_km += distance_km;
        self.total_earnings += earnings;
        self.updated_at = Utc::now();
    }
}
