use crate::models::driver::{GeoPoint, VehicleType};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance. Scoring and arrival estimates are tuned against
/// this exact identity, so keep the atan2 form.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let h = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * central_angle
}

/// Minutes for a vehicle to cover `distance_km` at its urban average speed,
/// rounded up to whole minutes.
pub fn estimated_arrival_mins(distance_km: f64, vehicle_type: VehicleType) -> f64 {
    (distance_km / vehicle_type.average_speed_kmh() * 60.0).ceil()
}

/// Distance and duration of the pickup-to-dropoff leg, assuming a 25 km/h
/// city average.
pub fn estimate_route(pickup: &GeoPoint, dropoff: &GeoPoint) -> (f64, f64) {
    let distance_km = haversine_km(pickup, dropoff);
    let duration_mins = distance_km / 25.0 * 60.0;
    (distance_km, duration_mins)
}
