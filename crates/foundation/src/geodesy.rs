/// Mean Earth radius (meters), used for short-range spherical offsets.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Point reached by travelling `distance_m` from `(lon, lat)` along `bearing_deg`
/// (clockwise from north) on a spherical Earth.
pub fn destination(lon_deg: f64, lat_deg: f64, distance_m: f64, bearing_deg: f64) -> (f64, f64) {
    let lat1 = lat_deg.to_radians();
    let lon1 = lon_deg.to_radians();
    let bearing = bearing_deg.to_radians();
    let delta = distance_m / EARTH_MEAN_RADIUS_M;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    (lon2.to_degrees(), lat2.to_degrees())
}

/// Closed ring approximating a circle of `radius_m` around `(lon, lat)`.
///
/// The ring has `steps + 1` vertices; the last repeats the first. `steps` below 3
/// is raised to 3.
pub fn circle_ring(lon_deg: f64, lat_deg: f64, radius_m: f64, steps: usize) -> Vec<(f64, f64)> {
    let steps = steps.max(3);
    let mut ring = Vec::with_capacity(steps + 1);
    for i in 0..steps {
        let bearing = -360.0 * i as f64 / steps as f64;
        ring.push(destination(lon_deg, lat_deg, radius_m, bearing));
    }
    ring.push(ring[0]);
    ring
}

/// Great-circle distance in meters (haversine).
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().asin()
}
