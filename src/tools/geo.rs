/// Mean Earth radius, 6 371 008.8 meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Calculates the great-circle distance between two points using the
/// haversine formula. Returns the result in meters.
pub fn earth_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lon1 = lon1.to_radians();
    let lat2 = lat2.to_radians();
    let lon2 = lon2.to_radians();

    let sin_dlat_half = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon_half = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat_half * sin_dlat_half
        + lat1.cos() * lat2.cos() * sin_dlon_half * sin_dlon_half;
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_points() {
        // Two platforms of the same station in Tokyo, roughly 14 m apart.
        let d = earth_distance_m(35.68121, 139.76668, 35.68124, 139.76653);
        assert!((10.0..20.0).contains(&d), "got {d}");
    }

    #[test]
    fn far_points() {
        // Warsaw to Kraków, roughly 250 km.
        let d = earth_distance_m(52.23, 21.01, 50.06, 19.94);
        assert!((240_000.0..260_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn zero_distance() {
        assert_eq!(earth_distance_m(52.0, 21.0, 52.0, 21.0), 0.0);
    }
}
