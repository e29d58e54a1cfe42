//! Viewing geometry helpers.

/// A point or direction in Mars-centred cartesian coordinates.
pub type Vec3 = [f64; 3];

/// `(r, colatitude, longitude)` in radians to cartesian `x, y, z`.
pub fn spherical_to_cartesian(radius: f64, colat: f64, lon: f64) -> Vec3 {
    [
        radius * lon.cos() * colat.sin(),
        radius * lon.sin() * colat.sin(),
        radius * colat.cos(),
    ]
}

/// Cartesian position of a point given latitude / longitude in degrees.
pub fn position_from_lat_lon(radius: f64, lat_deg: f64, lon_deg: f64) -> Vec3 {
    spherical_to_cartesian(radius, (90.0 - lat_deg).to_radians(), lon_deg.to_radians())
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Scattering angle in degrees between the solar incidence direction and the
/// view direction: 0 is forward scattering, 180 back scattering.
pub fn scattering_angle(solar_incidence: Vec3, view: Vec3) -> f64 {
    let cos = (dot(solar_incidence, view) / (norm(solar_incidence) * norm(view))).clamp(-1.0, 1.0);
    (std::f64::consts::PI - cos.acos()).to_degrees()
}

/// Scattering angle at a scene point seen from the spacecraft.
pub fn scene_scattering_angle(sun: Vec3, scene: Vec3, spacecraft: Vec3) -> f64 {
    scattering_angle(sub(sun, scene), sub(spacecraft, scene))
}

/// Great-circle distance between two lat/lon pairs (degrees). In radians
/// unless a `radius` is given.
pub fn haversine_dist(lat1: f64, lon1: f64, lat2: f64, lon2: f64, radius: Option<f64>) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2)
        + (1.0 - (dlat / 2.0).sin().powi(2) - ((lat1 + lat2) / 2.0).sin().powi(2))
            * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    radius.map_or(c, |r| r * c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3, tol: f64) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < tol, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn spherical_to_cartesian_matches_known_point() {
        let v = spherical_to_cartesian(8.0, std::f64::consts::PI / 6.0, std::f64::consts::PI / 4.0);
        let s2 = 2.0_f64.sqrt();
        assert_close(v, [2.0 * s2, 2.0 * s2, 4.0 * 3.0_f64.sqrt()], 1e-9);
    }

    #[test]
    fn scattering_extremes() {
        let v = [2.0, 2.0, 7.0];
        assert!(scattering_angle(v, [-2.0, -2.0, -7.0]).abs() < 1e-6);
        assert!((scattering_angle(v, v) - 180.0).abs() < 1e-6);
    }

    #[test]
    fn quarter_circle_distance() {
        let d = haversine_dist(0.0, 0.0, 0.0, 90.0, None);
        assert!((d - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        let km = haversine_dist(0.0, 0.0, 90.0, 0.0, Some(3389.5));
        assert!((km - 3389.5 * std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
