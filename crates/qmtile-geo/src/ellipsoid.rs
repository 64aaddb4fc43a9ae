//! WGS84 ellipsoid helpers.

use glam::DVec3;

/// WGS84 semi-major axis in meters.
pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 first eccentricity squared.
pub const WGS84_ECCENTRICITY_SQUARED: f64 = 6.694_379_990_141_316e-3;

/// Length of one degree along the equator in meters.
pub const METERS_PER_DEGREE: f64 = WGS84_SEMI_MAJOR_AXIS * std::f64::consts::PI / 180.0;

/// Convert geodetic longitude/latitude (degrees) and height (meters) to
/// Earth-centered, Earth-fixed cartesian coordinates.
pub fn geodetic_to_ecef(lon: f64, lat: f64, height: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    let n = WGS84_SEMI_MAJOR_AXIS / (1.0 - WGS84_ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt();
    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_ECCENTRICITY_SQUARED) + height) * sin_lat,
    )
}

/// Unit vector normal to the ellipsoid surface at a geodetic coordinate.
pub fn geodetic_surface_normal(lon: f64, lat: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Approximate ground distance between two coordinates in meters.
///
/// Uses an equirectangular projection around the mean latitude, which is
/// what triangle size thresholds are calibrated against.
pub fn planar_distance_meters(lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> f64 {
    let mean_lat = ((lat0 + lat1) * 0.5).to_radians();
    let dx = (lon1 - lon0) * METERS_PER_DEGREE * mean_lat.cos();
    let dy = (lat1 - lat0) * METERS_PER_DEGREE;
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ecef_axes() {
        let p = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert_relative_eq!(p.x, WGS84_SEMI_MAJOR_AXIS, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);

        let p = geodetic_to_ecef(90.0, 0.0, 100.0);
        assert_relative_eq!(p.y, WGS84_SEMI_MAJOR_AXIS + 100.0, epsilon = 1e-6);

        // Polar radius b = a * sqrt(1 - e^2)
        let p = geodetic_to_ecef(0.0, 90.0, 0.0);
        assert_relative_eq!(p.z, 6_356_752.314_245, epsilon = 1e-3);
    }

    #[test]
    fn test_surface_normal_is_unit() {
        for (lon, lat) in [(0.0, 0.0), (-120.0, 45.0), (33.0, -80.0)] {
            let n = geodetic_surface_normal(lon, lat);
            assert_relative_eq!(n.length(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_planar_distance() {
        let d = planar_distance_meters(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(d, METERS_PER_DEGREE, epsilon = 1e-6);
        // A degree of longitude at 60 degrees is half as long
        let d = planar_distance_meters(0.0, 60.0, 1.0, 60.0);
        assert_relative_eq!(d, METERS_PER_DEGREE * 0.5, max_relative = 1e-9);
    }
}
