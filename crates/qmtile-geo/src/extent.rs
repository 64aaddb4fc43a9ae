//! Geographic extents in degrees.

use crate::{GeoError, Result};
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing coordinates in degrees.
pub const EPSILON_DEG: f64 = 1e-9;

/// A longitude/latitude rectangle in degrees.
///
/// Invariant: `min_lon <= max_lon` and `min_lat <= max_lat`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeographicExtent {
    /// West bound.
    pub min_lon: f64,
    /// East bound.
    pub max_lon: f64,
    /// South bound.
    pub min_lat: f64,
    /// North bound.
    pub max_lat: f64,
}

impl GeographicExtent {
    /// Create an extent, rejecting inverted or non-finite bounds.
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Result<Self> {
        let finite = [min_lon, max_lon, min_lat, max_lat]
            .iter()
            .all(|v| v.is_finite());
        if !finite || min_lon > max_lon || min_lat > max_lat {
            return Err(GeoError::InvalidExtent {
                min_lon,
                max_lon,
                min_lat,
                max_lat,
            });
        }
        Ok(Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        })
    }

    /// The whole globe.
    pub const fn world() -> Self {
        Self {
            min_lon: -180.0,
            max_lon: 180.0,
            min_lat: -90.0,
            max_lat: 90.0,
        }
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Area in square degrees.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Center as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }

    /// Check if a coordinate lies inside (bounds inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Check if `other` lies completely inside this extent.
    pub fn contains_extent(&self, other: &GeographicExtent) -> bool {
        other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
            && other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
    }

    /// Check if two extents overlap or touch.
    pub fn intersects(&self, other: &GeographicExtent) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Overlapping part of two extents, if any.
    pub fn intersection(&self, other: &GeographicExtent) -> Option<GeographicExtent> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeographicExtent {
            min_lon: self.min_lon.max(other.min_lon),
            max_lon: self.max_lon.min(other.max_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lat: self.max_lat.min(other.max_lat),
        })
    }

    /// Smallest extent covering both.
    pub fn union(&self, other: &GeographicExtent) -> GeographicExtent {
        GeographicExtent {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Split into four quadrants in the order SW, SE, NW, NE.
    pub fn quadrants(&self) -> [GeographicExtent; 4] {
        let (mid_lon, mid_lat) = self.center();
        [
            GeographicExtent {
                min_lon: self.min_lon,
                max_lon: mid_lon,
                min_lat: self.min_lat,
                max_lat: mid_lat,
            },
            GeographicExtent {
                min_lon: mid_lon,
                max_lon: self.max_lon,
                min_lat: self.min_lat,
                max_lat: mid_lat,
            },
            GeographicExtent {
                min_lon: self.min_lon,
                max_lon: mid_lon,
                min_lat: mid_lat,
                max_lat: self.max_lat,
            },
            GeographicExtent {
                min_lon: mid_lon,
                max_lon: self.max_lon,
                min_lat: mid_lat,
                max_lat: self.max_lat,
            },
        ]
    }

    /// Check if a coordinate lies on the rectangle outline within [`EPSILON_DEG`].
    pub fn on_boundary(&self, lon: f64, lat: f64) -> bool {
        let near = |a: f64, b: f64| (a - b).abs() <= EPSILON_DEG;
        near(lon, self.min_lon)
            || near(lon, self.max_lon)
            || near(lat, self.min_lat)
            || near(lat, self.max_lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted() {
        assert!(GeographicExtent::new(10.0, 0.0, 0.0, 1.0).is_err());
        assert!(GeographicExtent::new(0.0, 1.0, 5.0, 1.0).is_err());
        assert!(GeographicExtent::new(0.0, f64::NAN, 0.0, 1.0).is_err());
        assert!(GeographicExtent::new(0.0, 0.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_intersection_and_union() {
        let a = GeographicExtent::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let b = GeographicExtent::new(5.0, 15.0, -5.0, 5.0).unwrap();

        let i = a.intersection(&b).unwrap();
        assert_eq!(i, GeographicExtent::new(5.0, 10.0, 0.0, 5.0).unwrap());

        let u = a.union(&b);
        assert_eq!(u, GeographicExtent::new(0.0, 15.0, -5.0, 10.0).unwrap());

        let far = GeographicExtent::new(20.0, 30.0, 20.0, 30.0).unwrap();
        assert!(a.intersection(&far).is_none());
    }

    #[test]
    fn test_quadrants_cover_parent() {
        let e = GeographicExtent::new(-180.0, 0.0, -90.0, 90.0).unwrap();
        let q = e.quadrants();
        let total: f64 = q.iter().map(|c| c.area()).sum();
        assert!((total - e.area()).abs() < 1e-9);
        assert_eq!(q[0].min_lon, e.min_lon);
        assert_eq!(q[3].max_lat, e.max_lat);
        assert_eq!(q[0].max_lon, q[1].min_lon);
        assert_eq!(q[0].max_lat, q[2].min_lat);
    }

    #[test]
    fn test_on_boundary() {
        let e = GeographicExtent::new(0.0, 1.0, 0.0, 1.0).unwrap();
        assert!(e.on_boundary(0.0, 0.5));
        assert!(e.on_boundary(0.5, 1.0));
        assert!(!e.on_boundary(0.5, 0.5));
    }
}
