//! Oct-encoded unit vectors.
//!
//! A unit vector is projected onto the octahedron `|x| + |y| + |z| = 1`, the
//! lower half folded over the upper, and the result stored as two bytes.

use glam::{DVec2, DVec3};

const OCT_RANGE: f64 = 255.0;

fn sign_not_zero(value: f64) -> f64 {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Encode a unit vector into two snorm bytes.
pub fn oct_encode(normal: DVec3) -> [u8; 2] {
    let l1 = normal.x.abs() + normal.y.abs() + normal.z.abs();
    let mut p = DVec2::new(normal.x, normal.y) / l1;
    if normal.z < 0.0 {
        p = DVec2::new(
            (1.0 - p.y.abs()) * sign_not_zero(p.x),
            (1.0 - p.x.abs()) * sign_not_zero(p.y),
        );
    }
    let to_byte = |c: f64| ((c.clamp(-1.0, 1.0) * 0.5 + 0.5) * OCT_RANGE).round() as u8;
    [to_byte(p.x), to_byte(p.y)]
}

/// Decode two snorm bytes back into a unit vector.
pub fn oct_decode(encoded: [u8; 2]) -> DVec3 {
    let x = f64::from(encoded[0]) / OCT_RANGE * 2.0 - 1.0;
    let y = f64::from(encoded[1]) / OCT_RANGE * 2.0 - 1.0;
    let z = 1.0 - x.abs() - y.abs();
    let v = if z < 0.0 {
        DVec3::new(
            (1.0 - y.abs()) * sign_not_zero(x),
            (1.0 - x.abs()) * sign_not_zero(y),
            z,
        )
    } else {
        DVec3::new(x, y, z)
    };
    v.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes() {
        for axis in [DVec3::X, DVec3::Y, DVec3::Z, -DVec3::X, -DVec3::Y, -DVec3::Z] {
            let decoded = oct_decode(oct_encode(axis));
            assert!(decoded.dot(axis) > 0.9999, "{axis} -> {decoded}");
        }
    }

    #[test]
    fn test_oblique_vectors_stay_close() {
        let samples = [
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(-0.3, 0.8, -0.5),
            DVec3::new(0.2, -0.9, 0.1),
            DVec3::new(-0.7, -0.1, -0.7),
        ];
        for v in samples {
            let n = v.normalize();
            let decoded = oct_decode(oct_encode(n));
            // 8 bits per component keeps the angular error near one degree.
            assert!(n.angle_between(decoded).to_degrees() < 1.5, "{n} -> {decoded}");
        }
    }
}
