//! View-frustum culling against bounding spheres

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Plane in Hessian normal form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the frustum
    pub normal: Vec3,
    /// Signed distance term `d` of `dot(normal, p) + d = 0`
    pub distance: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::new(0.0, 1.0, 0.0),
            distance: 0.0,
        }
    }
}

impl Plane {
    /// Create a new plane from normal and distance, normalizing both
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self::from_coefficients(Vec4::new(normal.x, normal.y, normal.z, distance))
    }

    /// Plane `(a, b, c, d)` scaled so that `(a, b, c)` has unit length
    ///
    /// A degenerate normal is kept as-is.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length <= f32::EPSILON {
            log::warn!("Degenerate frustum plane {:?}", coefficients);
            return Self {
                normal,
                distance: coefficients.w,
            };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Whether a sphere is at least partly on the positive side
    pub fn sphere_in_plane(&self, center: &Vec3, radius: f32) -> bool {
        self.distance_to_point(center) > -radius
    }
}

/// Six planes bounding the visible volume
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    /// Left, right, bottom, top, near and far planes
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub const fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract the planes of a view-projection matrix (Gribb-Hartmann)
    pub fn from_matrix(view_proj: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { view_proj.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Whether any part of the sphere may be visible
    ///
    /// Conservative: a sphere near a frustum corner can pass while being
    /// outside.
    pub fn sphere_in_frustum(&self, center: &Vec3, radius: f32) -> bool {
        self.planes.iter().all(|plane| plane.sphere_in_plane(center, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{utils, Mat4Ext, FORWARD, UP};
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_frustum_is_clip_cube() {
        let frustum = Frustum::from_matrix(&Mat4::identity());
        assert!(frustum.sphere_in_frustum(&Vec3::zeros(), 1.0));

        for axis in [Vec3::x(), Vec3::y(), Vec3::z()] {
            assert!(!frustum.sphere_in_frustum(&(axis * 1000.0), 1.0));
            assert!(!frustum.sphere_in_frustum(&(axis * -1000.0), 1.0));
        }
    }

    #[test]
    fn test_planes_are_normalized() {
        let proj = Mat4::perspective_gl(utils::deg_to_rad(60.0), 16.0 / 9.0, 0.1, 100.0);
        let frustum = Frustum::from_matrix(&proj);
        for plane in &frustum.planes {
            assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_radius_reaches_across_plane() {
        let plane = Plane::new(Vec3::new(0.0, 2.0, 0.0), 0.0);
        assert_relative_eq!(plane.distance_to_point(&Vec3::new(0.0, -3.0, 0.0)), -3.0);
        assert!(plane.sphere_in_plane(&Vec3::new(0.0, -3.0, 0.0), 3.5));
        assert!(!plane.sphere_in_plane(&Vec3::new(0.0, -3.0, 0.0), 3.0));
    }

    #[test]
    fn test_camera_frustum_culls_behind() {
        let eye = Vec3::zeros();
        let view = Mat4::look_at(eye, eye + FORWARD, UP);
        let proj = Mat4::perspective_gl(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        let frustum = Frustum::from_matrix(&(proj * view));

        assert!(frustum.sphere_in_frustum(&Vec3::new(0.0, 0.0, -10.0), 1.0));
        assert!(!frustum.sphere_in_frustum(&Vec3::new(0.0, 0.0, 10.0), 1.0));
        assert!(!frustum.sphere_in_frustum(&Vec3::new(0.0, 0.0, -500.0), 1.0));
    }
}
