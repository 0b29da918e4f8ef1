//! Math utilities and types
//!
//! Provides the nalgebra aliases used throughout the pipeline plus the
//! OpenGL-convention projection/view builders the camera relies on.
//!
//! All matrices are column vectors multiplied on the right (`proj * view * p`).
//! GPU blocks store matrices column by column, see [`to_gpu_mat4`].

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, UnitQuaternion, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Column-major matrix as laid out in GPU memory (`mat4` in std140/std430).
pub type GpuMat4 = [[f32; 4]; 4];

/// Engine forward direction (camera looks down -Z).
pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

/// Engine up direction.
pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Engine right direction.
pub const RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (translate * rotate * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }
}

/// Convert a matrix into the column-major array layout a shader reads.
pub fn to_gpu_mat4(m: &Mat4) -> GpuMat4 {
    let mut out = [[0.0; 4]; 4];
    for (c, column) in out.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    out
}

/// Rebuild a matrix from its GPU column-major layout.
pub fn from_gpu_mat4(cols: &GpuMat4) -> Mat4 {
    let mut m = Mat4::zeros();
    for (c, column) in cols.iter().enumerate() {
        for (r, value) in column.iter().enumerate() {
            m[(r, c)] = *value;
        }
    }
    m
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Right-handed perspective projection with a `[-1, 1]` clip depth range.
    ///
    /// Argument order follows the usual `(fov, aspect, z_near, z_far)`. The
    /// camera deliberately passes `far` as `z_near` and `near` as `z_far`,
    /// which reverses the depth mapping.
    fn perspective_gl(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// World-space translation stored in the last column
    fn translation_part(&self) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn perspective_gl(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        // P = [1/(a*t)  0     0             0          ]
        //     [0        1/t   0             0          ]
        //     [0        0     -(f+n)/(f-n)  -2fn/(f-n) ]
        //     [0        0     -1            0          ]
        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = -(z_far + z_near) / (z_far - z_near);
        result[(2, 3)] = -(2.0 * z_far * z_near) / (z_far - z_near);
        result[(3, 2)] = -1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self[(0, 3)], self[(1, 3)], self[(2, 3)])
    }
}
