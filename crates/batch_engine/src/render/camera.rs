//! # 3D Camera System
//!
//! Free-fly camera whose matrices live in a persistently mapped, coherent
//! uniform buffer. Every [`Camera::update`] rebuilds the matrices and writes
//! them straight into the mapping; no flush is needed.
//!
//! ## Orientation
//!
//! Orientation is a unit quaternion. Yaw turns about the world up axis and
//! pitch about the camera's own right axis, with pitch clamped to ±89° so the
//! camera never flips over the pole.
//!
//! ## Depth
//!
//! [`Perspective`] builds its matrix with the far distance in the near slot
//! and vice versa, giving a reversed depth range: the far plane maps to -1
//! and the near plane to +1.

use bytemuck::{Pod, Zeroable};

use super::frustum::Frustum;
use super::RenderResult;
use crate::core::CameraConfig;
use crate::foundation::math::{
    to_gpu_mat4, utils, GpuMat4, Mat4, Mat4Ext, Quat, Unit, Vec3, FORWARD, RIGHT, UP,
};
use crate::gpu::{Buffer, BufferTarget, BufferUsage, GpuDevice, MapAccess};
use crate::input::{InputState, KeyCode};

/// Projection policy of a camera
pub trait Projection: std::fmt::Debug {
    /// Projection matrix for a viewport of the given aspect ratio
    fn projection_matrix(&self, aspect: f32) -> Mat4;
}

/// Perspective projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perspective {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Perspective {
    /// Perspective with a vertical field of view in degrees
    pub fn new(fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: utils::deg_to_rad(fov_degrees),
            near,
            far,
        }
    }
}

impl Projection for Perspective {
    fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_gl(self.fov_y, aspect, self.far, self.near)
    }
}

/// Matrix block as the shaders read it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraMatrices {
    /// World to view
    pub view: GpuMat4,
    /// View to clip
    pub proj: GpuMat4,
    /// World to clip
    pub view_proj: GpuMat4,
    /// View to world
    pub inv_view: GpuMat4,
    /// Clip to view
    pub inv_proj: GpuMat4,
    /// Clip to world
    pub inv_view_proj: GpuMat4,
    /// Viewport size in pixels
    pub resolution: [f32; 2],
    /// Horizontal screen UV range covered by this camera
    pub uv_range: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<CameraMatrices>() == 400);

/// Navigation speeds
#[derive(Debug, Clone, Copy, PartialEq)]
struct Controls {
    move_speed: f32,
    fast_move_speed: f32,
    rotate_speed_degrees: f32,
    mouse_sensitivity: f32,
}

/// Free-fly camera with a GPU matrix buffer
#[derive(Debug)]
pub struct Camera<P: Projection = Perspective> {
    position: Vec3,
    rotation: Quat,
    projection: P,
    resolution: (u32, u32),
    uv_range: [f32; 2],
    view: Mat4,
    proj: Mat4,
    view_proj: Mat4,
    frustum: Frustum,
    controls: Controls,
    buffer: Buffer,
}

const MAX_PITCH_DEGREES: f32 = 89.0;

fn inverse_or_identity(m: &Mat4, what: &str) -> Mat4 {
    m.try_inverse().unwrap_or_else(|| {
        log::warn!("Camera {} matrix is singular", what);
        Mat4::identity()
    })
}

impl Camera<Perspective> {
    /// Perspective camera configured from `config`, at the origin looking down -Z
    pub fn perspective<D>(device: &mut D, config: &CameraConfig) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
    {
        let projection = Perspective::new(config.fov_degrees, config.near, config.far);
        Self::new(device, config, projection)
    }
}

impl<P: Projection> Camera<P> {
    /// Create a camera and its persistently mapped matrix buffer
    pub fn new<D>(device: &mut D, config: &CameraConfig, projection: P) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
    {
        let size = std::mem::size_of::<CameraMatrices>();
        let mut buffer = device.create_buffer_with("camera_matrices", size, None, BufferUsage::persistent_write())?;
        buffer.map(MapAccess::persistent_write(), 0, None)?;

        let mut camera = Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            projection,
            resolution: (config.width, config.height),
            uv_range: [0.0, 1.0],
            view: Mat4::identity(),
            proj: Mat4::identity(),
            view_proj: Mat4::identity(),
            frustum: Frustum::default(),
            controls: Controls {
                move_speed: config.move_speed,
                fast_move_speed: config.fast_move_speed,
                rotate_speed_degrees: config.rotate_speed_degrees,
                mouse_sensitivity: config.mouse_sensitivity,
            },
            buffer,
        };
        camera.proj = camera.projection.projection_matrix(camera.aspect());
        camera.build_matrices();
        camera.write_matrices()?;
        Ok(camera)
    }

    /// Apply one frame of navigation, then rebuild and upload the matrices
    ///
    /// With `accept_input` false the camera holds still but the matrices are
    /// still written.
    pub fn update(&mut self, input: &InputState, dt: f32, accept_input: bool) -> RenderResult<()> {
        if accept_input {
            self.apply_input(input, dt);
        }
        self.build_matrices();
        self.write_matrices()
    }

    fn apply_input(&mut self, input: &InputState, dt: f32) {
        let controls = self.controls;
        let mouse = input.mouse_delta() * controls.mouse_sensitivity;
        let mut yaw = -mouse.x;
        let mut pitch = -mouse.y;

        let step = controls.rotate_speed_degrees * dt;
        if input.is_key_down(KeyCode::Up) {
            pitch += step;
        }
        if input.is_key_down(KeyCode::Down) {
            pitch -= step;
        }
        if input.is_key_down(KeyCode::Left) {
            yaw += step;
        }
        if input.is_key_down(KeyCode::Right) {
            yaw -= step;
        }

        if yaw != 0.0 {
            self.yaw(yaw);
        }
        if pitch != 0.0 {
            self.pitch(pitch);
        }

        let speed = if input.is_key_down(KeyCode::LeftShift) {
            controls.fast_move_speed
        } else {
            controls.move_speed
        };
        let forward = self.forward();
        let right = self.right();
        let mut direction = Vec3::zeros();
        for (key, dir) in [
            (KeyCode::W, forward),
            (KeyCode::S, -forward),
            (KeyCode::A, -right),
            (KeyCode::D, right),
            (KeyCode::Space, UP),
            (KeyCode::LeftControl, -UP),
        ] {
            if input.is_key_down(key) {
                direction += dir;
            }
        }
        self.position += direction * speed * dt;
    }

    /// Turn about the world up axis by `degrees`
    pub fn yaw(&mut self, degrees: f32) {
        let turn = Quat::from_axis_angle(&Unit::new_unchecked(UP), utils::deg_to_rad(degrees));
        self.rotation = turn * self.rotation;
    }

    /// Tilt about the camera's right axis by `degrees`, clamped to ±89° of pitch
    pub fn pitch(&mut self, degrees: f32) {
        let current = utils::rad_to_deg(self.forward().y.clamp(-1.0, 1.0).asin());
        let target = (current + degrees).clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES);
        let mut applied = target - current;
        // Upside down, turning about the right axis moves forward the other way
        if self.up().y < 0.0 {
            applied = -applied;
        }
        if applied == 0.0 {
            return;
        }
        let axis = Unit::new_normalize(self.right());
        self.rotation = Quat::from_axis_angle(&axis, utils::deg_to_rad(applied)) * self.rotation;
    }

    /// Recompute the projection for a new viewport and upload the matrices
    ///
    /// `uv_range` is the horizontal part of the screen this camera covers.
    pub fn on_resize(&mut self, width: u32, height: u32, uv_range: [f32; 2]) -> RenderResult<()> {
        self.resolution = (width, height);
        self.uv_range = uv_range;
        self.proj = self.projection.projection_matrix(self.aspect());
        self.build_matrices();
        log::debug!("Camera resized to {}x{} (uv {:?})", width, height, uv_range);
        self.write_matrices()
    }

    fn build_matrices(&mut self) {
        self.view = Mat4::look_at(self.position, self.position + self.forward(), self.up());
        self.view_proj = self.proj * self.view;
        self.frustum = Frustum::from_matrix(&self.view_proj);
    }

    /// Matrix block in shader layout
    pub fn gpu_matrices(&self) -> CameraMatrices {
        CameraMatrices {
            view: to_gpu_mat4(&self.view),
            proj: to_gpu_mat4(&self.proj),
            view_proj: to_gpu_mat4(&self.view_proj),
            inv_view: to_gpu_mat4(&inverse_or_identity(&self.view, "view")),
            inv_proj: to_gpu_mat4(&inverse_or_identity(&self.proj, "projection")),
            inv_view_proj: to_gpu_mat4(&inverse_or_identity(&self.view_proj, "view-projection")),
            resolution: [self.resolution.0 as f32, self.resolution.1 as f32],
            uv_range: self.uv_range,
        }
    }

    fn write_matrices(&mut self) -> RenderResult<()> {
        let matrices = self.gpu_matrices();
        self.buffer.mapping()?.write_pod(&matrices, 0)?;
        Ok(())
    }

    /// Bind the matrix buffer to uniform block `binding`
    pub fn bind_matrix_buffer<D>(&self, device: &mut D, binding: u32) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        device.bind_buffer(BufferTarget::Uniform, binding, &self.buffer)?;
        Ok(())
    }

    /// Direction the camera looks in
    pub fn forward(&self) -> Vec3 {
        self.rotation * FORWARD
    }

    /// Camera right vector
    pub fn right(&self) -> Vec3 {
        self.rotation * RIGHT
    }

    /// Camera up vector
    pub fn up(&self) -> Vec3 {
        self.rotation * UP
    }

    /// World position
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Move the camera; takes effect on the next update
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Orientation
    pub const fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Replace the orientation; takes effect on the next update
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    /// Projection policy
    pub const fn projection(&self) -> &P {
        &self.projection
    }

    /// World to view
    pub const fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View to clip
    pub const fn proj(&self) -> &Mat4 {
        &self.proj
    }

    /// World to clip
    pub const fn view_proj(&self) -> &Mat4 {
        &self.view_proj
    }

    /// Frustum of the current view-projection
    pub const fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Viewport size in pixels
    pub const fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Horizontal screen UV range
    pub const fn uv_range(&self) -> [f32; 2] {
        self.uv_range
    }

    /// Viewport aspect ratio
    pub fn aspect(&self) -> f32 {
        self.resolution.0 as f32 / self.resolution.1.max(1) as f32
    }

    /// The GPU matrix buffer
    pub const fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, RecordedCommand};
    use approx::assert_relative_eq;

    fn camera() -> (HeadlessDevice, Camera) {
        let mut device = HeadlessDevice::default();
        let camera = Camera::perspective(&mut device, &CameraConfig::default()).unwrap();
        (device, camera)
    }

    fn read_back(camera: &Camera) -> CameraMatrices {
        bytemuck::pod_read_unaligned(camera.buffer().contents())
    }

    #[test]
    fn test_reversed_perspective_entries() {
        let (_device, mut camera) = camera();
        camera.on_resize(1920, 1080, [0.0, 1.0]).unwrap();

        let (near, far) = (0.1_f32, 100.0_f32);
        let f = 1.0 / utils::deg_to_rad(30.0).tan();
        let proj = camera.proj();
        assert_relative_eq!(proj[(0, 0)], f / (16.0 / 9.0), epsilon = 1e-5);
        assert_relative_eq!(proj[(1, 1)], f, epsilon = 1e-5);
        assert_relative_eq!(proj[(2, 2)], -(near + far) / (near - far), epsilon = 1e-5);
        assert_relative_eq!(proj[(2, 3)], -(2.0 * far * near) / (near - far), epsilon = 1e-5);
        assert_relative_eq!(proj[(3, 2)], -1.0);
    }

    #[test]
    fn test_matrices_land_in_mapped_buffer() {
        let (_device, mut camera) = camera();
        camera.set_position(Vec3::new(0.0, 2.0, 5.0));
        camera.update(&InputState::new(), 0.016, true).unwrap();
        camera.on_resize(800, 600, [0.25, 1.0]).unwrap();

        let block = read_back(&camera);
        assert_eq!(block, camera.gpu_matrices());
        assert_eq!(block.resolution, [800.0, 600.0]);
        assert_eq!(block.uv_range, [0.25, 1.0]);
        for (value, expected) in block.inv_view[3].iter().zip([0.0, 2.0, 5.0, 1.0]) {
            assert_relative_eq!(*value, expected, epsilon = 1e-5);
        }
        assert!(!camera.buffer().has_pending_writes());
    }

    #[test]
    fn test_pitch_is_clamped() {
        let (_device, mut camera) = camera();
        camera.pitch(120.0);
        let pitch = utils::rad_to_deg(camera.forward().y.asin());
        assert_relative_eq!(pitch, 89.0, epsilon = 1e-3);
        assert!(camera.up().y > 0.0);

        camera.pitch(-300.0);
        let pitch = utils::rad_to_deg(camera.forward().y.asin());
        assert_relative_eq!(pitch, -89.0, epsilon = 1e-3);
    }

    #[test]
    fn test_keys_move_along_camera_axes() {
        let (_device, mut camera) = camera();
        let mut input = InputState::new();
        input.handle_key_input(KeyCode::W, true);
        camera.update(&input, 0.5, true).unwrap();
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 0.0, -15.0), epsilon = 1e-4);

        input.handle_key_input(KeyCode::LeftShift, true);
        camera.update(&input, 0.1, true).unwrap();
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 0.0, -25.0), epsilon = 1e-4);

        camera.update(&input, 1.0, false).unwrap();
        assert_relative_eq!(camera.position().z, -25.0, epsilon = 1e-4);
    }

    #[test]
    fn test_left_arrow_turns_left() {
        let (_device, mut camera) = camera();
        let mut input = InputState::new();
        input.handle_key_input(KeyCode::Left, true);
        camera.update(&input, 0.9, true).unwrap();
        assert_relative_eq!(camera.forward(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn test_frustum_follows_camera() {
        let (_device, mut camera) = camera();
        camera.update(&InputState::new(), 0.0, true).unwrap();
        assert!(camera.frustum().sphere_in_frustum(&Vec3::new(0.0, 0.0, -10.0), 1.0));
        assert!(!camera.frustum().sphere_in_frustum(&Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn test_bind_matrix_buffer() {
        let (mut device, camera) = camera();
        camera.bind_matrix_buffer(&mut device, 0).unwrap();
        assert!(matches!(
            device.commands().last(),
            Some(RecordedCommand::BindBuffer { target: BufferTarget::Uniform, binding: 0, .. })
        ));
    }
}
