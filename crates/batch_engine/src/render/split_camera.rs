//! Two cameras sharing one window side by side
//!
//! The split ratio is the fraction of the window width given to the right
//! camera. The left camera covers screen UVs `[0, 1 - ratio]`, the right one
//! `[1 - ratio, 1]`. Only the active camera receives input; TAB switches.

use super::camera::{Camera, Projection};
use super::RenderResult;
use crate::input::{InputState, KeyCode};

/// Which half of a [`SplitCamera`] receives input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSide {
    /// Left camera
    Left,
    /// Right camera
    Right,
}

/// Viewport or scissor rectangle in pixels, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// Left and right cameras over one window
#[derive(Debug)]
pub struct SplitCamera<L: Projection, R: Projection> {
    left: Camera<L>,
    right: Camera<R>,
    split_ratio: f32,
    window_size: (u32, u32),
    active: ActiveSide,
}

impl<L: Projection, R: Projection> SplitCamera<L, R> {
    /// Combine two cameras over a `width` x `height` window, left only
    pub fn new(left: Camera<L>, right: Camera<R>, width: u32, height: u32) -> RenderResult<Self> {
        let mut split = Self {
            left,
            right,
            split_ratio: 0.0,
            window_size: (width, height),
            active: ActiveSide::Left,
        };
        split.resize_cameras()?;
        Ok(split)
    }

    /// Left camera
    pub const fn left(&self) -> &Camera<L> {
        &self.left
    }

    /// Right camera
    pub const fn right(&self) -> &Camera<R> {
        &self.right
    }

    /// Left camera, mutably
    pub fn left_mut(&mut self) -> &mut Camera<L> {
        &mut self.left
    }

    /// Right camera, mutably
    pub fn right_mut(&mut self) -> &mut Camera<R> {
        &mut self.right
    }

    /// Camera receiving input
    pub const fn active(&self) -> ActiveSide {
        self.active
    }

    /// Fraction of the width given to the right camera
    pub const fn split_ratio(&self) -> f32 {
        self.split_ratio
    }

    /// Change the split and resize both cameras
    ///
    /// A ratio of 0 activates the left camera and 1 the right one, since the
    /// other is then invisible.
    pub fn set_split_ratio(&mut self, ratio: f32) -> RenderResult<()> {
        self.split_ratio = ratio.clamp(0.0, 1.0);
        self.resize_cameras()?;
        if self.split_ratio <= 0.0 {
            self.active = ActiveSide::Left;
        } else if self.split_ratio >= 1.0 {
            self.active = ActiveSide::Right;
        }
        Ok(())
    }

    /// Handle a window resize
    pub fn on_resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.window_size = (width, height);
        self.resize_cameras()
    }

    fn left_width(&self) -> u32 {
        (self.window_size.0 as f32 * (1.0 - self.split_ratio)) as u32
    }

    // A hidden half keeps a one-pixel viewport so its projection stays finite
    fn resize_cameras(&mut self) -> RenderResult<()> {
        let (width, height) = self.window_size;
        let left_width = self.left_width();
        let boundary = 1.0 - self.split_ratio;
        self.left.on_resize(left_width.max(1), height, [0.0, boundary])?;
        self.right
            .on_resize(width.saturating_sub(left_width).max(1), height, [boundary, 1.0])
    }

    /// Toggle on TAB, then update the active camera
    pub fn update(&mut self, input: &InputState, dt: f32, accept_input: bool) -> RenderResult<()> {
        if input.is_key_pressed(KeyCode::Tab) {
            self.active = match self.active {
                ActiveSide::Left => ActiveSide::Right,
                ActiveSide::Right => ActiveSide::Left,
            };
            log::debug!("Split camera switched to {:?}", self.active);
        }

        match self.active {
            ActiveSide::Left => self.left.update(input, dt, accept_input),
            ActiveSide::Right => self.right.update(input, dt, accept_input),
        }
    }

    /// Viewport of the left camera; also its scissor
    pub fn left_viewport(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: self.left_width(),
            height: self.window_size.1,
        }
    }

    /// Viewport of the right camera; also its scissor
    pub fn right_viewport(&self) -> Rect {
        let left_width = self.left_width();
        Rect {
            x: left_width,
            y: 0,
            width: self.window_size.0.saturating_sub(left_width),
            height: self.window_size.1,
        }
    }

    /// Whole-window viewport
    pub const fn full_viewport(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: self.window_size.0,
            height: self.window_size.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CameraConfig;
    use crate::gpu::HeadlessDevice;
    use crate::render::Perspective;

    fn split() -> SplitCamera<Perspective, Perspective> {
        let mut device = HeadlessDevice::default();
        let config = CameraConfig::default();
        let left = Camera::perspective(&mut device, &config).unwrap();
        let right = Camera::perspective(&mut device, &config).unwrap();
        SplitCamera::new(left, right, 1000, 500).unwrap()
    }

    #[test]
    fn test_defaults_to_left_only() {
        let split = split();
        assert_eq!(split.split_ratio(), 0.0);
        assert_eq!(split.active(), ActiveSide::Left);
        assert_eq!(split.left().uv_range(), [0.0, 1.0]);
        assert_eq!(split.left_viewport(), split.full_viewport());
    }

    #[test]
    fn test_ratio_splits_uvs_and_viewports() {
        let mut split = split();
        split.set_split_ratio(0.25).unwrap();

        assert_eq!(split.left().uv_range(), [0.0, 0.75]);
        assert_eq!(split.right().uv_range(), [0.75, 1.0]);
        assert_eq!(split.left().resolution(), (750, 500));
        assert_eq!(split.right().resolution(), (250, 500));
        assert_eq!(
            split.right_viewport(),
            Rect {
                x: 750,
                y: 0,
                width: 250,
                height: 500
            }
        );

        split.on_resize(2000, 1000).unwrap();
        assert_eq!(split.right().resolution(), (500, 1000));
    }

    #[test]
    fn test_extreme_ratios_force_active_side() {
        let mut split = split();
        split.set_split_ratio(1.0).unwrap();
        assert_eq!(split.active(), ActiveSide::Right);
        split.set_split_ratio(0.5).unwrap();
        assert_eq!(split.active(), ActiveSide::Right);
        split.set_split_ratio(0.0).unwrap();
        assert_eq!(split.active(), ActiveSide::Left);
    }

    #[test]
    fn test_tab_toggles_and_routes_input() {
        let mut split = split();
        split.set_split_ratio(0.5).unwrap();
        let mut input = InputState::new();
        input.handle_key_input(KeyCode::Tab, true);
        input.handle_key_input(KeyCode::W, true);

        split.update(&input, 1.0, true).unwrap();
        assert_eq!(split.active(), ActiveSide::Right);
        assert!(split.right().position().z < 0.0);
        assert_eq!(split.left().position().z, 0.0);

        input.frame_end();
        split.update(&input, 1.0, true).unwrap();
        assert_eq!(split.active(), ActiveSide::Right);
    }
}
