//! Frame timing
//!
//! [`FrameInfo`] is the only timing data the scene sees; the [`Timer`] turns
//! wall-clock time (or a fixed step) into one per frame.

use std::time::Instant;

/// Data about the frame currently being processed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInfo {
    /// Index of the frame, the fourth frame has index 3
    pub frame_index: u32,
    /// Seconds elapsed since the previous frame
    pub frame_delta: f32,
}

impl FrameInfo {
    /// Create frame info for the given index and delta
    pub const fn new(frame_index: u32, frame_delta: f32) -> Self {
        Self {
            frame_index,
            frame_delta,
        }
    }
}

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    fixed_delta: Option<f32>,
    delta_time: f32,
    total_time: f32,
    frame_index: u32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new wall-clock timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            fixed_delta: None,
            delta_time: 0.0,
            total_time: 0.0,
            frame_index: 0,
        }
    }

    /// Create a timer that reports the same delta every frame
    pub fn fixed(delta: f32) -> Self {
        Self {
            fixed_delta: Some(delta),
            ..Self::new()
        }
    }

    /// Advance to the next frame and return its info
    pub fn tick(&mut self) -> FrameInfo {
        let now = Instant::now();
        self.delta_time = self
            .fixed_delta
            .unwrap_or_else(|| now.duration_since(self.last_frame).as_secs_f32());
        self.last_frame = now;
        self.total_time += self.delta_time;

        let info = FrameInfo::new(self.frame_index, self.delta_time);
        self.frame_index = self.frame_index.wrapping_add(1);
        info
    }

    /// Get the time since the last frame in seconds
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub const fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of frames ticked so far
    pub const fn frame_count(&self) -> u32 {
        self.frame_index
    }

    /// Get the average FPS since timer creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_index as f32 / self.total_time
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_timer_indices_and_delta() {
        let mut timer = Timer::fixed(0.25);
        let first = timer.tick();
        let second = timer.tick();

        assert_eq!(first, FrameInfo::new(0, 0.25));
        assert_eq!(second.frame_index, 1);
        assert!((timer.total_time() - 0.5).abs() < f32::EPSILON);
        assert!((timer.average_fps() - 4.0).abs() < 1e-4);
    }
}
