//! CPU/GPU synchronization fence
//!
//! The batch renderer inserts one fence per frame and waits on it before
//! rewriting its single-buffered streaming buffers on the next frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::GpuDevice;

/// Fence signalled once all GPU commands issued before it have completed
#[derive(Debug, Clone)]
pub struct Fence {
    id: u64,
    signalled: Arc<AtomicBool>,
}

impl Fence {
    /// Create a fence sharing `signalled` with the device that inserted it
    pub const fn new(id: u64, signalled: Arc<AtomicBool>) -> Self {
        Self { id, signalled }
    }

    /// Fence name
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking status query
    pub fn is_signalled(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    /// Block until signalled or `timeout` elapses; returns whether it was signalled
    pub fn wait(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while !self.is_signalled() {
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    /// Replace this fence with a new one inserted at the current point in the command stream
    pub fn reset<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        *self = device.fence_sync();
    }
}
