//! Core engine run loop

use crate::application::{AppError, Application};
use crate::core::EngineConfig;
use crate::foundation::time::{FrameInfo, Timer};
use thiserror::Error;

/// Main engine struct
///
/// Owns frame pacing and drives an [`Application`] one frame at a time.
pub struct Engine {
    /// Engine configuration
    config: EngineConfig,

    /// Frame timing
    timer: Timer,

    /// Set once the run loop stopped because of an error
    bailed: bool,
}

/// Summary of a finished run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    /// Frames completed
    pub frames: u32,
    /// Seconds covered by those frames
    pub total_time: f32,
}

impl RunStats {
    /// Average frames per second over the run
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frames as f32 / self.total_time
        } else {
            0.0
        }
    }
}

impl Engine {
    /// Create a new engine instance
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        log::info!("Initializing engine...");

        let timer = match config.fixed_delta {
            Some(delta) => {
                log::info!("Using fixed frame delta of {}s", delta);
                Timer::fixed(delta)
            }
            None => Timer::new(),
        };

        Ok(Self {
            config,
            timer,
            bailed: false,
        })
    }

    /// Run `app` until it closes, bails or reaches the frame limit
    ///
    /// Returns an error when the application bailed or one of its callbacks
    /// failed; the failing frame is reported in the error.
    pub fn run<A>(&mut self, app: &mut A) -> Result<RunStats, EngineError>
    where
        A: Application + ?Sized,
    {
        log::info!("Starting main loop...");
        let start_frames = self.timer.frame_count();
        let start_time = self.timer.total_time();

        while !app.should_bail() && !app.should_close() && !self.frame_limit_reached(start_frames) {
            let frame = self.timer.tick();
            if let Err(source) = Self::run_frame(app, &frame) {
                self.bailed = true;
                log::error!("Frame {} failed: {}", frame.frame_index, source);
                return Err(EngineError::Application {
                    frame_index: frame.frame_index,
                    source,
                });
            }
        }

        let stats = RunStats {
            frames: self.timer.frame_count() - start_frames,
            total_time: self.timer.total_time() - start_time,
        };

        if app.should_bail() {
            self.bailed = true;
            log::error!("Application bailed after {} frames", stats.frames);
            return Err(EngineError::Bailed {
                frame_index: self.timer.frame_count(),
            });
        }

        log::info!(
            "Engine shutdown complete: {} frames, {:.1} fps",
            stats.frames,
            stats.average_fps()
        );
        Ok(stats)
    }

    fn run_frame<A>(app: &mut A, frame: &FrameInfo) -> Result<(), AppError>
    where
        A: Application + ?Sized,
    {
        app.update(frame)?;
        app.render(frame)?;
        app.post_render(frame);
        Ok(())
    }

    fn frame_limit_reached(&self, start_frames: u32) -> bool {
        self.config
            .frame_limit
            .is_some_and(|limit| self.timer.frame_count() - start_frames >= limit)
    }

    /// Whether the last run stopped because of an error
    pub const fn has_bailed(&self) -> bool {
        self.bailed
    }

    /// Frame timer
    pub const fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Engine configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration rejected by validation
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The application asked to exit due to an error
    #[error("Application bailed at frame {frame_index}")]
    Bailed {
        /// Index of the frame that would have run next
        frame_index: u32,
    },

    /// An application callback failed
    #[error("Application error at frame {frame_index}: {source}")]
    Application {
        /// Frame that failed
        frame_index: u32,
        /// Underlying error
        source: AppError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<FrameInfo>,
        close_after: Option<usize>,
        bail_after: Option<usize>,
        fail_at: Option<u32>,
    }

    impl Application for Recorder {
        fn update(&mut self, frame: &FrameInfo) -> Result<(), AppError> {
            self.frames.push(*frame);
            Ok(())
        }

        fn render(&mut self, frame: &FrameInfo) -> Result<(), AppError> {
            if self.fail_at == Some(frame.frame_index) {
                return Err(AppError::Custom("render failed".to_string()));
            }
            Ok(())
        }

        fn should_close(&self) -> bool {
            self.close_after.is_some_and(|n| self.frames.len() >= n)
        }

        fn should_bail(&self) -> bool {
            self.bail_after.is_some_and(|n| self.frames.len() >= n)
        }
    }

    fn engine(frames: u32) -> Engine {
        Engine::new(EngineConfig::new().with_frame_limit(frames).with_fixed_delta(0.5)).unwrap()
    }

    #[test]
    fn test_frame_limit_and_fixed_delta() {
        let mut app = Recorder::default();
        let stats = engine(4).run(&mut app).unwrap();

        assert_eq!(stats.frames, 4);
        assert!((stats.average_fps() - 2.0).abs() < 1e-5);
        let indices: Vec<_> = app.frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(app.frames.iter().all(|f| f.frame_delta == 0.5));
    }

    #[test]
    fn test_close_is_graceful() {
        let mut app = Recorder {
            close_after: Some(2),
            ..Recorder::default()
        };
        let mut engine = engine(10);
        assert_eq!(engine.run(&mut app).unwrap().frames, 2);
        assert!(!engine.has_bailed());
    }

    #[test]
    fn test_bail_returns_error() {
        let mut app = Recorder {
            bail_after: Some(3),
            ..Recorder::default()
        };
        let mut engine = engine(10);
        let result = engine.run(&mut app);
        assert!(matches!(result, Err(EngineError::Bailed { frame_index: 3 })));
        assert!(engine.has_bailed());
    }

    #[test]
    fn test_callback_error_stops_loop() {
        let mut app = Recorder {
            fail_at: Some(1),
            ..Recorder::default()
        };
        let result = engine(10).run(&mut app);
        assert!(matches!(
            result,
            Err(EngineError::Application { frame_index: 1, .. })
        ));
        assert_eq!(app.frames.len(), 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig::new().with_fixed_delta(-1.0);
        assert!(matches!(Engine::new(config), Err(EngineError::InvalidConfig(_))));
    }
}
