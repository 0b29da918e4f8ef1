//! Input management system
//!
//! The window layer feeds key, button and cursor events into an
//! [`InputState`]; consumers poll it during the frame. Call
//! [`InputState::frame_end`] once per frame after everything has polled.

use std::collections::HashMap;
use std::hash::Hash;

use crate::foundation::math::Vec2;

/// Per-frame state of a key or button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Went down this frame
    Pressed,
    /// Down since an earlier frame
    Held,
    /// Went up this frame
    Released,
}

/// Key codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A key
    A,
    /// D key
    D,
    /// E key
    E,
    /// Q key
    Q,
    /// S key
    S,
    /// W key
    W,
    /// Space key
    Space,
    /// Enter key
    Enter,
    /// Escape key
    Escape,
    /// Tab key
    Tab,
    /// Left shift
    LeftShift,
    /// Left control
    LeftControl,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button
    Middle,
}

/// Keyboard and mouse state for the current frame
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: HashMap<KeyCode, KeyState>,
    buttons: HashMap<MouseButton, KeyState>,
    mouse_position: Option<Vec2>,
    mouse_delta: Vec2,
}

fn record<K: Hash + Eq>(states: &mut HashMap<K, KeyState>, key: K, pressed: bool) {
    if pressed {
        // Key repeat reports a press for a key that is already down
        states.entry(key).or_insert(KeyState::Pressed);
    } else if let Some(state) = states.get_mut(&key) {
        *state = KeyState::Released;
    }
}

fn promote<K>(states: &mut HashMap<K, KeyState>) {
    states.retain(|_, state| *state != KeyState::Released);
    for state in states.values_mut() {
        *state = KeyState::Held;
    }
}

impl InputState {
    /// Create an empty input state
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle key input
    pub fn handle_key_input(&mut self, key: KeyCode, pressed: bool) {
        record(&mut self.keys, key, pressed);
    }

    /// Handle mouse button input
    pub fn handle_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        record(&mut self.buttons, button, pressed);
    }

    /// Handle mouse movement to window coordinates `(x, y)`
    ///
    /// The first event only establishes the position.
    pub fn handle_mouse_move(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(previous) = self.mouse_position {
            self.mouse_delta += position - previous;
        }
        self.mouse_position = Some(position);
    }

    /// State of `key`, `None` when up
    pub fn key_state(&self, key: KeyCode) -> Option<KeyState> {
        self.keys.get(&key).copied()
    }

    /// Whether `key` is down (pressed this frame or held)
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        matches!(self.key_state(key), Some(KeyState::Pressed | KeyState::Held))
    }

    /// Whether `key` went down this frame
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.key_state(key) == Some(KeyState::Pressed)
    }

    /// Whether `key` went up this frame
    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.key_state(key) == Some(KeyState::Released)
    }

    /// Whether `button` is down
    pub fn is_button_down(&self, button: MouseButton) -> bool {
        matches!(
            self.buttons.get(&button),
            Some(KeyState::Pressed | KeyState::Held)
        )
    }

    /// Last known cursor position
    pub const fn mouse_position(&self) -> Option<Vec2> {
        self.mouse_position
    }

    /// Cursor movement accumulated this frame
    pub const fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Advance to the next frame
    ///
    /// Pressed keys become held, released keys are forgotten and the mouse
    /// delta is cleared.
    pub fn frame_end(&mut self) {
        promote(&mut self.keys);
        promote(&mut self.buttons);
        self.mouse_delta = Vec2::zeros();
    }
}
