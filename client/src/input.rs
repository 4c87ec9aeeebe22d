//! Keyboard sampling for the local player's intent.

use macroquad::prelude::*;
use shared::InputState;

/// Key bindings: arrows or WASD to move, space to fire, Esc to quit.
pub struct InputManager {
    current: InputState,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            current: InputState::default(),
        }
    }

    /// Reads the keys held this frame. Nothing is edge-triggered: the result
    /// reflects only what is down right now.
    pub fn sample(&mut self) -> InputState {
        self.current = intent_from_keys(
            is_key_down(KeyCode::Up) || is_key_down(KeyCode::W),
            is_key_down(KeyCode::Down) || is_key_down(KeyCode::S),
            is_key_down(KeyCode::Left) || is_key_down(KeyCode::A),
            is_key_down(KeyCode::Right) || is_key_down(KeyCode::D),
            is_key_down(KeyCode::Space),
        );
        self.current
    }

    pub fn quit_requested(&self) -> bool {
        is_key_pressed(KeyCode::Escape)
    }

    pub fn current(&self) -> InputState {
        self.current
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

fn intent_from_keys(up: bool, down: bool, left: bool, right: bool, fire: bool) -> InputState {
    InputState {
        up,
        down,
        left,
        right,
        fire,
    }
}
