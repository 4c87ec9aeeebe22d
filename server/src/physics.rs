use crate::error::SimulationError;
use crate::game::{GameState, Player};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen coordinates.
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

///Field bounds and movement constants for one world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    pub field_width: f32,
    pub field_height: f32,
    pub player_width: f32,
    pub player_height: f32,
    ///Velocity added per axis for every input message that pushes that axis.
    pub acceleration: f32,
    ///Half of this is removed from each velocity axis per tick.
    pub friction: f32,
}

impl WorldConfig {
    ///Largest x a player of this world's width may occupy.
    pub fn max_x(&self) -> f32 {
        (self.field_width - self.player_width).max(0.0)
    }

    ///Largest y a player of this world's height may occupy.
    pub fn max_y(&self) -> f32 {
        (self.field_height - self.player_height).max(0.0)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            field_width: shared::FIELD_WIDTH,
            field_height: shared::FIELD_HEIGHT,
            player_width: shared::PLAYER_WIDTH,
            player_height: shared::PLAYER_HEIGHT,
            acceleration: shared::ACCELERATION,
            friction: shared::FRICTION,
        }
    }
}

///Keeps one axis inside `[0, max]`. Hitting a wall kills the momentum on that axis.
fn clamp_axis(position: &mut f32, velocity: &mut f32, max: f32) {
    if *position < 0.0 {
        *position = 0.0;
        *velocity = 0.0;
    } else if *position > max {
        *position = max;
        *velocity = 0.0;
    }
}

///Moves a velocity component toward zero without crossing it.
pub fn apply_friction(velocity: f32, damping: f32) -> f32 {
    if velocity > 0.0 {
        (velocity - damping).max(0.0)
    } else if velocity < 0.0 {
        (velocity + damping).min(0.0)
    } else {
        0.0
    }
}

///Advances a single player by one tick: integrate, clamp, then damp.
pub fn step_player(player: &mut Player, config: &WorldConfig) {
    player.position = player.position.add(&player.velocity);

    let max_x = (config.field_width - player.width).max(0.0);
    let max_y = (config.field_height - player.height).max(0.0);
    clamp_axis(&mut player.position.x, &mut player.velocity.x, max_x);
    clamp_axis(&mut player.position.y, &mut player.velocity.y, max_y);

    let damping = config.friction * 0.5;
    player.velocity.x = apply_friction(player.velocity.x, damping);
    player.velocity.y = apply_friction(player.velocity.y, damping);
}

///Runs one simulation tick over every player in the world.
///
///Returns an error if any player ends the tick with a non-finite position or
///velocity; the world is then no longer trustworthy.
pub fn step(world: &mut GameState) -> Result<(), SimulationError> {
    let config = *world.config();

    for player in world.players_mut() {
        step_player(player, &config);

        if !player.position.is_finite() || !player.velocity.is_finite() {
            return Err(SimulationError::NonFinite {
                id: player.id,
                x: player.position.x,
                y: player.position.y,
                vx: player.velocity.x,
                vy: player.velocity.y,
            });
        }
    }

    Ok(())
}
