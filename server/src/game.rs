use crate::error::SimulationError;
use crate::physics::{self, Vector2, WorldConfig};
use log::info;
use rand::Rng;
use shared::{Handshake, InputMessage, PlayerId, PlayerPosition};
use std::collections::BTreeMap;

/// One connected participant as the server sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub position: Vector2,
    pub velocity: Vector2,
    pub width: f32,
    pub height: f32,
    /// Fire flag from the most recent input message.
    pub firing: bool,
}

impl Player {
    pub fn new(id: PlayerId, position: Vector2, config: &WorldConfig) -> Self {
        Self {
            id,
            position,
            velocity: Vector2::default(),
            width: config.player_width,
            height: config.player_height,
            firing: false,
        }
    }

    pub fn handshake(&self) -> Handshake {
        Handshake {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
        }
    }

    pub fn to_position(&self) -> PlayerPosition {
        PlayerPosition {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
        }
    }
}

/// Picks a uniformly random position that keeps a player fully inside the field.
pub fn spawn_position<R: Rng>(config: &WorldConfig, rng: &mut R) -> Vector2 {
    Vector2 {
        x: rng.gen_range(0.0..=config.max_x()),
        y: rng.gen_range(0.0..=config.max_y()),
    }
}

/// Authoritative world: every connected player keyed by id.
///
/// Iteration (and therefore snapshot order) is ascending by id.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u64,
    config: WorldConfig,
    players: BTreeMap<PlayerId, Player>,
}

impl GameState {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            tick: 0,
            config,
            players: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Inserts a player, replacing and returning any previous entry with the same id.
    pub fn add_player(&mut self, player: Player) -> Option<Player> {
        info!(
            "Added player {} at ({}, {})",
            player.id, player.position.x, player.position.y
        );
        self.players.insert(player.id, player)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Applies one input message as a velocity increment.
    ///
    /// A zero delta leaves that axis alone; only friction slows a player down.
    /// Returns false when no such player exists.
    pub fn apply_input(&mut self, id: PlayerId, input: &InputMessage) -> bool {
        let acceleration = self.config.acceleration;
        match self.players.get_mut(&id) {
            Some(player) => {
                player.velocity.x += f32::from(input.dx) * acceleration;
                player.velocity.y += f32::from(input.dy) * acceleration;
                player.firing = input.fire;
                true
            }
            None => false,
        }
    }

    /// Advances the world by one tick.
    pub fn step(&mut self) -> Result<(), SimulationError> {
        physics::step(self)?;
        self.tick += 1;
        Ok(())
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub(crate) fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// Positions of all players at this instant, in iteration order.
    pub fn snapshot(&self) -> Vec<PlayerPosition> {
        self.players.values().map(Player::to_position).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
