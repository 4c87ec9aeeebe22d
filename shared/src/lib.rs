//! Types shared by the arena server and its clients: gameplay constants, the
//! newline-delimited wire codec, the input intent record, and the cooperative
//! shutdown token used by every long-lived task.

pub mod protocol;
pub mod shutdown;

pub use protocol::{
    Handshake, InputMessage, LineError, PlayerId, PlayerPosition, ProtocolError, ServerMessage,
};
pub use shutdown::{Shutdown, ShutdownSignal};

pub const DEFAULT_PORT: u16 = 8888;
pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 800.0;
pub const PLAYER_WIDTH: f32 = 50.0;
pub const PLAYER_HEIGHT: f32 = 50.0;
pub const ACCELERATION: f32 = 0.5;
pub const FRICTION: f32 = 0.5;
pub const TICK_MILLIS: u64 = 100;
pub const SEND_INTERVAL_MILLIS: u64 = 100;

/// Keys currently held by the local player.
///
/// Sampled fresh every send period; nothing is queued or edge-triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
}

impl InputState {
    /// Collapses the held keys into a directional delta. Opposing keys do not
    /// cancel: right wins over left and up wins over down.
    pub fn to_message(&self) -> InputMessage {
        let dx = if self.right {
            1
        } else if self.left {
            -1
        } else {
            0
        };
        let dy = if self.up {
            -1
        } else if self.down {
            1
        } else {
            0
        };

        InputMessage {
            dx,
            dy,
            fire: self.fire,
        }
    }

    pub fn is_idle(&self) -> bool {
        !(self.up || self.down || self.left || self.right || self.fire)
    }
}
