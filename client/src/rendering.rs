use crate::game::RemoteSnapshot;
use crate::network::{SessionStatus, TerminationReason};
use macroquad::prelude::*;
use std::time::Duration;

/// Field and player dimensions in server units. These are not on the wire,
/// so they must match the server's configuration to draw correctly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldGeometry {
    pub field_width: f32,
    pub field_height: f32,
    pub player_width: f32,
    pub player_height: f32,
}

impl Default for FieldGeometry {
    fn default() -> Self {
        Self {
            field_width: shared::FIELD_WIDTH,
            field_height: shared::FIELD_HEIGHT,
            player_width: shared::PLAYER_WIDTH,
            player_height: shared::PLAYER_HEIGHT,
        }
    }
}

/// Draws the field scaled to fit the window.
pub struct Renderer {
    width: f32,
    height: f32,
    geometry: FieldGeometry,
}

impl Renderer {
    pub fn new(width: usize, height: usize, geometry: FieldGeometry) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
            geometry,
        }
    }

    /// Window pixels per field unit on each axis.
    fn scale(&self) -> (f32, f32) {
        (
            self.width / self.geometry.field_width,
            self.height / self.geometry.field_height,
        )
    }

    /// `alpha` is how far the frame is between the previous snapshot and the
    /// latest one, used to interpolate remote players.
    pub fn render(&mut self, view: &RemoteSnapshot, status: &SessionStatus, alpha: f32) {
        clear_background(Color::from_rgba(16, 16, 32, 255));

        for remote in view.remotes() {
            let (x, y) = remote.interpolate(alpha);
            self.draw_player(x, y, Color::from_rgba(255, 68, 68, 255));
        }

        if let Some(local) = view.local() {
            self.draw_player(local.x, local.y, GREEN);
        }

        self.draw_status(status, view.remotes().len());
    }

    fn draw_player(&self, x: f32, y: f32, color: Color) {
        let (sx, sy) = self.scale();
        let (w, h) = (
            self.geometry.player_width * sx,
            self.geometry.player_height * sy,
        );
        draw_rectangle(x * sx, y * sy, w, h, color);
        draw_rectangle_lines(x * sx, y * sy, w, h, 2.0, WHITE);
    }

    fn draw_status(&self, status: &SessionStatus, remotes: usize) {
        let color = match status {
            SessionStatus::Connected { .. } => GREEN,
            SessionStatus::Connecting => YELLOW,
            SessionStatus::Terminated(_) => RED,
        };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, color);
        draw_text(&status_text(status), 24.0, 18.0, 16.0, WHITE);
        draw_text(&format!("{} other players", remotes), 24.0, 36.0, 16.0, WHITE);
    }
}

/// Fraction of one server tick that has passed since the latest snapshot.
/// Not clamped; [`crate::game::RemotePlayer::interpolate`] clamps.
pub fn interpolation_alpha(since_snapshot: Duration, tick: Duration) -> f32 {
    if tick.is_zero() {
        return 1.0;
    }
    since_snapshot.as_secs_f32() / tick.as_secs_f32()
}

fn status_text(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Connecting => "Connecting...".to_string(),
        SessionStatus::Connected { id } => format!("Connected as player {}", id),
        SessionStatus::Terminated(TerminationReason::PeerClosed) => {
            "Disconnected: server closed the connection".to_string()
        }
        SessionStatus::Terminated(TerminationReason::Closed) => "Disconnected".to_string(),
        SessionStatus::Terminated(TerminationReason::Protocol(e)) => {
            format!("Disconnected: bad message from server ({})", e)
        }
        SessionStatus::Terminated(TerminationReason::Transport(kind)) => {
            format!("Disconnected: {}", kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_fits_window() {
        let renderer = Renderer::new(400, 800, FieldGeometry::default());
        assert_eq!(renderer.scale(), (0.5, 1.0));
    }

    #[test]
    fn test_scale_follows_configured_field() {
        let geometry = FieldGeometry {
            field_width: 1600.0,
            field_height: 400.0,
            ..FieldGeometry::default()
        };
        let renderer = Renderer::new(800, 800, geometry);
        assert_eq!(renderer.scale(), (0.5, 2.0));
    }

    #[test]
    fn test_interpolation_alpha_uses_tick_period() {
        let half = interpolation_alpha(Duration::from_millis(25), Duration::from_millis(50));
        assert_eq!(half, 0.5);
        assert_eq!(
            interpolation_alpha(Duration::from_millis(25), Duration::ZERO),
            1.0
        );
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            status_text(&SessionStatus::Connected { id: 7 }),
            "Connected as player 7"
        );
        assert!(status_text(&SessionStatus::Terminated(TerminationReason::PeerClosed))
            .starts_with("Disconnected"));
    }
}
