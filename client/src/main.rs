use clap::Parser;
use client::game::RosterMode;
use client::input::InputManager;
use client::network::{self, SyncConfig};
use client::rendering::{self, FieldGeometry, Renderer};
use log::{error, info};
use macroquad::prelude::*;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static ARGS: OnceLock<Args> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8888")]
    server: String,

    /// Milliseconds between input messages
    #[arg(long, default_value_t = shared::SEND_INTERVAL_MILLIS)]
    send_interval_ms: u64,

    /// Match remote players by their position in each snapshot instead of by id
    #[arg(long)]
    positional_roster: bool,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "800")]
    height: usize,

    /// Field width in server units; must match the server's field_width
    #[arg(long, default_value_t = shared::FIELD_WIDTH)]
    field_width: f32,

    /// Field height in server units; must match the server's field_height
    #[arg(long, default_value_t = shared::FIELD_HEIGHT)]
    field_height: f32,

    /// Player width in server units; must match the server's player_width
    #[arg(long, default_value_t = shared::PLAYER_WIDTH)]
    player_width: f32,

    /// Player height in server units; must match the server's player_height
    #[arg(long, default_value_t = shared::PLAYER_HEIGHT)]
    player_height: f32,

    /// Server tick period in milliseconds, used to interpolate remote players
    #[arg(long, default_value_t = shared::TICK_MILLIS)]
    tick_ms: u64,
}

impl Args {
    fn geometry(&self) -> FieldGeometry {
        FieldGeometry {
            field_width: self.field_width,
            field_height: self.field_height,
            player_width: self.player_width,
            player_height: self.player_height,
        }
    }
}

/// Command line, parsed once for both the window setup and the game loop.
fn args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}

fn window_conf() -> Conf {
    let args = args();
    Conf {
        window_title: "Arena".to_owned(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = args();
    let config = SyncConfig {
        send_interval: Duration::from_millis(args.send_interval_ms.max(1)),
        roster_mode: if args.positional_roster {
            RosterMode::Positional
        } else {
            RosterMode::ById
        },
    };

    // The sync agent runs on its own runtime; the render loop below only
    // exchanges values with it through the handle.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return;
        }
    };

    info!("Connecting to: {}", args.server);
    let session = match runtime.block_on(network::connect(&args.server, config)) {
        Ok(session) => session,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    info!("Controls: arrows/WASD to move, Space to fire, Esc to quit");

    let mut input = InputManager::new();
    let mut renderer = Renderer::new(args.width, args.height, args.geometry());
    let tick = Duration::from_millis(args.tick_ms);
    let mut last_applied = 0;
    let mut last_snapshot_at = Instant::now();

    loop {
        if input.quit_requested() {
            break;
        }
        session.set_intent(input.sample());

        let view = session.view();
        if view.snapshots_applied() != last_applied {
            last_applied = view.snapshots_applied();
            last_snapshot_at = Instant::now();
        }
        let alpha = rendering::interpolation_alpha(last_snapshot_at.elapsed(), tick);

        renderer.render(&view, &session.status(), alpha);
        next_frame().await;
    }

    session.close();
    runtime.block_on(session.join());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_server_defaults() {
        let args = Args::try_parse_from(["client"]).unwrap();
        assert_eq!(args.geometry(), FieldGeometry::default());
        assert_eq!(args.tick_ms, shared::TICK_MILLIS);
        assert_eq!((args.width, args.height), (800, 800));
    }

    #[test]
    fn test_geometry_flags() {
        let args = Args::try_parse_from([
            "client",
            "--field-width",
            "1200",
            "--player-height",
            "20",
            "--tick-ms",
            "50",
        ])
        .unwrap();
        let geometry = args.geometry();
        assert_eq!(geometry.field_width, 1200.0);
        assert_eq!(geometry.field_height, shared::FIELD_HEIGHT);
        assert_eq!(geometry.player_height, 20.0);
        assert_eq!(args.tick_ms, 50);
    }
}
