//! Server network layer: TCP accept loop, per-connection tasks, and the
//! fixed-period simulation/broadcast loop.
//!
//! All shared state lives in one [`ServerState`] behind a single lock. Input
//! handling, registration, removal, and the tick+encode step each take the
//! write lock for a short, await-free critical section, so a snapshot always
//! reflects one consistent instant of the world.

use crate::client_manager::{BroadcastReport, ClientManager};
use crate::config::{ConnectionSettings, ServerConfig};
use crate::error::{ConnectionError, ServerError, SimulationError};
use crate::game::{self, GameState, Player};
use crate::physics::Vector2;
use log::{debug, error, info, warn};
use shared::protocol::{encode_snapshot, read_line_limited, MAX_INPUT_LINE};
use shared::{Handshake, InputMessage, PlayerId, ShutdownSignal};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long a gracefully closed connection may keep flushing queued snapshots.
const WRITER_DRAIN: Duration = Duration::from_millis(500);

/// World and connection registry, always mutated together.
pub struct ServerState {
    pub game: GameState,
    pub clients: ClientManager,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            game: GameState::new(config.world_config()),
            clients: ClientManager::new(config.max_clients),
        }
    }

    /// True when every player has exactly one active connection and vice versa.
    pub fn is_consistent(&self) -> bool {
        self.game.ids() == self.clients.ids()
    }
}

pub type SharedState = Arc<RwLock<ServerState>>;

/// What one broadcast period did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No players: nothing simulated, nothing sent.
    Idle,
    Broadcast {
        tick: u64,
        players: usize,
        report: BroadcastReport,
    },
}

/// Runs one simulation tick and queues the resulting snapshot for every
/// active connection.
pub fn broadcast_tick(state: &mut ServerState) -> Result<TickOutcome, SimulationError> {
    if state.game.is_empty() {
        return Ok(TickOutcome::Idle);
    }

    state.game.step()?;

    let snapshot = state.game.snapshot();
    let line: Arc<str> = Arc::from(encode_snapshot(&snapshot));
    let report = state.clients.broadcast(&line);

    Ok(TickOutcome::Broadcast {
        tick: state.game.tick,
        players: snapshot.len(),
        report,
    })
}

/// Fixed-period simulation and broadcast. Returns `Ok` on shutdown and an
/// error only when the world is corrupt.
pub async fn run_broadcast_loop(
    state: SharedState,
    period: Duration,
    mut shutdown: ShutdownSignal,
) -> Result<(), SimulationError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut idle_periods: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!("Broadcast loop stopping");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let outcome = {
            let mut guard = state.write().await;
            broadcast_tick(&mut guard)?
        };

        match outcome {
            TickOutcome::Idle => {
                idle_periods += 1;
                if idle_periods % 10 == 0 {
                    info!("No players connected, waiting...");
                }
            }
            TickOutcome::Broadcast {
                tick,
                players,
                report,
            } => {
                idle_periods = 0;
                debug!(
                    "Tick {}: {} players, {} queued, {} dropped, {} closed",
                    tick, players, report.queued, report.dropped, report.closed
                );
            }
        }
    }
}

/// Connection that has an id reserved but has not completed its handshake.
struct PendingConnection<S> {
    stream: S,
    addr: SocketAddr,
    id: PlayerId,
}

/// Connection whose player is live in the world.
struct ActiveConnection<S> {
    id: PlayerId,
    addr: SocketAddr,
    reader: BufReader<ReadHalf<S>>,
    writer_task: JoinHandle<io::Result<()>>,
}

impl<S> PendingConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn reserve(
        stream: S,
        addr: SocketAddr,
        state: &SharedState,
    ) -> Result<Self, ConnectionError> {
        let id = state.write().await.clients.reserve()?;
        Ok(Self { stream, addr, id })
    }

    /// Spawns the player, writes the handshake, then registers both the
    /// player and the connection in one step.
    async fn handshake(
        self,
        state: &SharedState,
        settings: ConnectionSettings,
    ) -> Result<ActiveConnection<S>, ConnectionError> {
        let PendingConnection { stream, addr, id } = self;
        let (reader, mut writer) = tokio::io::split(stream);

        let config = *state.read().await.game.config();
        let position = random_spawn(&config);
        let player = Player::new(id, position, &config);
        let handshake = player.handshake();

        if let Err(e) = write_handshake(&mut writer, &handshake).await {
            state.write().await.clients.release(id);
            return Err(e.into());
        }
        debug!("Written handshake for client {}: {:?}", id, handshake);

        let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_queue);
        {
            let mut guard = state.write().await;
            guard.game.add_player(player);
            guard.clients.register(id, addr, outbound_tx);
        }

        let writer_task = tokio::spawn(run_writer(writer, outbound_rx));

        Ok(ActiveConnection {
            id,
            addr,
            reader: BufReader::new(reader),
            writer_task,
        })
    }
}

impl<S> ActiveConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Applies input lines in receipt order until the connection ends, and
    /// returns why it ended.
    async fn serve(
        &mut self,
        state: &SharedState,
        settings: ConnectionSettings,
        mut shutdown: ShutdownSignal,
    ) -> ConnectionError {
        let mut line = String::new();

        loop {
            line.clear();

            let read = tokio::select! {
                _ = shutdown.wait() => return ConnectionError::Shutdown,
                finished = &mut self.writer_task => {
                    return match finished {
                        Ok(Err(e)) => ConnectionError::Transport(e),
                        _ => ConnectionError::Transport(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "writer task stopped",
                        )),
                    };
                }
                read = read_line_with_deadline(&mut self.reader, &mut line, settings.idle_timeout) => read,
            };

            match read {
                Ok(0) => return ConnectionError::PeerClosed,
                Ok(_) => {}
                Err(e) => return e,
            }

            let input = match InputMessage::decode(&line) {
                Ok(input) => input,
                Err(e) => return ConnectionError::Protocol(e),
            };

            state.write().await.game.apply_input(self.id, &input);
        }
    }

    /// Moves the connection to Closed: the player and the registry entry go
    /// away together. After a graceful close the writer gets [`WRITER_DRAIN`]
    /// to flush what is already queued; otherwise it is stopped at once. The
    /// socket is released before this returns.
    async fn close(self, state: &SharedState, reason: &ConnectionError) {
        let ActiveConnection {
            id,
            addr,
            reader,
            mut writer_task,
        } = self;

        {
            let mut guard = state.write().await;
            guard.game.remove_player(id);
            guard.clients.remove_client(&id);
        }

        if !writer_task.is_finished() {
            let drained =
                reason.is_graceful() && timeout(WRITER_DRAIN, &mut writer_task).await.is_ok();
            if !drained {
                debug!("Stopping writer for client {}", id);
                writer_task.abort();
                let _ = writer_task.await;
            }
        }
        drop(reader);

        if reason.is_graceful() {
            info!("Client {} ({}) closed: {}", id, addr, reason);
        } else {
            warn!("Client {} ({}) dropped: {}", id, addr, reason);
        }
    }
}

fn random_spawn(config: &crate::physics::WorldConfig) -> Vector2 {
    let mut rng = rand::thread_rng();
    game::spawn_position(config, &mut rng)
}

async fn write_handshake<W: AsyncWrite + Unpin>(
    writer: &mut W,
    handshake: &Handshake,
) -> io::Result<()> {
    writer.write_all(handshake.encode().as_bytes()).await?;
    writer.flush().await
}

async fn read_line_with_deadline<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
    idle_timeout: Option<Duration>,
) -> Result<usize, ConnectionError> {
    let read = read_line_limited(reader, line, MAX_INPUT_LINE);
    match idle_timeout {
        Some(limit) => match timeout(limit, read).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(ConnectionError::IdleTimeout(limit)),
        },
        None => Ok(read.await?),
    }
}

/// Drains one connection's outbound queue onto its socket.
async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Arc<str>>,
) -> io::Result<()> {
    while let Some(line) = outbound.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

/// Drives one connection from accept to close. Never returns an error: every
/// failure is logged and confined to this connection.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    state: SharedState,
    settings: ConnectionSettings,
    shutdown: ShutdownSignal,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let pending = match PendingConnection::reserve(stream, addr, &state).await {
        Ok(pending) => pending,
        Err(e) => {
            warn!("Rejecting connection from {}: {}", addr, e);
            return;
        }
    };

    let id = pending.id;
    let mut active = match pending.handshake(&state, settings).await {
        Ok(active) => active,
        Err(e) => {
            warn!("Handshake with client {} ({}) failed: {}", id, addr, e);
            return;
        }
    };

    let reason = active.serve(&state, settings, shutdown).await;
    active.close(&state, &reason).await;
}

/// Authoritative game server bound to a TCP listener.
pub struct Server {
    listener: TcpListener,
    state: SharedState,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            state: Arc::new(RwLock::new(ServerState::new(&config))),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the shared world, for inspection.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Accepts connections and runs the broadcast loop until `shutdown` fires
    /// or the simulation fails.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let settings = self.config.connection_settings();
        let mut broadcast = tokio::spawn(run_broadcast_loop(
            Arc::clone(&self.state),
            self.config.tick_duration(),
            shutdown.clone(),
        ));

        info!(
            "Server started: {}x{} field, {}ms ticks",
            self.config.field_width, self.config.field_height, self.config.tick_ms
        );

        let mut accept_shutdown = shutdown.clone();
        loop {
            tokio::select! {
                _ = accept_shutdown.wait() => {
                    info!("Server shutting down");
                    break;
                }
                finished = &mut broadcast => {
                    // The loop only stops by itself when the world is broken.
                    return match finished {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => {
                            error!("Simulation failed, stopping server: {}", e);
                            Err(e.into())
                        }
                        Err(e) => Err(e.into()),
                    };
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not disable Nagle for {}: {}", addr, e);
                        }
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&self.state),
                            settings,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        broadcast.await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::decode_snapshot;
    use shared::Shutdown;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncBufReadExt, DuplexStream, ReadBuf};

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            tick_ms: 10,
            ..ServerConfig::default()
        }
    }

    fn test_state() -> SharedState {
        Arc::new(RwLock::new(ServerState::new(&test_config())))
    }

    fn peer_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn read_line(reader: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        line
    }

    async fn wait_for<F: Fn(&ServerState) -> bool>(state: &SharedState, check: F) {
        for _ in 0..200 {
            if check(&*state.read().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    /// Server side of a connection whose writes succeed up to the end of the
    /// handshake line and fail with `BrokenPipe` afterwards.
    struct FailAfterHandshake {
        inner: DuplexStream,
        handshake_sent: bool,
    }

    impl AsyncRead for FailAfterHandshake {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FailAfterHandshake {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.handshake_sent {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            match Pin::new(&mut self.inner).poll_write(cx, buf) {
                Poll::Ready(Ok(written)) => {
                    if buf[..written].contains(&b'\n') {
                        self.handshake_sent = true;
                    }
                    Poll::Ready(Ok(written))
                }
                other => other,
            }
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    fn spawn_connection(
        state: &SharedState,
        shutdown: &Shutdown,
    ) -> (BufReader<DuplexStream>, JoinHandle<()>) {
        let (client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(
            server,
            peer_addr(),
            Arc::clone(state),
            test_config().connection_settings(),
            shutdown.signal(),
        ));
        (BufReader::new(client), task)
    }

    #[test]
    fn test_idle_world_does_no_work() {
        let mut state = ServerState::new(&test_config());
        assert_eq!(broadcast_tick(&mut state).unwrap(), TickOutcome::Idle);
        assert_eq!(state.game.tick, 0);
    }

    #[tokio::test]
    async fn test_broadcast_tick_sends_one_consistent_snapshot() {
        let mut state = ServerState::new(&test_config());
        let config = *state.game.config();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);

        for (id, tx) in [(1, tx1), (2, tx2)] {
            let reserved = state.clients.reserve().unwrap();
            assert_eq!(reserved, id);
            let mut player = Player::new(id, Vector2::new(10.0 * id as f32, 5.0), &config);
            player.velocity = Vector2::new(2.0, 0.0);
            state.game.add_player(player);
            state.clients.register(id, peer_addr(), tx);
        }

        let outcome = broadcast_tick(&mut state).unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Broadcast {
                tick: 1,
                players: 2,
                ..
            }
        ));

        let line1 = rx1.recv().await.unwrap();
        let line2 = rx2.recv().await.unwrap();
        assert_eq!(line1, line2);

        let players = decode_snapshot(&line1).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].id, 1);
        assert_eq!(players[0].x, 12.0);
        assert_eq!(players[1].id, 2);
        assert_eq!(players[1].x, 22.0);
    }

    #[tokio::test]
    async fn test_connection_lifecycle() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (mut client, task) = spawn_connection(&state, &shutdown);

        let handshake = Handshake::decode(&read_line(&mut client).await).unwrap();
        assert_eq!(handshake.id, 1);
        assert!((0.0..=750.0).contains(&handshake.x));
        assert!((0.0..=750.0).contains(&handshake.y));

        wait_for(&state, |s| s.game.contains(1) && s.clients.contains(&1)).await;

        client.get_mut().write_all(b"1,0,0\n").await.unwrap();
        let acceleration = test_config().acceleration;
        wait_for(&state, |s| {
            s.game
                .player(1)
                .map(|p| p.velocity.x == acceleration && p.velocity.y == 0.0)
                .unwrap_or(false)
        })
        .await;

        drop(client);
        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        let guard = state.read().await;
        assert!(guard.game.is_empty());
        assert!(guard.clients.is_empty());
        assert!(guard.is_consistent());
    }

    #[tokio::test]
    async fn test_protocol_error_drops_only_that_connection() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (mut good, _good_task) = spawn_connection(&state, &shutdown);
        let (mut bad, bad_task) = spawn_connection(&state, &shutdown);

        let good_id = Handshake::decode(&read_line(&mut good).await).unwrap().id;
        let bad_id = Handshake::decode(&read_line(&mut bad).await).unwrap().id;
        wait_for(&state, |s| s.game.len() == 2).await;

        bad.get_mut().write_all(b"1,,0\n").await.unwrap();
        timeout(Duration::from_secs(2), bad_task)
            .await
            .unwrap()
            .unwrap();

        let mut rest = String::new();
        let read = bad.read_line(&mut rest).await.unwrap();
        assert_eq!(read, 0, "server should have closed the bad connection");

        let guard = state.read().await;
        assert!(guard.game.contains(good_id));
        assert!(!guard.game.contains(bad_id));
        assert!(guard.is_consistent());
    }

    #[tokio::test]
    async fn test_capacity_rejects_without_handshake() {
        let config = ServerConfig {
            max_clients: Some(1),
            ..test_config()
        };
        let state: SharedState = Arc::new(RwLock::new(ServerState::new(&config)));
        let shutdown = Shutdown::new();

        let (mut first, _first_task) = spawn_connection(&state, &shutdown);
        read_line(&mut first).await;

        let (mut second, second_task) = spawn_connection(&state, &shutdown);
        second_task.await.unwrap();

        let mut line = String::new();
        assert_eq!(second.read_line(&mut line).await.unwrap(), 0);
        wait_for(&state, |s| s.clients.len() == 1 && s.clients.pending() == 0).await;
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (client, server) = duplex(1024);
        let settings = ConnectionSettings {
            idle_timeout: Some(Duration::from_millis(50)),
            outbound_queue: 4,
        };
        let task = tokio::spawn(handle_connection(
            server,
            peer_addr(),
            Arc::clone(&state),
            settings,
            shutdown.signal(),
        ));

        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(state.read().await.game.is_empty());
        drop(client);
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (mut client, task) = spawn_connection(&state, &shutdown);
        read_line(&mut client).await;
        wait_for(&state, |s| s.game.len() == 1).await;

        shutdown.trigger();
        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(state.read().await.game.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_input_line_drops_the_connection() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (mut client, task) = spawn_connection(&state, &shutdown);
        read_line(&mut client).await;
        wait_for(&state, |s| s.game.len() == 1).await;

        client.get_mut().write_all(&[b'1'; 200]).await.unwrap();
        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        let guard = state.read().await;
        assert!(guard.game.is_empty());
        assert!(guard.clients.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_deregisters_with_transport_error() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let settings = test_config().connection_settings();
        let (_client, server) = duplex(1024);
        let stream = FailAfterHandshake {
            inner: server,
            handshake_sent: false,
        };

        let pending = PendingConnection::reserve(stream, peer_addr(), &state)
            .await
            .unwrap();
        let mut active = pending.handshake(&state, settings).await.unwrap();
        assert!(state.read().await.clients.contains(&active.id));

        broadcast_tick(&mut *state.write().await).unwrap();

        let reason = timeout(
            Duration::from_secs(2),
            active.serve(&state, settings, shutdown.signal()),
        )
        .await
        .unwrap();
        assert!(matches!(
            reason,
            ConnectionError::Transport(ref e) if e.kind() == io::ErrorKind::BrokenPipe
        ));

        active.close(&state, &reason).await;
        let guard = state.read().await;
        assert!(guard.game.is_empty());
        assert!(guard.clients.is_empty());
        assert!(guard.is_consistent());
    }

    /// Registers a connection over a 64-byte pipe whose peer never reads, and
    /// queues snapshots until the writer is stuck on the full pipe.
    async fn stalled_connection(
        state: &SharedState,
        shutdown: &Shutdown,
    ) -> (DuplexStream, JoinHandle<()>) {
        let (client, server) = duplex(64);
        let task = tokio::spawn(handle_connection(
            server,
            peer_addr(),
            Arc::clone(state),
            test_config().connection_settings(),
            shutdown.signal(),
        ));
        wait_for(state, |s| s.game.len() == 1).await;

        for _ in 0..10 {
            broadcast_tick(&mut *state.write().await).unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        (client, task)
    }

    #[tokio::test]
    async fn test_protocol_error_releases_a_stalled_socket() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (mut client, task) = stalled_connection(&state, &shutdown).await;

        client.write_all(b"garbage\n").await.unwrap();
        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(state.read().await.game.is_empty());
        let err = client.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_shutdown_bounds_the_drain_of_a_stalled_socket() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let (mut client, task) = stalled_connection(&state, &shutdown).await;

        shutdown.trigger();
        timeout(WRITER_DRAIN + Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(state.read().await.game.is_empty());
        let err = client.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_broadcast_loop_stops_on_shutdown() {
        let state = test_state();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(run_broadcast_loop(
            Arc::clone(&state),
            Duration::from_millis(5),
            shutdown.signal(),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.trigger();

        let result = timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(state.read().await.game.tick, 0);
    }

    #[tokio::test]
    async fn test_broadcast_loop_fails_on_corrupt_world() {
        let state = test_state();
        {
            let mut guard = state.write().await;
            let config = *guard.game.config();
            let mut player = Player::new(1, Vector2::new(1.0, 1.0), &config);
            player.velocity.y = f32::NAN;
            guard.game.add_player(player);
        }
        let shutdown = Shutdown::new();

        let result = run_broadcast_loop(state, Duration::from_millis(5), shutdown.signal()).await;
        assert!(matches!(result, Err(SimulationError::NonFinite { id: 1, .. })));
    }
}
