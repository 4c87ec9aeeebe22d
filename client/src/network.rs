//! Client sync agent: one session against the server, split into a receive
//! duty and a send duty that share nothing but watch channels.
//!
//! The presentation layer talks to a running session only through
//! [`SyncHandle`]: it publishes the keys currently held, and reads back the
//! reconciled [`RemoteSnapshot`] and the [`SessionStatus`].

use crate::game::{RemoteSnapshot, RosterMode};
use log::{debug, info, warn};
use shared::protocol::{read_line_limited, MAX_SERVER_LINE};
use shared::{
    InputState, LineError, PlayerId, ProtocolError, ServerMessage, Shutdown, ShutdownSignal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often the held keys are sent to the server.
    pub send_interval: Duration,
    pub roster_mode: RosterMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(shared::SEND_INTERVAL_MILLIS),
            roster_mode: RosterMode::ById,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The server closed the connection.
    PeerClosed,
    /// The server sent a line that could not be decoded.
    Protocol(ProtocolError),
    Transport(io::ErrorKind),
    /// Closed locally through [`SyncHandle::close`].
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Connected, waiting for the handshake.
    Connecting,
    Connected { id: PlayerId },
    Terminated(TerminationReason),
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionStatus::Terminated(_))
    }
}

/// Presentation-side handle to a running session. Dropping it closes the
/// session.
pub struct SyncHandle {
    intent: watch::Sender<InputState>,
    view: watch::Receiver<RemoteSnapshot>,
    status: watch::Receiver<SessionStatus>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Publishes the keys currently held. The send duty samples the latest
    /// value at each period; earlier values are never queued.
    pub fn set_intent(&self, intent: InputState) {
        self.intent.send_replace(intent);
    }

    pub fn view(&self) -> RemoteSnapshot {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Independent receiver for status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Requests cooperative termination. The session reports
    /// [`TerminationReason::Closed`] unless it already ended for another reason.
    pub fn close(&self) {
        self.shutdown.trigger();
    }

    /// Waits until the session has terminated and returns why.
    pub async fn wait_terminated(&mut self) -> TerminationReason {
        loop {
            if let SessionStatus::Terminated(reason) = &*self.status.borrow_and_update() {
                return reason.clone();
            }
            if self.status.changed().await.is_err() {
                return match &*self.status.borrow() {
                    SessionStatus::Terminated(reason) => reason.clone(),
                    _ => TerminationReason::Closed,
                };
            }
        }
    }

    /// Waits for both duties to finish.
    pub async fn join(self) {
        let SyncHandle { shutdown, task, .. } = self;
        if let Err(e) = task.await {
            warn!("Sync session task failed: {}", e);
        }
        drop(shutdown);
    }
}

/// Connects to a server over TCP and starts a session.
pub async fn connect(addr: &str, config: SyncConfig) -> Result<SyncHandle, ClientError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", addr);

    Ok(spawn(stream, config))
}

/// Starts a session over an already-open stream. Must be called from within a
/// tokio runtime.
pub fn spawn<S>(stream: S, config: SyncConfig) -> SyncHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (intent_tx, intent_rx) = watch::channel(InputState::default());
    let (view_tx, view_rx) = watch::channel(RemoteSnapshot::new(config.roster_mode));
    let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);
    let shutdown = Shutdown::new();

    let session = Session {
        config,
        status: Arc::new(status_tx),
        view: view_tx,
        intent: intent_rx,
    };
    let task = tokio::spawn(session.run(stream, shutdown.signal()));

    SyncHandle {
        intent: intent_tx,
        view: view_rx,
        status: status_rx,
        shutdown,
        task,
    }
}

struct Session {
    config: SyncConfig,
    status: Arc<watch::Sender<SessionStatus>>,
    view: watch::Sender<RemoteSnapshot>,
    intent: watch::Receiver<InputState>,
}

impl Session {
    async fn run<S>(self, stream: S, shutdown: ShutdownSignal)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let send_duty = tokio::spawn(run_send_duty(
            writer,
            self.intent,
            Arc::clone(&self.status),
            self.config.send_interval,
        ));

        let mut receiver = ReceiveDuty {
            reader: BufReader::new(reader),
            view: self.view,
            status: Arc::clone(&self.status),
        };
        let reason = receiver.run(shutdown).await;
        terminate(&self.status, reason);

        if let Err(e) = send_duty.await {
            warn!("Send duty failed: {}", e);
        }
    }
}

struct ReceiveDuty<S> {
    reader: BufReader<ReadHalf<S>>,
    view: watch::Sender<RemoteSnapshot>,
    status: Arc<watch::Sender<SessionStatus>>,
}

impl<S: AsyncRead> ReceiveDuty<S> {
    /// Reads lines until the session ends and returns why.
    async fn run(&mut self, mut shutdown: ShutdownSignal) -> TerminationReason {
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                _ = shutdown.wait() => return TerminationReason::Closed,
                read = read_line_limited(&mut self.reader, &mut line, MAX_SERVER_LINE) => read,
            };

            match read {
                Ok(0) => return TerminationReason::PeerClosed,
                Ok(_) => {}
                Err(LineError::Io(e)) => return TerminationReason::Transport(e.kind()),
                Err(LineError::Protocol(e)) => return TerminationReason::Protocol(e),
            }

            let message = match ServerMessage::decode(&line) {
                Ok(message) => message,
                Err(e) => return TerminationReason::Protocol(e),
            };

            if let Err(reason) = self.apply(message) {
                return reason;
            }
        }
    }

    fn apply(&mut self, message: ServerMessage) -> Result<(), TerminationReason> {
        let connected = self.status.borrow().is_connected();

        match message {
            ServerMessage::Handshake(handshake) if !connected => {
                info!(
                    "Assigned player id {} at ({}, {})",
                    handshake.id, handshake.x, handshake.y
                );
                self.view
                    .send_modify(|view| view.apply_handshake(&handshake));
                self.status.send_if_modified(|status| {
                    if status.is_terminated() {
                        return false;
                    }
                    *status = SessionStatus::Connected { id: handshake.id };
                    true
                });
                Ok(())
            }
            ServerMessage::Handshake(_) => Err(TerminationReason::Protocol(
                ProtocolError::OutOfSequence("second handshake"),
            )),
            ServerMessage::Snapshot(players) if connected => {
                self.view.send_modify(|view| view.apply_snapshot(&players));
                Ok(())
            }
            ServerMessage::Snapshot(_) => {
                Err(TerminationReason::Protocol(ProtocolError::OutOfSequence(
                    "snapshot before handshake",
                )))
            }
        }
    }
}

/// Sends the latest intent once per period while connected. Stops at the
/// first wake after the session is terminated.
async fn run_send_duty<S: AsyncWrite>(
    mut writer: WriteHalf<S>,
    intent: watch::Receiver<InputState>,
    status: Arc<watch::Sender<SessionStatus>>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let current = status.borrow().clone();
        match current {
            SessionStatus::Terminated(_) => break,
            SessionStatus::Connecting => continue,
            SessionStatus::Connected { .. } => {}
        }

        let message = intent.borrow().to_message();
        debug!("Sending input {:?}", message);

        if let Err(e) = write_line(&mut writer, &message.encode()).await {
            terminate(&status, TerminationReason::Transport(e.kind()));
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutting down writer: {}", e);
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Records the first termination reason; later ones are ignored.
fn terminate(status: &watch::Sender<SessionStatus>, reason: TerminationReason) {
    let changed = status.send_if_modified(|current| {
        if current.is_terminated() {
            return false;
        }
        *current = SessionStatus::Terminated(reason.clone());
        true
    });

    if changed {
        match &reason {
            TerminationReason::PeerClosed | TerminationReason::Closed => {
                info!("Session ended: {:?}", reason)
            }
            _ => warn!("Session ended: {:?}", reason),
        }
    }
}
