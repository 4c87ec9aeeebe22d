//! Line-oriented text protocol spoken between the server and its clients.
//!
//! Every message is one ASCII line terminated by `\n`:
//!
//! - Handshake (server to client, once): `id:<id>,<x>,<y>`
//! - Input (client to server, periodic): `<dx>,<dy>,<fire>` with `dx`/`dy` in
//!   `-1..=1` and `fire` in `0..=1`
//! - Snapshot (server to client, periodic): `<id>,<x>,<y>` repeated once per
//!   connected player, all groups joined by commas
//!
//! Encoding is infallible and deterministic. Decoding accepts a line with or
//! without its terminator and tolerates a trailing `\r`. Readers cap each
//! line with [`read_line_limited`], so a peer that never sends `\n` cannot
//! grow a buffer without bound.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub type PlayerId = u32;

/// Longest input line the server reads, terminator included.
pub const MAX_INPUT_LINE: usize = 64;
/// Longest handshake or snapshot line a client reads, terminator included.
/// Fits well over a thousand players.
pub const MAX_SERVER_LINE: usize = 64 * 1024;

const HANDSHAKE_PREFIX: &str = "id:";
const GROUP_FIELDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("snapshot has {found} fields, not a multiple of 3")]
    IncompleteGroup { found: usize },
    #[error("field {index} is empty")]
    EmptyField { index: usize },
    #[error("field {index} is not a valid number: {value:?}")]
    InvalidNumber { index: usize, value: String },
    #[error("field {index} is out of range: {value}")]
    OutOfRange { index: usize, value: i64 },
    #[error("handshake is missing the `id:` prefix")]
    MissingPrefix,
    #[error("{0} received out of sequence")]
    OutOfSequence(&'static str),
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Failure reading one line off a stream.
#[derive(Debug, Error)]
pub enum LineError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Id and authoritative spawn position assigned to a freshly connected client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handshake {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
}

impl Handshake {
    pub fn encode(&self) -> String {
        format!("{HANDSHAKE_PREFIX}{},{},{}\n", self.id, self.x, self.y)
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let body = strip_terminator(line);
        if body.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let body = body
            .strip_prefix(HANDSHAKE_PREFIX)
            .ok_or(ProtocolError::MissingPrefix)?;

        let fields = split_fields(body, Some(GROUP_FIELDS))?;
        Ok(Self {
            id: parse_id(fields[0], 0)?,
            x: parse_coordinate(fields[1], 1)?,
            y: parse_coordinate(fields[2], 2)?,
        })
    }
}

/// Directional intent sent by a client while keys are held.
///
/// The deltas are accelerations to apply, not absolute velocities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputMessage {
    pub dx: i8,
    pub dy: i8,
    pub fire: bool,
}

impl InputMessage {
    pub fn encode(&self) -> String {
        format!("{},{},{}\n", self.dx, self.dy, u8::from(self.fire))
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let body = strip_terminator(line);
        if body.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let fields = split_fields(body, Some(GROUP_FIELDS))?;
        let dx = parse_bounded(fields[0], 0, -1, 1)?;
        let dy = parse_bounded(fields[1], 1, -1, 1)?;
        let fire = parse_bounded(fields[2], 2, 0, 1)?;

        Ok(Self {
            dx,
            dy,
            fire: fire == 1,
        })
    }
}

/// One player's entry in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
}

pub fn encode_snapshot(players: &[PlayerPosition]) -> String {
    let body = players
        .iter()
        .map(|p| format!("{},{},{}", p.id, p.x, p.y))
        .collect::<Vec<_>>()
        .join(",");
    format!("{body}\n")
}

/// Decodes a snapshot line. A blank line is a snapshot of zero players.
pub fn decode_snapshot(line: &str) -> Result<Vec<PlayerPosition>, ProtocolError> {
    let body = strip_terminator(line);
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let fields = split_fields(body, None)?;
    if fields.len() % GROUP_FIELDS != 0 {
        return Err(ProtocolError::IncompleteGroup {
            found: fields.len(),
        });
    }

    fields
        .chunks(GROUP_FIELDS)
        .enumerate()
        .map(|(group, chunk)| {
            let base = group * GROUP_FIELDS;
            Ok(PlayerPosition {
                id: parse_id(chunk[0], base)?,
                x: parse_coordinate(chunk[1], base + 1)?,
                y: parse_coordinate(chunk[2], base + 2)?,
            })
        })
        .collect()
}

/// Anything a client can receive from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Handshake(Handshake),
    Snapshot(Vec<PlayerPosition>),
}

impl ServerMessage {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        if strip_terminator(line).starts_with(HANDSHAKE_PREFIX) {
            Handshake::decode(line).map(ServerMessage::Handshake)
        } else {
            decode_snapshot(line).map(ServerMessage::Snapshot)
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ServerMessage::Handshake(handshake) => handshake.encode(),
            ServerMessage::Snapshot(players) => encode_snapshot(players),
        }
    }
}

/// Appends one line of at most `limit` bytes to `line` and returns the byte
/// count, zero at EOF. A line that reaches `limit` without its terminator is
/// [`ProtocolError::LineTooLong`].
pub async fn read_line_limited<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
    limit: usize,
) -> Result<usize, LineError> {
    let read = (&mut *reader).take(limit as u64).read_line(line).await?;
    if read == limit && !line.ends_with('\n') {
        return Err(ProtocolError::LineTooLong { limit }.into());
    }
    Ok(read)
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn split_fields(body: &str, expected: Option<usize>) -> Result<Vec<&str>, ProtocolError> {
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();

    if let Some(expected) = expected {
        if fields.len() != expected {
            return Err(ProtocolError::FieldCount {
                expected,
                found: fields.len(),
            });
        }
    }

    if let Some(index) = fields.iter().position(|f| f.is_empty()) {
        return Err(ProtocolError::EmptyField { index });
    }

    Ok(fields)
}

fn invalid(field: &str, index: usize) -> ProtocolError {
    ProtocolError::InvalidNumber {
        index,
        value: field.to_string(),
    }
}

fn parse_id(field: &str, index: usize) -> Result<PlayerId, ProtocolError> {
    field.parse().map_err(|_| invalid(field, index))
}

fn parse_coordinate(field: &str, index: usize) -> Result<f32, ProtocolError> {
    match field.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(invalid(field, index)),
    }
}

fn parse_bounded(field: &str, index: usize, min: i8, max: i8) -> Result<i8, ProtocolError> {
    let value: i64 = field.parse().map_err(|_| invalid(field, index))?;
    match i8::try_from(value) {
        Ok(v) if (min..=max).contains(&v) => Ok(v),
        _ => Err(ProtocolError::OutOfRange { index, value }),
    }
}
