//! Client-side view of the world, rebuilt from every snapshot the server sends.

use log::debug;
use shared::{Handshake, PlayerId, PlayerPosition};
use std::collections::HashMap;

/// How remote players in a new snapshot are matched to the entities already
/// on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RosterMode {
    /// Match by server-assigned id. Joins and leaves never move state between
    /// players.
    #[default]
    ById,
    /// Match by position in the snapshot list. When a player in the middle of
    /// the list leaves, everyone after it inherits its neighbour's entity.
    Positional,
}

/// Authoritative position of this client's own player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlayer {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
}

/// One other player as last reported by the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePlayer {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    /// Position before the most recent update, for interpolation.
    pub prev_x: f32,
    pub prev_y: f32,
    /// Snapshots this entity has been updated from.
    pub updates: u64,
}

impl RemotePlayer {
    fn spawn(position: &PlayerPosition) -> Self {
        Self {
            id: position.id,
            x: position.x,
            y: position.y,
            prev_x: position.x,
            prev_y: position.y,
            updates: 1,
        }
    }

    fn update(&mut self, position: &PlayerPosition) {
        self.id = position.id;
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.x = position.x;
        self.y = position.y;
        self.updates += 1;
    }

    /// Linear blend between the previous and current position, `t` in `[0, 1]`.
    pub fn interpolate(&self, t: f32) -> (f32, f32) {
        let t = t.clamp(0.0, 1.0);
        (
            self.prev_x + (self.x - self.prev_x) * t,
            self.prev_y + (self.y - self.prev_y) * t,
        )
    }
}

/// Most recent reconciled view, read by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    local: Option<LocalPlayer>,
    remotes: Vec<RemotePlayer>,
    snapshots_applied: u64,
    mode: RosterMode,
}

impl RemoteSnapshot {
    pub fn new(mode: RosterMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn apply_handshake(&mut self, handshake: &Handshake) {
        self.local = Some(LocalPlayer {
            id: handshake.id,
            x: handshake.x,
            y: handshake.y,
        });
    }

    /// Splits a snapshot into this client's own entry and everyone else, then
    /// reconciles the remote roster according to the roster mode.
    pub fn apply_snapshot(&mut self, players: &[PlayerPosition]) {
        let local_id = self.local_id();
        let mut others = Vec::with_capacity(players.len());

        for position in players {
            match self.local.as_mut() {
                Some(local) if Some(position.id) == local_id => {
                    local.x = position.x;
                    local.y = position.y;
                }
                _ => others.push(*position),
            }
        }

        match self.mode {
            RosterMode::ById => self.reconcile_by_id(&others),
            RosterMode::Positional => self.reconcile_positional(&others),
        }

        self.snapshots_applied += 1;
        debug!(
            "Applied snapshot {}: {} remote players",
            self.snapshots_applied,
            self.remotes.len()
        );
    }

    fn reconcile_by_id(&mut self, others: &[PlayerPosition]) {
        let mut previous: HashMap<PlayerId, RemotePlayer> =
            self.remotes.drain(..).map(|r| (r.id, r)).collect();

        self.remotes = others
            .iter()
            .map(|position| match previous.remove(&position.id) {
                Some(mut existing) => {
                    existing.update(position);
                    existing
                }
                None => RemotePlayer::spawn(position),
            })
            .collect();
    }

    fn reconcile_positional(&mut self, others: &[PlayerPosition]) {
        self.remotes.truncate(others.len());

        for (index, position) in others.iter().enumerate() {
            match self.remotes.get_mut(index) {
                Some(slot) => slot.update(position),
                None => self.remotes.push(RemotePlayer::spawn(position)),
            }
        }
    }

    pub fn local(&self) -> Option<&LocalPlayer> {
        self.local.as_ref()
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local.map(|local| local.id)
    }

    /// Remote players in the order of the last snapshot.
    pub fn remotes(&self) -> &[RemotePlayer] {
        &self.remotes
    }

    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots_applied
    }

    pub fn mode(&self) -> RosterMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn pos(id: PlayerId, x: f32, y: f32) -> PlayerPosition {
        PlayerPosition { id, x, y }
    }

    fn joined(mode: RosterMode, id: PlayerId) -> RemoteSnapshot {
        let mut view = RemoteSnapshot::new(mode);
        view.apply_handshake(&Handshake {
            id,
            x: 100.0,
            y: 100.0,
        });
        view
    }

    #[test]
    fn test_handshake_sets_local_player() {
        let view = joined(RosterMode::ById, 4);
        assert_eq!(view.local_id(), Some(4));
        assert_eq!(view.local().unwrap().x, 100.0);
        assert!(view.remotes().is_empty());
        assert_eq!(view.snapshots_applied(), 0);
    }

    #[test]
    fn test_snapshot_splits_self_from_others() {
        let mut view = joined(RosterMode::ById, 2);
        view.apply_snapshot(&[pos(1, 5.0, 6.0), pos(2, 7.0, 8.0), pos(3, 9.0, 10.0)]);

        let local = view.local().unwrap();
        assert_eq!((local.x, local.y), (7.0, 8.0));

        let ids: Vec<PlayerId> = view.remotes().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(view.snapshots_applied(), 1);
    }

    #[test]
    fn test_missing_self_keeps_last_position() {
        let mut view = joined(RosterMode::ById, 2);
        view.apply_snapshot(&[pos(1, 5.0, 6.0)]);

        let local = view.local().unwrap();
        assert_eq!((local.x, local.y), (100.0, 100.0));
        assert_eq!(view.remotes().len(), 1);
    }

    #[test]
    fn test_roster_grows_and_shrinks() {
        let mut view = joined(RosterMode::ById, 1);
        view.apply_snapshot(&[pos(1, 0.0, 0.0), pos(2, 1.0, 1.0)]);
        assert_eq!(view.remotes().len(), 1);

        view.apply_snapshot(&[pos(1, 0.0, 0.0), pos(2, 1.0, 1.0), pos(3, 2.0, 2.0)]);
        assert_eq!(view.remotes().len(), 2);
        assert_eq!(view.remotes()[1].updates, 1);

        view.apply_snapshot(&[pos(1, 0.0, 0.0)]);
        assert!(view.remotes().is_empty());
    }

    #[test]
    fn test_by_id_survives_a_middle_player_leaving() {
        let mut view = joined(RosterMode::ById, 1);
        view.apply_snapshot(&[pos(2, 10.0, 10.0), pos(3, 30.0, 30.0), pos(4, 40.0, 40.0)]);
        view.apply_snapshot(&[pos(2, 11.0, 10.0), pos(4, 41.0, 40.0)]);

        let remotes = view.remotes();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[1].id, 4);
        assert_eq!(remotes[1].prev_x, 40.0);
        assert_eq!(remotes[1].x, 41.0);
        assert_eq!(remotes[1].updates, 2);
    }

    #[test]
    fn test_positional_inherits_neighbour_state() {
        let mut view = joined(RosterMode::Positional, 1);
        view.apply_snapshot(&[pos(2, 10.0, 10.0), pos(3, 30.0, 30.0), pos(4, 40.0, 40.0)]);
        view.apply_snapshot(&[pos(2, 11.0, 10.0), pos(4, 41.0, 40.0)]);

        let remotes = view.remotes();
        assert_eq!(remotes.len(), 2);
        // Player 4 now occupies the slot that used to hold player 3.
        assert_eq!(remotes[1].id, 4);
        assert_eq!(remotes[1].prev_x, 30.0);
        assert_eq!(remotes[1].x, 41.0);
    }

    #[test]
    fn test_interpolation() {
        let mut view = joined(RosterMode::ById, 1);
        view.apply_snapshot(&[pos(2, 0.0, 10.0)]);
        view.apply_snapshot(&[pos(2, 10.0, 20.0)]);

        let remote = view.remotes()[0];
        assert_eq!(remote.interpolate(0.0), (0.0, 10.0));
        let (x, y) = remote.interpolate(0.25);
        assert_approx_eq!(x, 2.5);
        assert_approx_eq!(y, 12.5);
        assert_eq!(remote.interpolate(2.0), (10.0, 20.0));
    }
}
