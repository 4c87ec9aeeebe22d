//! Registry of live client connections.
//!
//! A connection passes through three states:
//!
//! - **Connecting**: an id has been reserved but the handshake is not yet
//!   written. Counted against capacity, invisible to broadcasts.
//! - **Active**: registered here with an outbound queue; its player exists in
//!   the world.
//! - **Closed**: removed from the registry. Its id is never handed out again.
//!
//! Ids come from a monotonic counter, so removing one connection never changes
//! another connection's identity.

use crate::error::ConnectionError;
use log::{debug, info};
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

/// An active client and the queue its writer task drains.
#[derive(Debug)]
pub struct Client {
    /// Id of this client's player.
    pub id: PlayerId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Snapshot lines waiting to be written to the socket
    pub outbound: mpsc::Sender<Arc<str>>,
    /// Snapshots skipped because the queue was full
    pub dropped_snapshots: u64,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr, outbound: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbound,
            dropped_snapshots: 0,
        }
    }
}

/// Result of offering one snapshot line to every active client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub queued: usize,
    pub dropped: usize,
    pub closed: usize,
}

pub struct ClientManager {
    /// Active clients indexed by player id
    clients: HashMap<PlayerId, Client>,
    /// Reserved ids whose handshake is still in flight
    pending: usize,
    next_client_id: PlayerId,
    max_clients: Option<usize>,
}

impl ClientManager {
    pub fn new(max_clients: Option<usize>) -> Self {
        Self {
            clients: HashMap::new(),
            pending: 0,
            next_client_id: 1,
            max_clients,
        }
    }

    /// Reserves an id for a new connection entering the Connecting state.
    pub fn reserve(&mut self) -> Result<PlayerId, ConnectionError> {
        if let Some(max) = self.max_clients {
            if self.clients.len() + self.pending >= max {
                return Err(ConnectionError::CapacityExhausted(max));
            }
        }

        let id = self.next_client_id;
        self.next_client_id += 1;
        self.pending += 1;
        Ok(id)
    }

    /// Gives back a reservation whose handshake failed.
    pub fn release(&mut self, id: PlayerId) {
        self.pending = self.pending.saturating_sub(1);
        debug!("Released reservation for client {}", id);
    }

    /// Moves a reserved connection to Active.
    pub fn register(&mut self, id: PlayerId, addr: SocketAddr, outbound: mpsc::Sender<Arc<str>>) {
        self.pending = self.pending.saturating_sub(1);
        info!("Client {} connected from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr, outbound));
    }

    /// Removes a client. Dropping its queue lets the writer task finish.
    pub fn remove_client(&mut self, id: &PlayerId) -> Option<Client> {
        let client = self.clients.remove(id)?;
        info!(
            "Client {} disconnected after {:.1}s",
            client.id,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    /// Offers a line to every active client without waiting on any socket.
    pub fn broadcast(&mut self, line: &Arc<str>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for client in self.clients.values_mut() {
            match client.outbound.try_send(Arc::clone(line)) {
                Ok(()) => report.queued += 1,
                Err(TrySendError::Full(_)) => {
                    client.dropped_snapshots += 1;
                    report.dropped += 1;
                    debug!(
                        "Client {} is not keeping up, dropped snapshot ({} total)",
                        client.id, client.dropped_snapshots
                    );
                }
                // The connection task deregisters on its own.
                Err(TrySendError::Closed(_)) => report.closed += 1,
            }
        }

        report
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Returns the number of active clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn queue(depth: usize) -> (mpsc::Sender<Arc<str>>, mpsc::Receiver<Arc<str>>) {
        mpsc::channel(depth)
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(Some(5));
        assert_eq!(manager.max_clients, Some(5));
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn test_reserve_then_register() {
        let mut manager = ClientManager::new(None);
        let (tx, _rx) = queue(1);

        let id = manager.reserve().unwrap();
        assert_eq!(id, 1);
        assert_eq!(manager.pending(), 1);
        assert!(manager.is_empty());

        manager.register(id, test_addr(), tx);
        assert_eq!(manager.pending(), 0);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get(&id).unwrap().addr, test_addr());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut manager = ClientManager::new(None);
        let (tx, _rx) = queue(1);

        let first = manager.reserve().unwrap();
        manager.register(first, test_addr(), tx.clone());
        let second = manager.reserve().unwrap();
        manager.register(second, test_addr2(), tx.clone());

        manager.remove_client(&first);
        let third = manager.reserve().unwrap();

        assert_eq!((first, second, third), (1, 2, 3));
        assert!(manager.contains(&second));
        assert_eq!(manager.get(&second).unwrap().addr, test_addr2());
    }

    #[test]
    fn test_capacity_counts_pending_connections() {
        let mut manager = ClientManager::new(Some(2));
        let (tx, _rx) = queue(1);

        let id = manager.reserve().unwrap();
        manager.register(id, test_addr(), tx);
        let _pending = manager.reserve().unwrap();

        let err = manager.reserve().unwrap_err();
        assert!(matches!(err, ConnectionError::CapacityExhausted(2)));
    }

    #[test]
    fn test_release_frees_capacity() {
        let mut manager = ClientManager::new(Some(1));

        let id = manager.reserve().unwrap();
        assert!(manager.reserve().is_err());

        manager.release(id);
        assert_eq!(manager.pending(), 0);
        assert_eq!(manager.reserve().unwrap(), 2);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(None);
        assert!(manager.remove_client(&999).is_none());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(None);
        let (tx, _rx) = queue(1);

        let id1 = manager.reserve().unwrap();
        manager.register(id1, test_addr(), tx.clone());
        let id2 = manager.reserve().unwrap();
        manager.register(id2, test_addr2(), tx);

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(id1));
        assert_eq!(manager.ids(), vec![id1, id2]);

        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
    }

    #[test]
    fn test_broadcast_reports_full_and_closed_queues() {
        let mut manager = ClientManager::new(None);
        let (fast_tx, mut fast_rx) = queue(4);
        let (slow_tx, _slow_rx) = queue(1);
        let (gone_tx, gone_rx) = queue(1);
        drop(gone_rx);

        for (tx, port) in [(fast_tx, 1), (slow_tx, 2), (gone_tx, 3)] {
            let id = manager.reserve().unwrap();
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            manager.register(id, addr, tx);
        }

        let line: Arc<str> = Arc::from("1,0,0\n");
        let first = manager.broadcast(&line);
        assert_eq!(
            first,
            BroadcastReport {
                queued: 2,
                dropped: 0,
                closed: 1
            }
        );

        let second = manager.broadcast(&line);
        assert_eq!(second.queued, 1);
        assert_eq!(second.dropped, 1);
        assert_eq!(manager.get(&2).unwrap().dropped_snapshots, 1);

        assert_eq!(&*fast_rx.try_recv().unwrap(), "1,0,0\n");
        assert_eq!(&*fast_rx.try_recv().unwrap(), "1,0,0\n");
    }
}
