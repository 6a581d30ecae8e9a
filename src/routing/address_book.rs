//! # Address Book
//!
//! Shared, bounded record of known peers.
//!
//! ## Features
//! - **Thread-safe**: one `tokio::sync::RwLock` guards the whole map; clones
//!   share the same state
//! - **Memory-bounded**: a full book refuses new peers instead of growing
//! - **Liveness**: each touch refreshes `last_seen` and bumps a message count
//!
//! ## Usage
//! ```ignore
//! let book = AddressBook::new(1024);
//! book.touch(&peer).await?;
//! assert!(book.contains(&peer).await);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::PeerTable;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{PeerDescriptor, PeerId};

/// Default number of peers an address book will hold
pub const DEFAULT_CAPACITY: usize = 4096;

/// What is known about one peer
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub addresses: Vec<Vec<u8>>,
    pub first_seen: Instant,
    pub last_seen: Instant,
    /// Inbound messages attributed to this peer
    pub messages: u64,
}

impl PeerRecord {
    fn new(now: Instant) -> Self {
        Self {
            addresses: Vec::new(),
            first_seen: now,
            last_seen: now,
            messages: 0,
        }
    }

    fn merge_addresses(&mut self, addresses: &[Vec<u8>]) {
        for addr in addresses {
            if !self.addresses.contains(addr) {
                self.addresses.push(addr.clone());
            }
        }
    }
}

/// Concurrency-safe peer map with a capacity bound
#[derive(Debug, Clone)]
pub struct AddressBook {
    capacity: usize,
    inner: Arc<RwLock<HashMap<PeerId, PeerRecord>>>,
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AddressBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refresh `peer`, inserting it if there is room.
    pub async fn record_seen(&self, peer: &PeerId) -> Result<()> {
        if peer.is_empty() {
            return Err(ProtocolError::PeerUpdate(constants::ERR_EMPTY_PEER.to_string()));
        }

        let now = Instant::now();
        let mut peers = self.inner.write().await;
        if let Some(record) = peers.get_mut(peer) {
            record.last_seen = now;
            record.messages += 1;
            trace!(component = "address_book", peer = %peer, "Peer refreshed");
            return Ok(());
        }

        if peers.len() >= self.capacity {
            return Err(ProtocolError::PeerUpdate(format!(
                "{} ({} peers)",
                constants::ERR_ADDRESS_BOOK_FULL,
                self.capacity
            )));
        }

        let mut record = PeerRecord::new(now);
        record.messages = 1;
        peers.insert(peer.clone(), record);
        debug!(component = "address_book", peer = %peer, "Peer added");
        Ok(())
    }

    /// Merge the addresses of a described peer, inserting it if there is room.
    pub async fn add_addresses(&self, descriptor: &PeerDescriptor) -> Result<()> {
        if descriptor.id.is_empty() {
            return Err(ProtocolError::PeerUpdate(constants::ERR_EMPTY_PEER.to_string()));
        }

        let mut peers = self.inner.write().await;
        let full = peers.len() >= self.capacity;
        match peers.get_mut(&descriptor.id) {
            Some(record) => record.merge_addresses(&descriptor.addresses),
            None if full => {
                return Err(ProtocolError::PeerUpdate(
                    constants::ERR_ADDRESS_BOOK_FULL.to_string(),
                ))
            }
            None => {
                let mut record = PeerRecord::new(Instant::now());
                record.merge_addresses(&descriptor.addresses);
                peers.insert(descriptor.id.clone(), record);
            }
        }
        Ok(())
    }

    pub async fn get(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.inner.read().await.get(peer).cloned()
    }

    pub async fn contains(&self, peer: &PeerId) -> bool {
        self.inner.read().await.contains_key(peer)
    }

    pub async fn remove(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.inner.write().await.remove(peer)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Snapshot of every known peer as a descriptor
    pub async fn peers(&self) -> Vec<PeerDescriptor> {
        let peers = self.inner.read().await;
        let mut out: Vec<PeerDescriptor> = peers
            .iter()
            .map(|(id, record)| PeerDescriptor {
                id: id.clone(),
                addresses: record.addresses.clone(),
                connection: Default::default(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

impl PeerTable for AddressBook {
    fn touch<'a>(&'a self, peer: &'a PeerId) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.record_seen(peer))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn id(byte: u8) -> PeerId {
        PeerId::new(vec![byte; 8])
    }

    #[tokio::test]
    async fn touch_inserts_then_refreshes() {
        let book = AddressBook::new(4);
        book.touch(&id(1)).await.unwrap();
        let first = book.get(&id(1)).await.unwrap();
        assert_eq!(first.messages, 1);

        book.touch(&id(1)).await.unwrap();
        let second = book.get(&id(1)).await.unwrap();
        assert_eq!(second.messages, 2);
        assert!(second.last_seen >= first.last_seen);
        assert_eq!(second.first_seen, first.first_seen);
        assert_eq!(book.len().await, 1);
    }

    #[tokio::test]
    async fn full_book_rejects_new_peers_but_refreshes_known() {
        let book = AddressBook::new(2);
        book.touch(&id(1)).await.unwrap();
        book.touch(&id(2)).await.unwrap();

        let err = book.touch(&id(3)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::PeerUpdate(_)));
        assert!(!book.contains(&id(3)).await);

        book.touch(&id(1)).await.unwrap();
    }

    #[tokio::test]
    async fn empty_peer_rejected() {
        let book = AddressBook::default();
        assert!(book.touch(&PeerId::new(Vec::new())).await.is_err());
        assert!(book.is_empty().await);
    }

    #[tokio::test]
    async fn addresses_are_merged_without_duplicates() {
        let book = AddressBook::new(4);
        let desc = PeerDescriptor::new(id(1)).with_address(b"/ip4/1.2.3.4".to_vec());
        book.add_addresses(&desc).await.unwrap();
        book.add_addresses(&desc.clone().with_address(b"/ip6/::1".to_vec()))
            .await
            .unwrap();

        let record = book.get(&id(1)).await.unwrap();
        assert_eq!(record.addresses.len(), 2);

        let peers = book.peers().await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, id(1));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let book = AddressBook::new(4);
        let other = book.clone();
        other.touch(&id(9)).await.unwrap();
        assert!(book.contains(&id(9)).await);
        assert!(book.remove(&id(9)).await.is_some());
        assert!(!other.contains(&id(9)).await);
    }
}
