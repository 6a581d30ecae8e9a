//! # Peer Routing State
//!
//! The pipeline reports every peer it hears from to a [`PeerTable`] before
//! dispatching that peer's message. The table is shared by all connections,
//! so implementations must tolerate concurrent updates.
//!
//! Bucket maintenance policy is not decided here. [`AddressBook`] is the
//! bundled implementation: a bounded, lock-guarded record of who was seen
//! when and at which addresses.

pub mod address_book;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::protocol::message::PeerId;

pub use address_book::{AddressBook, PeerRecord};

/// Liveness hook invoked once per decoded inbound message.
///
/// A failure is logged by the caller and never prevents dispatch.
pub trait PeerTable: Send + Sync {
    fn touch<'a>(&'a self, peer: &'a PeerId) -> BoxFuture<'a, Result<()>>;
}
