//! # kad-protocol
//!
//! Wire-protocol core of a Kademlia DHT node: it takes inbound protocol
//! streams from other peers, splits them into length-prefixed frames, decodes
//! the message envelope, records the sender in the shared peer table,
//! dispatches to the handler registered for the message kind and writes the
//! encoded response back on the same stream.
//!
//! ## Modules
//! - [`core`]: varint frame codec and bounded envelope serialization
//! - [`protocol`]: message envelope, handler registry, connection pipeline
//! - [`routing`]: the [`PeerTable`](routing::PeerTable) hook and the bundled
//!   [`AddressBook`](routing::AddressBook)
//! - [`service`]: runs one pipeline per inbound stream with graceful shutdown
//! - [`config`], [`error`], [`utils`]: configuration, error types, metrics
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use kad_protocol::config::KadConfig;
//! use kad_protocol::protocol::dispatcher::{handlers, HandlerRegistry};
//! use kad_protocol::protocol::message::{MessageKind, PeerId};
//! use kad_protocol::routing::AddressBook;
//! use kad_protocol::service::RpcService;
//!
//! # async fn run(stream: tokio::io::DuplexStream) -> kad_protocol::error::Result<()> {
//! let registry = HandlerRegistry::new();
//! registry.register(MessageKind::Ping, handlers::ping)?;
//!
//! let book = AddressBook::default();
//! let service = RpcService::new(KadConfig::default(), registry, Arc::new(book))?;
//!
//! // `stream` comes from the transport, already bound to a verified peer
//! let peer = PeerId::new(vec![1, 2, 3]);
//! let summary = service.spawn_connection(peer, stream).await.ok();
//! # let _ = summary;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod routing;
pub mod service;
pub mod utils;

pub use error::{ProtocolError, Result};
pub use protocol::dispatcher::HandlerRegistry;
pub use protocol::message::{ConnectionType, Message, MessageKind, PeerDescriptor, PeerId};
pub use protocol::pipeline::{ConnectionPipeline, ConnectionSummary, PipelineState, RpcContext};
pub use routing::{AddressBook, PeerTable};
pub use service::RpcService;
