//! # Protocol Service
//!
//! Front end that turns authenticated inbound streams into running
//! connection pipelines.
//!
//! Transport setup (listening, multiplexing, encryption, protocol
//! negotiation) happens elsewhere; this layer is handed `(PeerId, stream)`
//! pairs and owns only their pipelines' lifetimes.

pub mod server;

pub use server::RpcService;
