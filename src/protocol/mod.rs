//! # DHT Protocol Layer
//!
//! Message envelope, kind-based dispatch and the per-connection pipeline.
//!
//! ## Components
//! - **Message**: the envelope carried by every frame (`kind`, key, value,
//!   closer and provider peers, cluster level)
//! - **Dispatcher**: registry mapping each message kind to a handler
//! - **Pipeline**: decode, peer update, dispatch and encode, one message at a
//!   time per connection
//!
//! ## Message Kinds
//! | Kind | Wire number |
//! |------|-------------|
//! | PUT_VALUE | 0 |
//! | GET_VALUE | 1 |
//! | ADD_PROVIDER | 2 |
//! | GET_PROVIDERS | 3 |
//! | FIND_NODE | 4 |
//! | PING | 5 |

pub mod dispatcher;
pub mod message;
pub mod pipeline;

#[cfg(test)]
mod tests;
