//! Shared helpers for the integration tests: an in-memory duplex connection
//! with a pipeline on one end and a framed client on the other.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use kad_protocol::core::codec::FrameCodec;
use kad_protocol::error::{ProtocolError, Result};
use kad_protocol::protocol::dispatcher::HandlerRegistry;
use kad_protocol::protocol::message::{Message, PeerId};
use kad_protocol::protocol::pipeline::{ConnectionPipeline, ConnectionSummary, RpcContext};
use kad_protocol::routing::PeerTable;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

pub const MAX: usize = 1024;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::EnvFilter::from_default_env()
        } else {
            tracing_subscriber::EnvFilter::new("warn")
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn remote_peer() -> PeerId {
    PeerId::new(vec![0x5a; 32])
}

/// Peer table stub counting touches, optionally failing every one
#[derive(Default)]
pub struct StubTable {
    pub touches: AtomicUsize,
    pub fail: bool,
}

impl StubTable {
    pub fn failing() -> Self {
        Self {
            touches: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }
}

impl PeerTable for StubTable {
    fn touch<'a>(&'a self, _peer: &'a PeerId) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.touches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProtocolError::PeerUpdate("stub rejects everyone".into()))
            } else {
                Ok(())
            }
        })
    }
}

pub fn context(registry: HandlerRegistry, table: Arc<dyn PeerTable>) -> Arc<RpcContext> {
    Arc::new(RpcContext::new(registry, table).with_max_message_size(MAX))
}

pub fn encode(msg: &Message) -> Bytes {
    Bytes::from(msg.encode(MAX).expect("encodable message"))
}

pub fn client(stream: DuplexStream) -> Framed<DuplexStream, FrameCodec> {
    // the client may send frames larger than the server accepts
    Framed::new(stream, FrameCodec::new(usize::MAX))
}

/// Send `frames`, close the write side, and collect every response until the
/// pipeline closes the connection.
pub async fn exchange(
    ctx: Arc<RpcContext>,
    frames: Vec<Bytes>,
) -> (Vec<Message>, Result<ConnectionSummary>) {
    init_tracing();
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let pipeline = ConnectionPipeline::new(ctx, remote_peer());
    let server = tokio::spawn(pipeline.run(server_end));

    let mut client = client(client_end);
    for frame in frames {
        client.send(frame).await.expect("client send");
    }
    client.close().await.expect("client close");

    let mut responses = Vec::new();
    while let Some(frame) = client.next().await {
        let frame = frame.expect("client read");
        responses.push(Message::decode(&frame, MAX).expect("response decodes"));
    }

    let summary = server.await.expect("pipeline task");
    (responses, summary)
}
