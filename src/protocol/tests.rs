// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::{handlers, HandlerRegistry};
use crate::protocol::message::{Message, MessageKind, PeerDescriptor, PeerId};
use crate::protocol::pipeline::{ConnectionPipeline, PipelineState, RpcContext};
use crate::routing::{AddressBook, PeerTable};

const MAX: usize = 4096;

/// Peer table that counts touches and can be told to fail
#[derive(Default)]
struct CountingTable {
    touches: AtomicUsize,
    fail: bool,
}

impl PeerTable for CountingTable {
    fn touch<'a>(&'a self, _peer: &'a PeerId) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.touches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProtocolError::PeerUpdate("rejected".into()))
            } else {
                Ok(())
            }
        })
    }
}

fn remote() -> PeerId {
    PeerId::new(vec![0xaa; 8])
}

fn pipeline(registry: HandlerRegistry, table: Arc<dyn PeerTable>) -> ConnectionPipeline {
    let ctx = RpcContext::new(registry, table).with_max_message_size(MAX);
    ConnectionPipeline::new(Arc::new(ctx), remote())
}

fn buggy_handler() -> Result<Option<Message>> {
    panic!("handler bug")
}

fn frame(msg: &Message) -> Bytes {
    Bytes::from(msg.encode(MAX).unwrap())
}

#[tokio::test]
async fn ping_is_answered_with_ping() {
    let registry = HandlerRegistry::new();
    registry.register(MessageKind::Ping, handlers::ping).unwrap();
    let mut pipe = pipeline(registry, Arc::new(AddressBook::default()));

    let response = pipe.process_frame(frame(&Message::ping())).await.unwrap();
    let decoded = Message::decode(&response, MAX).unwrap();
    assert_eq!(decoded.kind, MessageKind::Ping);
    assert_eq!(pipe.state(), PipelineState::AwaitingFrame);
}

#[tokio::test]
async fn garbage_frame_is_dropped_before_peer_update() {
    let table = Arc::new(CountingTable::default());
    let registry = HandlerRegistry::new();
    registry.register(MessageKind::Ping, handlers::ping).unwrap();
    let mut pipe = pipeline(registry, table.clone());

    assert!(pipe
        .process_frame(Bytes::from_static(&[1, 2, 3]))
        .await
        .is_none());
    assert_eq!(table.touches.load(Ordering::SeqCst), 0);
    assert_eq!(pipe.state(), PipelineState::AwaitingFrame);
}

#[tokio::test]
async fn peer_table_failure_does_not_block_dispatch() {
    let table = Arc::new(CountingTable {
        touches: AtomicUsize::new(0),
        fail: true,
    });
    let registry = HandlerRegistry::new();
    registry.register(MessageKind::Ping, handlers::ping).unwrap();
    let mut pipe = pipeline(registry, table.clone());

    assert!(pipe.process_frame(frame(&Message::ping())).await.is_some());
    assert_eq!(table.touches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_kind_touches_peer_but_returns_nothing() {
    let table = Arc::new(CountingTable::default());
    let mut pipe = pipeline(HandlerRegistry::new(), table.clone());

    let mut msg = Message::ping();
    msg.kind = MessageKind::Unknown(31);
    assert!(pipe.process_frame(frame(&msg)).await.is_none());
    assert_eq!(table.touches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_error_yields_no_response() {
    let registry = HandlerRegistry::new();
    registry
        .register(MessageKind::GetValue, |_peer, _msg| async {
            Err(ProtocolError::Handler("store unavailable".into()))
        })
        .unwrap();
    let mut pipe = pipeline(registry, Arc::new(AddressBook::default()));

    let msg = Message::new(MessageKind::GetValue, Some(b"k".to_vec()), 0);
    assert!(pipe.process_frame(frame(&msg)).await.is_none());
    assert_eq!(pipe.state(), PipelineState::AwaitingFrame);
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let registry = HandlerRegistry::new();
    registry
        .register(MessageKind::AddProvider, |_peer, _msg| async { buggy_handler() })
        .unwrap();
    registry.register(MessageKind::Ping, handlers::ping).unwrap();
    let mut pipe = pipeline(registry, Arc::new(AddressBook::default()));

    let msg = Message::new(MessageKind::AddProvider, Some(b"cid".to_vec()), 0);
    assert!(pipe.process_frame(frame(&msg)).await.is_none());
    assert!(pipe.process_frame(frame(&Message::ping())).await.is_some());
}

#[tokio::test]
async fn handler_panic_before_first_poll_is_contained() {
    let registry = HandlerRegistry::new();
    registry
        .register(MessageKind::GetValue, |_peer, msg: Message| {
            // panics while building the future, not while it runs
            let value = msg.value.clone().unwrap();
            async move { Ok(Some(Message::response_to(&msg).with_value(value))) }
        })
        .unwrap();
    registry.register(MessageKind::Ping, handlers::ping).unwrap();
    let mut pipe = pipeline(registry, Arc::new(AddressBook::default()));

    let msg = Message::new(MessageKind::GetValue, Some(b"k".to_vec()), 0);
    assert!(pipe.process_frame(frame(&msg)).await.is_none());
    assert_eq!(pipe.state(), PipelineState::AwaitingFrame);
    assert!(pipe.process_frame(frame(&Message::ping())).await.is_some());
}

#[tokio::test]
async fn unencodable_response_is_dropped() {
    let registry = HandlerRegistry::new();
    registry
        .register(MessageKind::FindNode, |_peer, msg: Message| async move {
            Ok(Some(Message::response_to(&msg).with_closer_peers(vec![
                PeerDescriptor::new(PeerId::new(Vec::new())),
            ])))
        })
        .unwrap();
    let mut pipe = pipeline(registry, Arc::new(AddressBook::default()));

    let msg = Message::new(MessageKind::FindNode, Some(b"target".to_vec()), 0);
    assert!(pipe.process_frame(frame(&msg)).await.is_none());
}

#[tokio::test]
async fn peer_is_recorded_in_shared_address_book() {
    let book = AddressBook::new(8);
    let registry = HandlerRegistry::new();
    registry.register(MessageKind::Ping, handlers::ping).unwrap();
    let mut pipe = pipeline(registry, Arc::new(book.clone()));

    pipe.process_frame(frame(&Message::ping())).await;
    pipe.process_frame(frame(&Message::ping())).await;

    let record = book.get(&remote()).await.unwrap();
    assert_eq!(record.messages, 2);
}
