//! # Connection Pipeline
//!
//! One pipeline serves one inbound protocol stream from one verified peer:
//!
//! ```text
//! AwaitingFrame -> Decoding -> PeerUpdating -> Dispatching -> Encoding -> AwaitingFrame
//!       \______________ any state, on stream end or stream error ______________> Closed
//! ```
//!
//! The loop is pull-driven. The next frame is requested from the stream only
//! after the current one has left the loop, either through a flushed response
//! write or through one of the drop points. That keeps exactly one message in
//! flight per connection, answers requests in arrival order (the protocol has
//! no request ids, order is the only correlation) and throttles a fast sender
//! to the pace of its handlers.
//!
//! Every per-message failure is logged, counted and contained to that
//! message. Only stream failures end the pipeline.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::MAX_MESSAGE_SIZE;
use crate::core::codec::FrameCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::HandlerRegistry;
use crate::protocol::message::{Message, PeerId};
use crate::routing::PeerTable;
use crate::utils::metrics::{Metrics, Timer};

/// State shared by every pipeline of a node
pub struct RpcContext {
    pub registry: HandlerRegistry,
    pub peer_table: Arc<dyn PeerTable>,
    pub metrics: Arc<Metrics>,
    pub max_message_size: usize,
}

impl RpcContext {
    pub fn new(registry: HandlerRegistry, peer_table: Arc<dyn PeerTable>) -> Self {
        Self {
            registry,
            peer_table,
            metrics: Arc::new(Metrics::new()),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl std::fmt::Debug for RpcContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcContext")
            .field("registry", &self.registry)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

/// Where a pipeline is within its per-message loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    AwaitingFrame,
    Decoding,
    PeerUpdating,
    Dispatching,
    Encoding,
    Closed,
}

/// What a pipeline did before its stream closed cleanly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Frames that passed the size check
    pub frames_processed: u64,
    /// Frames skipped for exceeding the size bound
    pub frames_oversized: u64,
    pub responses_written: u64,
}

/// Decrements the active connection gauge however the pipeline ends,
/// including when its task is aborted.
struct ActiveConnection(Arc<Metrics>);

impl ActiveConnection {
    fn open(metrics: Arc<Metrics>) -> Self {
        metrics.connection_opened();
        Self(metrics)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

/// Per-connection request/response loop
#[derive(Debug)]
pub struct ConnectionPipeline {
    ctx: Arc<RpcContext>,
    peer: PeerId,
    state: PipelineState,
}

impl ConnectionPipeline {
    pub fn new(ctx: Arc<RpcContext>, peer: PeerId) -> Self {
        Self {
            ctx,
            peer,
            state: PipelineState::AwaitingFrame,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        trace!(component = "rpc", from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }

    /// Serve `stream` until it ends.
    ///
    /// Returns `Ok` on a clean end of stream, `Err` on a read or write failure
    /// (which ends this connection only).
    #[instrument(name = "rpc", skip_all, fields(peer = %self.peer))]
    pub async fn run<S>(mut self, stream: S) -> Result<ConnectionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _active = ActiveConnection::open(self.ctx.metrics.clone());
        let codec =
            FrameCodec::new(self.ctx.max_message_size).with_metrics(self.ctx.metrics.clone());
        let mut framed = Framed::new(stream, codec);
        let mut summary = ConnectionSummary::default();

        debug!(component = "rpc", "Connection opened");

        let outcome = loop {
            self.transition(PipelineState::AwaitingFrame);
            let frame = match framed.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            };
            summary.frames_processed += 1;

            let Some(response) = self.process_frame(frame).await else {
                continue;
            };

            let len = response.len() as u64;
            match framed.send(response).await {
                Ok(()) => {
                    self.ctx.metrics.response_sent(len);
                    summary.responses_written += 1;
                }
                Err(e) if !e.is_connection_fatal() => {
                    self.ctx.metrics.encode_error();
                    warn!(component = "rpc", error = %e, "Failed to send message");
                }
                Err(e) => break Err(e),
            }
        };

        self.transition(PipelineState::Closed);
        summary.frames_oversized = framed.codec().oversized_frames();

        match outcome {
            Ok(()) => {
                debug!(
                    component = "rpc",
                    frames = summary.frames_processed,
                    responses = summary.responses_written,
                    "Connection closed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.ctx.metrics.stream_error();
                error!(component = "rpc", error = %e, "Connection terminated");
                Err(e)
            }
        }
    }

    /// Take one frame through decode, peer update, dispatch and encode.
    ///
    /// Returns the encoded response, or `None` when the message was dropped
    /// or produced nothing to send. Always leaves the pipeline in
    /// `AwaitingFrame`.
    pub async fn process_frame(&mut self, frame: Bytes) -> Option<Bytes> {
        let response = self.handle_frame(frame).await;
        self.transition(PipelineState::AwaitingFrame);
        response
    }

    async fn handle_frame(&mut self, frame: Bytes) -> Option<Bytes> {
        let metrics = self.ctx.metrics.clone();
        let max = self.ctx.max_message_size;
        metrics.frame_received(frame.len() as u64);

        self.transition(PipelineState::Decoding);
        let msg = match Message::decode(&frame, max) {
            Ok(msg) => msg,
            Err(e) => {
                metrics.decode_error();
                warn!(component = "rpc", bytes = frame.len(), error = %e, "Failed to read incoming message");
                return None;
            }
        };

        self.transition(PipelineState::PeerUpdating);
        if let Err(e) = self.ctx.peer_table.touch(&self.peer).await {
            metrics.peer_update_error();
            warn!(component = "rpc", error = %e, "Failed to update the peer table");
        }

        self.transition(PipelineState::Dispatching);
        let response = self.dispatch(msg).await?;

        self.transition(PipelineState::Encoding);
        match response.encode(max) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                metrics.encode_error();
                warn!(component = "rpc", kind = %response.kind, error = %e, "Failed to encode response");
                None
            }
        }
    }

    async fn dispatch(&self, msg: Message) -> Option<Message> {
        let metrics = &self.ctx.metrics;
        let kind = msg.kind;

        // the handler is invoked while the guarded future is polled, so a
        // panic while building its future is caught as well
        let _timer = Timer::start("handler");
        let outcome = AssertUnwindSafe(self.ctx.registry.dispatch(self.peer.clone(), msg))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ProtocolError::Handler(format!("{kind} handler panicked"))));

        match outcome {
            Err(ProtocolError::UnknownKind(_)) => {
                metrics.unknown_kind();
                warn!(component = "rpc", kind = %kind, "No handler found for message type");
                None
            }
            Err(e @ ProtocolError::LockPoisoned(_)) => {
                metrics.handler_error();
                error!(component = "rpc", kind = %kind, error = %e, "Handler lookup failed");
                None
            }
            Ok(Some(response)) => {
                metrics.handler_call();
                Some(response)
            }
            Ok(None) => {
                metrics.handler_call();
                trace!(component = "rpc", kind = %kind, "Handler produced no response");
                None
            }
            Err(e) => {
                metrics.handler_call();
                metrics.handler_error();
                warn!(component = "rpc", kind = %kind, error = %e, "Handler failed");
                None
            }
        }
    }
}
