use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::config::KadConfig;
use crate::error::Result;
use crate::protocol::dispatcher::HandlerRegistry;
use crate::protocol::message::PeerId;
use crate::protocol::pipeline::{ConnectionPipeline, ConnectionSummary, RpcContext};
use crate::routing::PeerTable;
use crate::utils::metrics::Metrics;

/// Runs one [`ConnectionPipeline`] per inbound protocol stream.
///
/// Streams arrive already negotiated and authenticated, paired with the
/// remote peer's identity. Pipelines run fully in parallel and share the
/// registry, the peer table and the metrics.
#[derive(Debug)]
pub struct RpcService {
    config: KadConfig,
    ctx: Arc<RpcContext>,
}

impl RpcService {
    pub fn new(
        config: KadConfig,
        registry: HandlerRegistry,
        peer_table: Arc<dyn PeerTable>,
    ) -> Result<Self> {
        config.validate_strict()?;
        let ctx = RpcContext::new(registry, peer_table)
            .with_max_message_size(config.protocol.max_message_size);
        Ok(Self {
            config,
            ctx: Arc::new(ctx),
        })
    }

    pub fn config(&self) -> &KadConfig {
        &self.config
    }

    pub fn protocol_id(&self) -> &str {
        &self.config.protocol.protocol_id
    }

    pub fn context(&self) -> Arc<RpcContext> {
        self.ctx.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.ctx.metrics.clone()
    }

    /// Serve a single stream on its own task
    pub fn spawn_connection<S>(
        &self,
        peer: PeerId,
        stream: S,
    ) -> JoinHandle<Result<ConnectionSummary>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let pipeline = ConnectionPipeline::new(self.ctx.clone(), peer);
        tokio::spawn(pipeline.run(stream))
    }

    /// Serve every stream yielded by `incoming` until `shutdown_rx` fires (or
    /// its sender is dropped) or `incoming` ends.
    ///
    /// Streams beyond `max_connections` are dropped on arrival. On shutdown,
    /// open pipelines get `shutdown_timeout` to finish before being aborted.
    #[instrument(skip_all, fields(protocol = %self.config.protocol.protocol_id))]
    pub async fn serve<I, S>(&self, mut incoming: I, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()>
    where
        I: Stream<Item = (PeerId, S)> + Unpin,
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let max_connections = self.config.server.max_connections;
        let mut connections = JoinSet::new();

        info!("Serving DHT protocol");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    break;
                }

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    log_finished(finished);
                }

                next = incoming.next() => match next {
                    Some((peer, stream)) => {
                        // finished but unjoined tasks still count towards len()
                        while let Some(finished) = connections.try_join_next() {
                            log_finished(finished);
                        }
                        if connections.len() >= max_connections {
                            self.ctx.metrics.connection_refused();
                            warn!(peer = %peer, max_connections, "Refusing connection: at capacity");
                            drop(stream);
                            continue;
                        }
                        debug!(peer = %peer, "New connection");
                        let pipeline = ConnectionPipeline::new(self.ctx.clone(), peer);
                        connections.spawn(pipeline.run(stream));
                    }
                    None => {
                        info!("Incoming streams exhausted");
                        break;
                    }
                },
            }
        }

        let timeout = self.config.server.shutdown_timeout;
        let drain = async {
            while let Some(finished) = connections.join_next().await {
                log_finished(finished);
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = connections.len(),
                "Shutdown timeout reached, aborting connections"
            );
            connections.shutdown().await;
        }

        info!("All connections closed");
        Ok(())
    }
}

fn log_finished(finished: std::result::Result<Result<ConnectionSummary>, JoinError>) {
    match finished {
        Ok(Ok(summary)) => debug!(
            frames = summary.frames_processed,
            responses = summary.responses_written,
            "Connection finished"
        ),
        // already logged inside the pipeline span
        Ok(Err(_)) => {}
        Err(e) if e.is_cancelled() => debug!("Connection task cancelled"),
        Err(e) => error!(error = %e, "Connection task panicked"),
    }
}
