use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Message, MessageKind, PeerId};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// A handler for one message kind. `Ok(None)` means "nothing to send back".
pub type Handler =
    Arc<dyn Fn(PeerId, Message) -> BoxFuture<'static, Result<Option<Message>>> + Send + Sync>;

/// Message kind to handler table.
///
/// Keys are the [`MessageKind`] tag itself, so a kind without an entry is the
/// only way a message can go unhandled. `Unknown` kinds can never be
/// registered.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<MessageKind, Handler>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Install `f` as the handler for `kind`, replacing any previous one.
    pub fn register<F, Fut>(&self, kind: MessageKind, f: F) -> Result<()>
    where
        F: Fn(PeerId, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Message>>> + Send + 'static,
    {
        if !kind.is_known() {
            return Err(ProtocolError::UnknownKind(kind.code()));
        }

        let handler: Handler = Arc::new(
            move |peer: PeerId, msg: Message| -> BoxFuture<'static, Result<Option<Message>>> {
                Box::pin(f(peer, msg))
            },
        );
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_REGISTRY_WRITE_LOCK))?;

        handlers.insert(kind, handler);
        Ok(())
    }

    pub fn unregister(&self, kind: MessageKind) -> Result<bool> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_REGISTRY_WRITE_LOCK))?;
        Ok(handlers.remove(&kind).is_some())
    }

    /// Find the handler for `kind`. The returned handle is independent of the
    /// registry lock.
    pub fn lookup(&self, kind: MessageKind) -> Result<Option<Handler>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_REGISTRY_READ_LOCK))?;
        Ok(handlers.get(&kind).cloned())
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        matches!(self.lookup(kind), Ok(Some(_)))
    }

    /// Registered kinds in wire order
    pub fn registered_kinds(&self) -> Vec<MessageKind> {
        let mut kinds: Vec<MessageKind> = match self.handlers.read() {
            Ok(handlers) => handlers.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        kinds.sort_by_key(|kind| kind.code());
        kinds
    }

    /// Run the handler registered for `msg.kind`.
    ///
    /// Fails with `UnknownKind` when none is registered.
    pub async fn dispatch(&self, peer: PeerId, msg: Message) -> Result<Option<Message>> {
        let kind = msg.kind;
        let handler = self
            .lookup(kind)?
            .ok_or(ProtocolError::UnknownKind(kind.code()))?;
        handler(peer, msg).await
    }
}

/// Ready-made handlers for kinds that need no DHT state.
pub mod handlers {
    use super::*;

    /// Answers a PING with an empty PING.
    pub async fn ping(_peer: PeerId, msg: Message) -> Result<Option<Message>> {
        Ok(Some(Message::response_to(&msg)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer() -> PeerId {
        PeerId::new(vec![7; 4])
    }

    #[tokio::test]
    async fn dispatch_reaches_registered_handler() {
        let registry = HandlerRegistry::new();
        registry
            .register(MessageKind::Ping, handlers::ping)
            .unwrap();

        let response = registry.dispatch(peer(), Message::ping()).await.unwrap();
        assert_eq!(response.unwrap().kind, MessageKind::Ping);
    }

    #[tokio::test]
    async fn missing_handler_is_unknown_kind() {
        let registry = HandlerRegistry::new();
        let err = registry
            .dispatch(peer(), Message::new(MessageKind::FindNode, None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(4)));
    }

    #[test]
    fn unknown_kind_cannot_be_registered() {
        let registry = HandlerRegistry::new();
        let result = registry.register(MessageKind::Unknown(99), |_peer, _msg| async {
            Ok(None)
        });
        assert!(matches!(result, Err(ProtocolError::UnknownKind(99))));
        assert!(registry.registered_kinds().is_empty());
    }

    #[tokio::test]
    async fn handler_receives_peer_and_message() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        registry
            .register(MessageKind::GetValue, move |from, msg| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(from, PeerId::new(vec![7; 4]));
                    assert_eq!(msg.key.as_deref(), Some(&b"k"[..]));
                    Ok(None)
                }
            })
            .unwrap();

        let msg = Message::new(MessageKind::GetValue, Some(b"k".to_vec()), 0);
        assert!(registry.dispatch(peer(), msg).await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_replace_and_unregister() {
        let registry = HandlerRegistry::new();
        registry
            .register(MessageKind::FindNode, |_p, _m| async { Ok(None) })
            .unwrap();
        registry
            .register(MessageKind::Ping, handlers::ping)
            .unwrap();
        registry
            .register(MessageKind::Ping, handlers::ping)
            .unwrap();

        assert_eq!(
            registry.registered_kinds(),
            vec![MessageKind::FindNode, MessageKind::Ping]
        );
        assert!(registry.unregister(MessageKind::Ping).unwrap());
        assert!(!registry.unregister(MessageKind::Ping).unwrap());
        assert!(!registry.is_registered(MessageKind::Ping));
    }
}
