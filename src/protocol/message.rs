//! # Message Envelope
//!
//! Typed form of one decoded frame. The `kind` drives dispatch; every other
//! field is kind-dependent and may be empty without being an error.
//!
//! Kinds travel as their Kademlia wire numbers, so a number this node does
//! not know decodes into [`MessageKind::Unknown`] instead of failing. Such
//! messages are never dispatched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::serialization::WireFormat;
use crate::error::{constants, ProtocolError, Result};

/// Kademlia message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum MessageKind {
    PutValue,
    GetValue,
    AddProvider,
    GetProviders,
    FindNode,
    Ping,
    /// A wire number this node has no meaning for
    Unknown(i32),
}

impl MessageKind {
    /// Every kind with a defined meaning
    pub const KNOWN: [MessageKind; 6] = [
        MessageKind::PutValue,
        MessageKind::GetValue,
        MessageKind::AddProvider,
        MessageKind::GetProviders,
        MessageKind::FindNode,
        MessageKind::Ping,
    ];

    /// Wire number of this kind
    pub fn code(self) -> i32 {
        i32::from(self)
    }

    pub fn is_known(self) -> bool {
        !matches!(self, MessageKind::Unknown(_))
    }

    /// `Unknown(n)` is canonical only when `n` is not a defined kind.
    fn is_canonical(self) -> bool {
        MessageKind::from(self.code()) == self
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::PutValue => "PUT_VALUE",
            MessageKind::GetValue => "GET_VALUE",
            MessageKind::AddProvider => "ADD_PROVIDER",
            MessageKind::GetProviders => "GET_PROVIDERS",
            MessageKind::FindNode => "FIND_NODE",
            MessageKind::Ping => "PING",
            MessageKind::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<i32> for MessageKind {
    fn from(code: i32) -> Self {
        match code {
            0 => MessageKind::PutValue,
            1 => MessageKind::GetValue,
            2 => MessageKind::AddProvider,
            3 => MessageKind::GetProviders,
            4 => MessageKind::FindNode,
            5 => MessageKind::Ping,
            other => MessageKind::Unknown(other),
        }
    }
}

impl From<MessageKind> for i32 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::PutValue => 0,
            MessageKind::GetValue => 1,
            MessageKind::AddProvider => 2,
            MessageKind::GetProviders => 3,
            MessageKind::FindNode => 4,
            MessageKind::Ping => 5,
            MessageKind::Unknown(code) => code,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Unknown(code) => write!(f, "UNKNOWN({code})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Opaque peer identifier, as verified by the transport handshake
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse the hex form produced by `Display`
    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| ProtocolError::DecodeError(format!("invalid peer id: {e}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

impl From<&[u8]> for PeerId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// What the sender knows about its own link to a described peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionType {
    #[default]
    NotConnected,
    Connected,
    CanConnect,
    CannotConnect,
}

/// A peer and the addresses it is believed reachable at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub id: PeerId,
    /// Encoded network addresses, opaque to this layer
    pub addresses: Vec<Vec<u8>>,
    pub connection: ConnectionType,
}

impl PeerDescriptor {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            addresses: Vec::new(),
            connection: ConnectionType::NotConnected,
        }
    }

    pub fn with_address(mut self, address: impl Into<Vec<u8>>) -> Self {
        self.addresses.push(address.into());
        self
    }

    pub fn with_connection(mut self, connection: ConnectionType) -> Self {
        self.connection = connection;
        self
    }
}

/// One DHT protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub closer_peers: Vec<PeerDescriptor>,
    pub provider_peers: Vec<PeerDescriptor>,
    /// Stored off by one so that zero means "unset"; see [`Message::cluster_level`]
    pub cluster_level_raw: i32,
}

impl WireFormat for Message {}

impl Message {
    pub fn new(kind: MessageKind, key: Option<Vec<u8>>, cluster_level: i32) -> Self {
        let mut msg = Self {
            kind,
            key,
            value: None,
            closer_peers: Vec::new(),
            provider_peers: Vec::new(),
            cluster_level_raw: 0,
        };
        msg.set_cluster_level(cluster_level);
        msg
    }

    /// A PING with no payload
    pub fn ping() -> Self {
        Self::new(MessageKind::Ping, None, 0)
    }

    /// An empty reply of the same kind and cluster level as `request`
    pub fn response_to(request: &Message) -> Self {
        Self::new(request.kind, None, request.cluster_level())
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_closer_peers(mut self, peers: Vec<PeerDescriptor>) -> Self {
        self.closer_peers = peers;
        self
    }

    pub fn with_provider_peers(mut self, peers: Vec<PeerDescriptor>) -> Self {
        self.provider_peers = peers;
        self
    }

    pub fn cluster_level(&self) -> i32 {
        self.cluster_level_raw.max(1) - 1
    }

    pub fn set_cluster_level(&mut self, level: i32) {
        self.cluster_level_raw = level.saturating_add(1);
    }

    /// Check the kind-dependent fields needed to put this message on the wire
    pub fn validate(&self) -> Result<()> {
        if !self.kind.is_canonical() {
            return Err(ProtocolError::EncodeError(
                constants::ERR_UNKNOWN_KIND_ENCODE.to_string(),
            ));
        }

        if self.kind == MessageKind::PutValue {
            if self.key.is_none() {
                return Err(ProtocolError::EncodeError(
                    constants::ERR_PUT_VALUE_MISSING_KEY.to_string(),
                ));
            }
            if self.value.is_none() {
                return Err(ProtocolError::EncodeError(
                    constants::ERR_PUT_VALUE_MISSING_VALUE.to_string(),
                ));
            }
        }

        let empty_peer = self
            .closer_peers
            .iter()
            .chain(self.provider_peers.iter())
            .any(|peer| peer.id.is_empty());
        if empty_peer {
            return Err(ProtocolError::EncodeError(
                constants::ERR_EMPTY_PEER_ID.to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize into a frame payload of at most `max_size` bytes
    pub fn encode(&self, max_size: usize) -> Result<Vec<u8>> {
        self.validate()?;
        self.to_wire(max_size)
    }

    /// Parse a frame payload
    pub fn decode(bytes: &[u8], max_size: usize) -> Result<Self> {
        Self::from_wire(bytes, max_size)
    }
}
