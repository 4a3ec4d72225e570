//! OpenVPN Control Channel
//!
//! Protocol engine for the OpenVPN control channel: control packet
//! framing, reliable delivery, the key-method 2 authentication exchange
//! and PUSH_REPLY interpretation. Ciphers, HMACs and the TLS session
//! itself belong to an external crypto back-end reached through
//! [`TlsChannel`] and [`ControlSerializer`].
//!
//! # Architecture
//!
//! ```text
//!   transport ──▶ ControlChannel ──▶ TLS back-end ──▶ Handshake
//!   (UDP/TCP)     (order, acks,       (decrypt)       ├─ Authenticator
//!                  resend)                            └─ PushReplyAssembler
//!                                                           │
//!                                                           ▼
//!                                                     Negotiated
//! ```
//!
//! # Security
//!
//! - Secrets live in [`ZeroingBuffer`]s, wiped on reset and on drop
//! - Debug output of buffers and control packets is redacted
//! - Session ids, secrets and remote shuffling use a caller-supplied
//!   cryptographically secure RNG
//!
//! # Logging
//!
//! Diagnostics go through `tracing`; no subscriber is installed here.

mod auth;
mod channel;
mod config;
mod endpoint;
mod handshake;
mod network;
mod options;
mod packet;
mod peer_info;
mod push_reply;
mod zeroing;

pub use auth::{
    AuthError, AuthResponse, Authenticator, TlsChannel, TlsError, PRE_MASTER_LENGTH,
    RANDOM_LENGTH, TLS_PREFIX,
};
pub use channel::{
    ChannelError, ControlChannel, ControlSerializer, INBOUND_WINDOW, PlainSerializer,
};
pub use config::{ConfigError, Configuration};
pub use endpoint::{Endpoint, EndpointError, SocketType, processed_remotes};
pub use handshake::{Handshake, HandshakeError, HandshakeState, Negotiated, SessionSettings};
pub use network::{IpSettings, NetworkError, Route, Subnet};
pub use options::{
    Cipher, CompressionAlgorithm, CompressionFraming, Digest, KeyDirection, RoutingPolicy,
    TlsWrap, TlsWrapStrategy, UnknownOption,
};
pub use packet::{
    Acks, ControlPacket, MAX_ACKS, PacketCode, PacketDescription, PacketError, SessionId,
};
pub use peer_info::PeerInfo;
pub use push_reply::{PushOptions, PushReply, PushReplyAssembler, PushReplyError, ProxyAddress};
pub use zeroing::ZeroingBuffer;
