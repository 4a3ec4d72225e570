//! Handshake Driver
//!
//! Drives one negotiation over decrypted control data: sends the auth
//! request, waits for the auth reply, then classifies server messages
//! until a usable PUSH_REPLY arrives. Retries and timeouts belong to the
//! caller's session loop.

use crate::auth::{AuthError, AuthResponse, Authenticator, TlsChannel};
use crate::config::Configuration;
use crate::options::{Cipher, CompressionAlgorithm, CompressionFraming, Digest};
use crate::push_reply::{PushOptions, PushReply, PushReplyAssembler, PushReplyError};
use std::time::Duration;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

/// Negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Auth request not sent yet
    Idle,
    /// Waiting for the server auth reply
    Auth,
    /// Waiting for PUSH_REPLY
    Push,
    Connected,
}

/// Data channel parameters in effect after negotiation
///
/// Pushed values win; anything the server left out falls back to the
/// configuration the handshake was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub cipher: Cipher,
    pub digest: Digest,
    pub compression_framing: CompressionFraming,
    pub compression_algorithm: CompressionAlgorithm,
    pub keep_alive_interval: Option<Duration>,
    pub keep_alive_timeout: Option<Duration>,
    pub renegotiates_after: Option<Duration>,
    pub mtu: Option<u16>,
}

impl SessionSettings {
    pub fn resolve(pushed: &PushOptions, config: &Configuration) -> Self {
        let seconds = |value: Option<u64>| value.map(Duration::from_secs);
        Self {
            cipher: pushed.cipher.unwrap_or_else(|| config.fallback_cipher()),
            digest: pushed.digest.unwrap_or_else(|| config.fallback_digest()),
            compression_framing: pushed
                .compression_framing
                .or(config.compression_framing)
                .unwrap_or(CompressionFraming::Disabled),
            compression_algorithm: pushed
                .compression_algorithm
                .or(config.compression_algorithm)
                .unwrap_or(CompressionAlgorithm::Disabled),
            keep_alive_interval: seconds(pushed.keep_alive_interval)
                .or_else(|| config.keep_alive_interval()),
            keep_alive_timeout: seconds(pushed.keep_alive_timeout)
                .or_else(|| config.keep_alive_timeout()),
            renegotiates_after: seconds(pushed.renegotiates_after)
                .or_else(|| config.renegotiates_after()),
            mtu: config.mtu,
        }
    }
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub reply: PushReply,
    pub settings: SessionSettings,
    /// Key material for data channel key derivation
    pub response: AuthResponse,
}

/// Handshake errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Push reply error: {0}")]
    PushReply(#[from] PushReplyError),

    #[error("Handshake not started")]
    NotStarted,

    #[error("Authentication failed")]
    BadCredentials,

    /// The caller may retry without local options
    #[error("Authentication failed with local options")]
    BadCredentialsWithLocalOptions,

    #[error("Server is shutting down")]
    ServerShutdown,

    #[error("Server pushed no IPv4 or IPv6 settings")]
    NoRouting,

    #[error("Server requires unsupported compression")]
    ServerCompression,

    #[error("Auth reply missing when completing connection")]
    MissingAuthResponse,
}

/// One negotiation attempt
#[derive(Debug)]
pub struct Handshake {
    authenticator: Authenticator,
    assembler: PushReplyAssembler,
    configuration: Configuration,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            authenticator,
            assembler: PushReplyAssembler::new(),
            configuration: Configuration::default(),
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Send the auth request
    pub fn start<T: TlsChannel + ?Sized>(
        &mut self,
        tls: &mut T,
        config: &Configuration,
    ) -> Result<(), HandshakeError> {
        self.authenticator.put_auth(tls, config)?;
        self.configuration = config.clone();
        self.state = HandshakeState::Auth;
        Ok(())
    }

    /// Feed decrypted control data
    ///
    /// Returns the negotiated options once a complete PUSH_REPLY has been
    /// accepted; the authenticator secrets are wiped at that point.
    pub fn handle_control_data(&mut self, data: &[u8]) -> Result<Option<Negotiated>, HandshakeError> {
        if self.state == HandshakeState::Idle {
            return Err(HandshakeError::NotStarted);
        }
        debug!("Pulled {} bytes of plain control data", data.len());
        self.authenticator.append_control_data(data);

        if self.state == HandshakeState::Auth {
            if !self.authenticator.parse_auth_reply()? {
                return Ok(None);
            }
            self.state = HandshakeState::Push;
        }

        for message in self.authenticator.parse_messages() {
            let message = Zeroizing::new(message);
            if let Some(negotiated) = self.handle_control_message(&message)? {
                return Ok(Some(negotiated));
            }
        }
        Ok(None)
    }

    fn handle_control_message(&mut self, message: &str) -> Result<Option<Negotiated>, HandshakeError> {
        if message.starts_with("AUTH_FAILED") {
            if self.authenticator.with_local_options {
                error!("Authentication failure, retry without local options");
                return Err(HandshakeError::BadCredentialsWithLocalOptions);
            }
            error!("Authentication failure");
            return Err(HandshakeError::BadCredentials);
        }
        if message.starts_with("RESTART") {
            info!("Disconnect due to server shutdown");
            return Err(HandshakeError::ServerShutdown);
        }
        if self.state != HandshakeState::Push {
            return Ok(None);
        }

        let Some(reply) = self.assembler.feed(message)? else {
            return Ok(None);
        };
        info!("Received PUSH_REPLY: \"{}\"", reply);

        if let (Some(framing), Some(algorithm)) = (
            reply.options.compression_framing,
            reply.options.compression_algorithm,
        ) {
            let supported = match algorithm {
                CompressionAlgorithm::Disabled => true,
                CompressionAlgorithm::Lzo => self.authenticator.peer_info.lzo_supported,
                CompressionAlgorithm::Other => false,
            };
            if !supported {
                error!(
                    "Server compression {:?} unsupported (framing={:?})",
                    algorithm, framing
                );
                return Err(HandshakeError::ServerCompression);
            }
        }
        if reply.options.ipv4.is_none() && reply.options.ipv6.is_none() {
            return Err(HandshakeError::NoRouting);
        }

        let response = self
            .authenticator
            .response()
            .ok_or(HandshakeError::MissingAuthResponse)?;
        let settings = SessionSettings::resolve(&reply.options, &self.configuration);
        self.state = HandshakeState::Connected;
        self.authenticator.reset();
        info!(
            "Negotiation complete (cipher={}, digest={})",
            settings.cipher, settings.digest
        );

        Ok(Some(Negotiated {
            reply,
            settings,
            response,
        }))
    }
}
