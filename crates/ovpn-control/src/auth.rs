//! Authentication
//!
//! Key-method 2 exchange carried inside the TLS session: the client
//! sends its pre-master secret, two randoms, the local options string,
//! optional credentials and peer info; the server answers with its own
//! two randoms and options, followed by NUL-terminated text messages
//! (PUSH_REPLY, AUTH_FAILED, ...).
//!
//! # Wire Layout
//!
//! ```text
//! client: [00 00 00 00 02][pre-master 48][random1 32][random2 32]
//!         [u16 len][options\0][u16 len][user\0][u16 len][pass\0]
//!         [u16 len][peer info\0]
//! server: [00 00 00 00 02][random1 32][random2 32][u16 len][options]
//!         [message\0]...
//! ```

use crate::config::Configuration;
use crate::options::CompressionFraming;
use crate::peer_info::PeerInfo;
use crate::zeroing::ZeroingBuffer;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Key-method 2 prefix (4 zero bytes + method)
pub const TLS_PREFIX: [u8; 5] = [0x00, 0x00, 0x00, 0x00, 0x02];

/// Pre-master secret length
pub const PRE_MASTER_LENGTH: usize = 48;

/// Length of each random
pub const RANDOM_LENGTH: usize = 32;

/// Options string sent when renegotiating without local options
pub const UNDEFINED_OPTIONS: &str = "V0 UNDEF";

/// Plaintext side of the TLS session
///
/// Implemented by the crypto back-end; the authenticator only writes
/// cleartext records into it.
pub trait TlsChannel {
    /// Write cleartext to be encrypted into TLS records
    fn put_raw_plain_text(&mut self, text: &[u8]) -> Result<(), TlsError>;
}

/// TLS back-end errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlsError {
    #[error("TLS write failed: {0}")]
    WriteFailed(String),
}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Wrong control data prefix")]
    WrongControlDataPrefix,

    #[error("{0} too long for a 16-bit length field")]
    FieldTooLong(&'static str),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
}

/// Key material for data channel key derivation
///
/// Owned copies; wiped when dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub pre_master: ZeroingBuffer,
    pub random1: ZeroingBuffer,
    pub random2: ZeroingBuffer,
    pub server_random1: ZeroingBuffer,
    pub server_random2: ZeroingBuffer,
}

/// Client side of the key-method 2 exchange
///
/// Single owner per session; not thread-safe. All secrets live in
/// [`ZeroingBuffer`]s and are wiped by [`Authenticator::reset`] or on drop.
#[derive(Debug)]
pub struct Authenticator {
    control_buffer: ZeroingBuffer,
    pre_master: ZeroingBuffer,
    random1: ZeroingBuffer,
    random2: ZeroingBuffer,
    server_random1: Option<ZeroingBuffer>,
    server_random2: Option<ZeroingBuffer>,
    username: Option<ZeroingBuffer>,
    password: Option<ZeroingBuffer>,
    /// Send the local options string (`V0 UNDEF` otherwise)
    pub with_local_options: bool,
    /// Baseline peer info (SSL version, platform, LZO support)
    pub peer_info: PeerInfo,
}

impl Authenticator {
    /// Create with fresh secrets drawn from `rng`
    ///
    /// Credentials are kept only when both are given.
    pub fn new<R: RngCore + CryptoRng + ?Sized>(
        rng: &mut R,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Self {
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (
                Some(ZeroingBuffer::from_text(u, true)),
                Some(ZeroingBuffer::from_text(p, true)),
            ),
            _ => (None, None),
        };

        Self {
            control_buffer: ZeroingBuffer::new(),
            pre_master: ZeroingBuffer::random(rng, PRE_MASTER_LENGTH),
            random1: ZeroingBuffer::random(rng, RANDOM_LENGTH),
            random2: ZeroingBuffer::random(rng, RANDOM_LENGTH),
            server_random1: None,
            server_random2: None,
            username,
            password,
            with_local_options: true,
            peer_info: PeerInfo::default(),
        }
    }

    pub fn pre_master(&self) -> &ZeroingBuffer {
        &self.pre_master
    }

    pub fn random1(&self) -> &ZeroingBuffer {
        &self.random1
    }

    pub fn random2(&self) -> &ZeroingBuffer {
        &self.random2
    }

    pub fn server_random1(&self) -> Option<&ZeroingBuffer> {
        self.server_random1.as_ref()
    }

    pub fn server_random2(&self) -> Option<&ZeroingBuffer> {
        self.server_random2.as_ref()
    }

    /// NUL-terminated username, if credentials were given
    pub fn username(&self) -> Option<&ZeroingBuffer> {
        self.username.as_ref()
    }

    /// NUL-terminated password, if credentials were given
    pub fn password(&self) -> Option<&ZeroingBuffer> {
        self.password.as_ref()
    }

    /// Bytes received but not yet consumed
    pub fn control_buffer(&self) -> &ZeroingBuffer {
        &self.control_buffer
    }

    /// Wipe every secret and drop the credentials
    pub fn reset(&mut self) {
        self.control_buffer.clear();
        self.pre_master.zero();
        self.random1.zero();
        self.random2.zero();
        // dropping wipes them
        self.server_random1 = None;
        self.server_random2 = None;
        self.username = None;
        self.password = None;
    }

    /// Options string advertised to the server
    pub fn local_options(&self, config: &Configuration) -> String {
        if !self.with_local_options {
            return UNDEFINED_OPTIONS.to_string();
        }

        let mut opts = vec!["V4".to_string(), "dev-type tun".to_string()];
        match config.compression_framing {
            Some(CompressionFraming::CompLzo) => opts.push("comp-lzo".into()),
            Some(CompressionFraming::Compress) => opts.push("compress".into()),
            _ => {}
        }
        if let Some(direction) = config.tls_wrap.and_then(|w| w.key_direction) {
            opts.push(format!("keydir {}", direction.value()));
        }
        let cipher = config.fallback_cipher();
        opts.push(format!("cipher {}", cipher.name()));
        opts.push(format!("auth {}", config.fallback_digest().name()));
        opts.push(format!("keysize {}", cipher.key_size()));
        if let Some(wrap) = config.tls_wrap {
            opts.push(format!("tls-{}", wrap.strategy));
        }
        opts.push("key-method 2".into());
        opts.push("tls-client".into());
        opts.join(",")
    }

    /// Build the authentication request and write it into `tls`
    pub fn put_auth<T: TlsChannel + ?Sized>(
        &self,
        tls: &mut T,
        config: &Configuration,
    ) -> Result<(), AuthError> {
        let mut raw = ZeroingBuffer::from_slice(&TLS_PREFIX);

        raw.append(self.pre_master.as_bytes());
        raw.append(self.random1.as_bytes());
        raw.append(self.random2.as_bytes());

        let options = self.local_options(config);
        info!("TLS.auth: Local options: {}", options);
        raw.append_sized(&ZeroingBuffer::from_text(&options, true))
            .ok_or(AuthError::FieldTooLong("options"))?;

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                raw.append_sized(username)
                    .ok_or(AuthError::FieldTooLong("username"))?;
                raw.append_sized(password)
                    .ok_or(AuthError::FieldTooLong("password"))?;
            }
            _ => {
                raw.append_u16(0);
                raw.append_u16(0);
            }
        }

        let mut extra = BTreeMap::new();
        if let Some(ciphers) = &config.data_ciphers {
            let names: Vec<&str> = ciphers.iter().map(|c| c.name()).collect();
            extra.insert("IV_CIPHERS".to_string(), names.join(":"));
        }
        let peer_info = self.peer_info.render(&extra);
        raw.append_sized(&ZeroingBuffer::from_text(&peer_info, true))
            .ok_or(AuthError::FieldTooLong("peer info"))?;

        debug!("TLS.auth: Put plaintext {:?}", raw);
        tls.put_raw_plain_text(raw.as_bytes())?;
        Ok(())
    }

    /// Buffer bytes decrypted from the TLS session
    pub fn append_control_data(&mut self, data: &[u8]) {
        self.control_buffer.append(data);
    }

    /// Try to consume the server's auth reply
    ///
    /// `Ok(false)` means more data is needed. A wrong prefix is fatal.
    pub fn parse_auth_reply(&mut self) -> Result<bool, AuthError> {
        let prefix_length = TLS_PREFIX.len();

        if self.control_buffer.len() < prefix_length + 2 * RANDOM_LENGTH + 2 {
            return Ok(false);
        }
        if self.control_buffer.slice(0, prefix_length) != TLS_PREFIX {
            return Err(AuthError::WrongControlDataPrefix);
        }

        let mut offset = prefix_length;
        let server_random1 = self.control_buffer.with_offset(offset, RANDOM_LENGTH);
        offset += RANDOM_LENGTH;
        let server_random2 = self.control_buffer.with_offset(offset, RANDOM_LENGTH);
        offset += RANDOM_LENGTH;

        let options_length = usize::from(self.control_buffer.network_u16_value(offset));
        offset += 2;
        if self.control_buffer.len() < offset + options_length {
            return Ok(false);
        }
        let server_options = self.control_buffer.with_offset(offset, options_length);
        offset += options_length;

        info!("TLS.auth: Parsed server random");
        if let Some(options) = server_options.null_terminated_string(0) {
            info!("TLS.auth: Parsed server options: \"{}\"", options);
        }

        self.server_random1 = Some(server_random1);
        self.server_random2 = Some(server_random2);
        self.control_buffer.remove_until(offset);

        Ok(true)
    }

    /// Drain the complete NUL-terminated messages buffered so far
    ///
    /// A trailing partial message stays buffered for the next call.
    pub fn parse_messages(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        let mut offset = 0;

        while let Some(raw) = self.control_buffer.null_terminated_bytes(offset) {
            offset += raw.len() + 1;
            messages.push(String::from_utf8_lossy(raw).into_owned());
        }
        self.control_buffer.remove_until(offset);

        messages
    }

    /// Key material, available once the auth reply is parsed
    pub fn response(&self) -> Option<AuthResponse> {
        let (server_random1, server_random2) =
            (self.server_random1.as_ref()?, self.server_random2.as_ref()?);
        Some(AuthResponse {
            pre_master: self.pre_master.clone(),
            random1: self.random1.clone(),
            random2: self.random2.clone(),
            server_random1: server_random1.clone(),
            server_random2: server_random2.clone(),
        })
    }
}
