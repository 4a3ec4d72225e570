//! Negotiable Options
//!
//! Closed enumerations for the values exchanged in the local options
//! string and in PUSH_REPLY: data ciphers, HMAC digests, compression
//! framing/algorithm, routing policies and TLS-wrap settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data channel cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cipher {
    #[serde(rename = "AES-128-CBC")]
    Aes128Cbc,
    #[serde(rename = "AES-192-CBC")]
    Aes192Cbc,
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,
    #[serde(rename = "AES-128-GCM")]
    Aes128Gcm,
    #[serde(rename = "AES-192-GCM")]
    Aes192Gcm,
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "CHACHA20-POLY1305")]
    ChaCha20Poly1305,
}

impl Cipher {
    /// Get all supported ciphers
    pub fn all() -> &'static [Cipher] {
        &[
            Cipher::Aes128Cbc,
            Cipher::Aes192Cbc,
            Cipher::Aes256Cbc,
            Cipher::Aes128Gcm,
            Cipher::Aes192Gcm,
            Cipher::Aes256Gcm,
            Cipher::ChaCha20Poly1305,
        ]
    }

    /// OpenVPN name (e.g. `AES-256-GCM`)
    pub fn name(&self) -> &'static str {
        match self {
            Cipher::Aes128Cbc => "AES-128-CBC",
            Cipher::Aes192Cbc => "AES-192-CBC",
            Cipher::Aes256Cbc => "AES-256-CBC",
            Cipher::Aes128Gcm => "AES-128-GCM",
            Cipher::Aes192Gcm => "AES-192-GCM",
            Cipher::Aes256Gcm => "AES-256-GCM",
            Cipher::ChaCha20Poly1305 => "CHACHA20-POLY1305",
        }
    }

    /// Key size in bits, as advertised by `keysize`
    pub fn key_size(&self) -> u32 {
        match self {
            Cipher::Aes128Cbc | Cipher::Aes128Gcm => 128,
            Cipher::Aes192Cbc | Cipher::Aes192Gcm => 192,
            Cipher::Aes256Cbc | Cipher::Aes256Gcm | Cipher::ChaCha20Poly1305 => 256,
        }
    }

    /// Authenticated encryption (no separate HMAC)
    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            Cipher::Aes128Gcm | Cipher::Aes192Gcm | Cipher::Aes256Gcm | Cipher::ChaCha20Poly1305
        )
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cipher {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        Cipher::all()
            .iter()
            .copied()
            .find(|c| c.name() == upper)
            .ok_or_else(|| UnknownOption::new("cipher", s))
    }
}

/// HMAC digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Digest {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl Digest {
    /// OpenVPN name (e.g. `SHA256`)
    pub fn name(&self) -> &'static str {
        match self {
            Digest::Sha1 => "SHA1",
            Digest::Sha224 => "SHA224",
            Digest::Sha256 => "SHA256",
            Digest::Sha384 => "SHA384",
            Digest::Sha512 => "SHA512",
        }
    }

    /// Output length in bytes
    pub fn length(&self) -> usize {
        match self {
            Digest::Sha1 => 20,
            Digest::Sha224 => 28,
            Digest::Sha256 => 32,
            Digest::Sha384 => 48,
            Digest::Sha512 => 64,
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Digest {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SHA1" => Ok(Digest::Sha1),
            "SHA224" => Ok(Digest::Sha224),
            "SHA256" => Ok(Digest::Sha256),
            "SHA384" => Ok(Digest::Sha384),
            "SHA512" => Ok(Digest::Sha512),
            _ => Err(UnknownOption::new("digest", s)),
        }
    }
}

/// How compression is framed in data packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionFraming {
    Disabled,
    /// `comp-lzo`
    CompLzo,
    /// `compress`
    Compress,
    /// `compress stub-v2`
    CompressV2,
}

/// Compression algorithm in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionAlgorithm {
    Disabled,
    Lzo,
    /// Anything else (e.g. lz4), unsupported by this client
    Other,
}

/// Traffic redirected through the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoutingPolicy {
    IPv4,
    IPv6,
    BlockLocal,
}

/// TLS-wrap mode for the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsWrapStrategy {
    /// `tls-auth`: HMAC over control packets
    Auth,
    /// `tls-crypt`: encrypted control packets
    Crypt,
}

impl fmt::Display for TlsWrapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsWrapStrategy::Auth => f.write_str("auth"),
            TlsWrapStrategy::Crypt => f.write_str("crypt"),
        }
    }
}

/// Static key direction (`key-direction`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDirection {
    Server,
    Client,
}

impl KeyDirection {
    /// Numeric value advertised as `keydir <n>`
    pub fn value(&self) -> u8 {
        match self {
            KeyDirection::Server => 0,
            KeyDirection::Client => 1,
        }
    }
}

/// TLS-wrap settings
///
/// The static key itself belongs to the crypto back-end; only what the
/// options string advertises is kept here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsWrap {
    pub strategy: TlsWrapStrategy,
    #[serde(default)]
    pub key_direction: Option<KeyDirection>,
}

/// Unrecognized option value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownOption {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownOption {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
