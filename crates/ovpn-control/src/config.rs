//! Client Configuration
//!
//! The subset of a client profile the control channel needs: what to
//! advertise in the local options string, which data ciphers to offer,
//! keepalive timing and the remotes to try. Loadable from TOML or JSON.

use crate::endpoint::{Endpoint, processed_remotes};
use crate::options::{Cipher, CompressionAlgorithm, CompressionFraming, Digest, TlsWrap};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// OpenVPN client configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Data cipher (`cipher`); AES-128-CBC when unset
    pub cipher: Option<Cipher>,
    /// Ciphers offered for negotiation (`data-ciphers`)
    pub data_ciphers: Option<Vec<Cipher>>,
    /// HMAC digest (`auth`); SHA1 when unset
    pub digest: Option<Digest>,
    pub compression_framing: Option<CompressionFraming>,
    pub compression_algorithm: Option<CompressionAlgorithm>,
    pub tls_wrap: Option<TlsWrap>,
    /// Seconds between pings
    pub keep_alive_interval: Option<u64>,
    /// Seconds without traffic before restarting
    pub keep_alive_timeout: Option<u64>,
    /// Seconds before renegotiating keys (`reneg-sec`)
    pub renegotiates_after: Option<u64>,
    pub remotes: Vec<Endpoint>,
    pub randomize_endpoint: bool,
    pub randomize_hostnames: bool,
    pub mtu: Option<u16>,
}

impl Configuration {
    /// Cipher advertised in the local options
    pub fn fallback_cipher(&self) -> Cipher {
        self.cipher.unwrap_or(Cipher::Aes128Cbc)
    }

    /// Digest advertised in the local options
    pub fn fallback_digest(&self) -> Digest {
        self.digest.unwrap_or(Digest::Sha1)
    }

    pub fn keep_alive_interval(&self) -> Option<Duration> {
        self.keep_alive_interval.map(Duration::from_secs)
    }

    pub fn keep_alive_timeout(&self) -> Option<Duration> {
        self.keep_alive_timeout.map(Duration::from_secs)
    }

    pub fn renegotiates_after(&self) -> Option<Duration> {
        self.renegotiates_after.map(Duration::from_secs)
    }

    /// Remotes in connection order, randomized as configured
    pub fn processed_remotes<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> Vec<Endpoint> {
        processed_remotes(
            &self.remotes,
            self.randomize_endpoint,
            self.randomize_hostnames,
            rng,
        )
    }

    /// Check for inconsistent settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ciphers) = &self.data_ciphers {
            if ciphers.is_empty() {
                return Err(ConfigError::Invalid("data_ciphers is empty".into()));
            }
        }
        if let (Some(interval), Some(timeout)) = (self.keep_alive_interval, self.keep_alive_timeout) {
            if timeout < interval {
                return Err(ConfigError::Invalid(format!(
                    "keep_alive_timeout ({timeout}s) shorter than keep_alive_interval ({interval}s)"
                )));
            }
        }
        if self.mtu == Some(0) {
            return Err(ConfigError::Invalid("mtu must be non-zero".into()));
        }
        Ok(())
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        debug!("Loaded configuration with {} remotes", config.remotes.len());
        Ok(config)
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        debug!("Loaded configuration with {} remotes", config.remotes.len());
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config = match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "toml" => Self::from_toml(&content)?,
            "json" => Self::from_json(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported config format")]
    UnsupportedFormat,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
