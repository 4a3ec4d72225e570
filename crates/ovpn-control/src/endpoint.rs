//! Remote Endpoints
//!
//! Server addresses with transport and port, plus the pre-connection
//! processing that resists fingerprinting: shuffling the remote order
//! and prefixing hostnames with random labels.

use crate::zeroing::to_hex;
use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, warn};

/// Random bytes prepended (hex-encoded) to hostnames
pub const HOSTNAME_PREFIX_LENGTH: usize = 6;

const MAX_HOSTNAME_LENGTH: usize = 253;
const MAX_LABEL_LENGTH: usize = 63;

/// Transport socket type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketType {
    Udp,
    Tcp,
}

impl SocketType {
    pub fn name(&self) -> &'static str {
        match self {
            SocketType::Udp => "UDP",
            SocketType::Tcp => "TCP",
        }
    }
}

impl FromStr for SocketType {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UDP" => Ok(SocketType::Udp),
            "TCP" => Ok(SocketType::Tcp),
            _ => Err(EndpointError::InvalidProtocol(s.to_string())),
        }
    }
}

/// Remote server endpoint
///
/// Text form is `address:PROTO:port`, e.g. `vpn.example.com:UDP:1194`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    address: String,
    socket_type: SocketType,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint, validating the address
    pub fn new(address: &str, socket_type: SocketType, port: u16) -> Result<Self, EndpointError> {
        if address.parse::<IpAddr>().is_err() && !is_valid_hostname(address) {
            return Err(EndpointError::InvalidAddress(address.to_string()));
        }
        Ok(Self {
            address: address.to_string(),
            socket_type,
            port,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the address is a hostname rather than an IP literal
    pub fn is_hostname(&self) -> bool {
        self.address.parse::<IpAddr>().is_err()
    }

    /// Copy of this endpoint with a random hex label prepended to the hostname
    pub fn with_random_prefix<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Self, EndpointError> {
        let mut prefix = [0u8; HOSTNAME_PREFIX_LENGTH];
        rng.fill_bytes(&mut prefix);
        let address = format!("{}.{}", to_hex(&prefix), self.address);
        Self::new(&address, self.socket_type, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.address, self.socket_type.name(), self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // address may itself contain colons (IPv6)
        let mut parts = s.rsplitn(3, ':');
        let (Some(port), Some(proto), Some(address)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(EndpointError::InvalidFormat(s.to_string()));
        };
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidFormat(s.to_string()))?;
        Self::new(address, proto.parse()?, port)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Order and disguise the remotes before connecting
///
/// With `randomize_endpoint` the list is shuffled with the supplied
/// secure PRNG. With `randomize_hostnames` every hostname remote gets a
/// random hex label prepended; IP literals are left alone, and a remote
/// whose prefixed name would be invalid is kept unmodified.
pub fn processed_remotes<R: RngCore + CryptoRng + ?Sized>(
    remotes: &[Endpoint],
    randomize_endpoint: bool,
    randomize_hostnames: bool,
    rng: &mut R,
) -> Vec<Endpoint> {
    let mut processed = remotes.to_vec();
    if randomize_endpoint {
        processed.shuffle(rng);
        debug!("Shuffled {} remotes", processed.len());
    }
    if randomize_hostnames {
        processed = processed
            .into_iter()
            .map(|remote| {
                if !remote.is_hostname() {
                    return remote;
                }
                match remote.with_random_prefix(rng) {
                    Ok(prefixed) => prefixed,
                    Err(e) => {
                        warn!("Unable to randomize hostname of {}: {}", remote, e);
                        remote
                    }
                }
            })
            .collect();
    }
    processed
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LENGTH {
        return false;
    }
    host.trim_end_matches('.').split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LENGTH
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Endpoint errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),

    #[error("Invalid endpoint protocol: {0}")]
    InvalidProtocol(String),

    #[error("Invalid endpoint format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn endpoint(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[test]
    fn test_endpoint_parse() {
        let ep = endpoint("vpn.example.com:UDP:1194");
        assert_eq!(ep.address(), "vpn.example.com");
        assert_eq!(ep.socket_type(), SocketType::Udp);
        assert_eq!(ep.port(), 1194);
        assert!(ep.is_hostname());
        assert_eq!(ep.to_string(), "vpn.example.com:UDP:1194");

        let v6 = endpoint("2001:db8::1:tcp:443");
        assert_eq!(v6.address(), "2001:db8::1");
        assert!(!v6.is_hostname());
    }

    #[test]
    fn test_endpoint_parse_errors() {
        assert!("nope".parse::<Endpoint>().is_err());
        assert!("host:SCTP:1".parse::<Endpoint>().is_err());
        assert!("bad host:UDP:1".parse::<Endpoint>().is_err());
        assert!("host:UDP:99999".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_no_processing() {
        let remotes = vec![endpoint("a.com:UDP:1"), endpoint("1.2.3.4:UDP:2")];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(processed_remotes(&remotes, false, false, &mut rng), remotes);
    }

    #[test]
    fn test_shuffle_keeps_all_remotes() {
        let remotes: Vec<Endpoint> = (1..=20)
            .map(|i| endpoint(&format!("10.0.0.{i}:UDP:1194")))
            .collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut shuffled = processed_remotes(&remotes, true, false, &mut rng);

        assert_eq!(shuffled.len(), remotes.len());
        assert_ne!(shuffled, remotes);
        shuffled.sort_by_key(|e| e.to_string());
        let mut sorted = remotes.clone();
        sorted.sort_by_key(|e| e.to_string());
        assert_eq!(shuffled, sorted);
    }

    #[test]
    fn test_hostname_prefix() {
        let remotes = vec![endpoint("vpn.example.com:UDP:1194"), endpoint("1.2.3.4:TCP:443")];
        let mut rng = StdRng::seed_from_u64(3);
        let processed = processed_remotes(&remotes, false, true, &mut rng);

        let host = processed[0].address();
        let (prefix, rest) = host.split_once('.').unwrap();
        assert_eq!(prefix.len(), HOSTNAME_PREFIX_LENGTH * 2);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "vpn.example.com");
        assert_eq!(processed[0].port(), 1194);

        assert_eq!(processed[1], remotes[1]);
    }

    #[test]
    fn test_hostname_prefix_fallback() {
        // 4 labels of 60 chars: valid alone, too long once prefixed
        let label = "a".repeat(60);
        let long = format!("{label}.{label}.{label}.{label}");
        let remotes = vec![Endpoint::new(&long, SocketType::Udp, 1194).unwrap()];
        let mut rng = StdRng::seed_from_u64(9);

        let processed = processed_remotes(&remotes, false, true, &mut rng);
        assert_eq!(processed, remotes);
    }

    #[test]
    fn test_serde_as_string() {
        let ep = endpoint("vpn.example.com:TCP:443");
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"vpn.example.com:TCP:443\"");
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }
}
