//! Network Settings
//!
//! Value types for the addressing pushed by the server: subnets,
//! routes and per-family interface settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Address plus prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subnet {
    pub address: IpAddr,
    pub prefix_length: u8,
}

impl Subnet {
    /// Create from an address and a prefix length
    pub fn new(address: IpAddr, prefix_length: u8) -> Result<Self, NetworkError> {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_length > max {
            return Err(NetworkError::InvalidPrefix(prefix_length));
        }
        Ok(Self {
            address,
            prefix_length,
        })
    }

    /// Create from textual IPv4 address and dotted mask (e.g. `255.255.255.0`)
    pub fn from_ipv4_mask(address: &str, mask: &str) -> Result<Self, NetworkError> {
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(address.to_string()))?;
        let mask: Ipv4Addr = mask
            .parse()
            .map_err(|_| NetworkError::InvalidMask(mask.to_string()))?;

        let bits = u32::from(mask);
        let prefix = bits.leading_ones();
        if bits.checked_shl(prefix).unwrap_or(0) != 0 {
            return Err(NetworkError::InvalidMask(mask.to_string()));
        }
        Self::new(IpAddr::V4(address), prefix as u8)
    }

    /// Create from textual address and prefix length
    pub fn from_prefix(address: &str, prefix_length: u8) -> Result<Self, NetworkError> {
        let address: IpAddr = address
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(address.to_string()))?;
        Self::new(address, prefix_length)
    }

    /// Dotted IPv4 mask, `None` for IPv6 subnets
    pub fn ipv4_mask(&self) -> Option<Ipv4Addr> {
        match self.address {
            IpAddr::V4(_) => {
                let bits = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_length))
                    .unwrap_or(0);
                Some(Ipv4Addr::from(bits))
            }
            IpAddr::V6(_) => None,
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_length)
    }
}

/// Route through a gateway
///
/// A `None` destination is the default route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: Option<Subnet>,
    pub gateway: Option<IpAddr>,
}

impl Route {
    /// Route to a subnet
    pub fn new(destination: Subnet, gateway: Option<IpAddr>) -> Self {
        Self {
            destination: Some(destination),
            gateway,
        }
    }

    /// Default route through `gateway`
    pub fn default_with_gateway(gateway: IpAddr) -> Self {
        Self {
            destination: None,
            gateway: Some(gateway),
        }
    }

    pub fn is_default(&self) -> bool {
        self.destination.is_none()
    }
}

/// Interface settings for one address family
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpSettings {
    pub subnet: Option<Subnet>,
    #[serde(default)]
    pub included_routes: Vec<Route>,
}

impl IpSettings {
    pub fn new(subnet: Subnet) -> Self {
        Self {
            subnet: Some(subnet),
            included_routes: Vec::new(),
        }
    }

    /// Add a route
    pub fn including(mut self, route: Route) -> Self {
        self.included_routes.push(route);
        self
    }

    /// Gateway of the default route, if any
    pub fn default_gateway(&self) -> Option<IpAddr> {
        self.included_routes
            .iter()
            .find(|r| r.is_default())
            .and_then(|r| r.gateway)
    }
}

/// Address parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    #[error("Invalid prefix length: {0}")]
    InvalidPrefix(u8),
}
