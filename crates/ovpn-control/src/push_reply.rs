//! PUSH_REPLY Parsing
//!
//! Interprets the comma-separated directive list a server pushes after
//! authentication. Parsing is a fold over directives: each one updates a
//! partially built set of options, and directives that are unknown or
//! malformed are logged and skipped instead of failing the reply.
//!
//! A reply carrying `push-continuation 2` is incomplete and surfaces as
//! [`PushReplyError::Continuation`]; [`PushReplyAssembler`] joins the parts.

use crate::network::{IpSettings, Route, Subnet};
use crate::options::{Cipher, CompressionAlgorithm, CompressionFraming, Digest, RoutingPolicy};
use crate::zeroing::ZeroingBuffer;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Leading token of every push reply
pub const PUSH_REPLY_PREFIX: &str = "PUSH_REPLY";

const CONTINUATION_DIRECTIVE: &str = "push-continuation";
const HOST_MASK: &str = "255.255.255.255";
const VPN_GATEWAY: &str = "vpn_gateway";

/// Push reply errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushReplyError {
    /// More parts follow; concatenate and parse again
    #[error("PUSH_REPLY continues in a further message")]
    Continuation,
}

/// Proxy host and port (`dhcp-option PROXY_HTTP[S]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

/// Options negotiated through PUSH_REPLY
///
/// Every field is optional; absence means the server did not push it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub ipv4: Option<IpSettings>,
    pub ipv6: Option<IpSettings>,
    pub routes4: Option<Vec<Route>>,
    pub routes6: Option<Vec<Route>>,
    pub dns_servers: Option<Vec<IpAddr>>,
    pub dns_domain: Option<String>,
    pub search_domains: Option<Vec<String>>,
    pub http_proxy: Option<ProxyAddress>,
    pub https_proxy: Option<ProxyAddress>,
    pub proxy_auto_config_url: Option<String>,
    pub proxy_bypass_domains: Option<Vec<String>>,
    pub compression_framing: Option<CompressionFraming>,
    pub compression_algorithm: Option<CompressionAlgorithm>,
    pub cipher: Option<Cipher>,
    pub digest: Option<Digest>,
    /// Seconds (`ping`)
    pub keep_alive_interval: Option<u64>,
    /// Seconds (`ping-restart`)
    pub keep_alive_timeout: Option<u64>,
    /// Seconds (`reneg-sec`)
    pub renegotiates_after: Option<u64>,
    pub routing_policies: Option<BTreeSet<RoutingPolicy>>,
    pub peer_id: Option<u32>,
    /// Replaces the password on renegotiation
    pub auth_token: Option<ZeroingBuffer>,
}

/// Parsed PUSH_REPLY
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReply {
    /// Message as received, with the auth token value masked
    pub original: String,
    pub options: PushOptions,
    /// Directives skipped as unknown or malformed
    pub ignored: Vec<String>,
}

impl PushReply {
    /// Parse a control message
    ///
    /// Returns `Ok(None)` when the message is not a PUSH_REPLY.
    pub fn parse(message: &str) -> Result<Option<Self>, PushReplyError> {
        let mut tokens = message.split(',');
        if tokens.next().map(str::trim) != Some(PUSH_REPLY_PREFIX) {
            return Ok(None);
        }

        let mut builder = Builder::default();
        for token in tokens {
            let components: Vec<&str> = token.split_whitespace().collect();
            if components.is_empty() {
                continue;
            }
            builder.put(token.trim(), &components)?;
        }

        let (options, ignored) = builder.build();
        Ok(Some(Self {
            original: redact_auth_token(message),
            options,
            ignored,
        }))
    }
}

impl fmt::Display for PushReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

fn redact_auth_token(message: &str) -> String {
    message
        .split(',')
        .map(|token| {
            if token.trim_start().starts_with("auth-token ") {
                "auth-token <redacted>"
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Joins PUSH_REPLY parts split with `push-continuation`
///
/// Partial replies may carry an auth token and are wiped once consumed.
#[derive(Default)]
pub struct PushReplyAssembler {
    pending: Option<Zeroizing<String>>,
}

impl fmt::Debug for PushReplyAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushReplyAssembler")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl PushReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a partial reply is waiting for its continuation
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed a control message
    ///
    /// Returns the reply once the last part arrives, `Ok(None)` for
    /// intermediate parts and for messages that are not PUSH_REPLY.
    pub fn feed(&mut self, message: &str) -> Result<Option<PushReply>, PushReplyError> {
        let Some(directives) = directives_of(message) else {
            return Ok(None);
        };

        let complete = Zeroizing::new(match self.pending.take() {
            Some(pending) if !directives.is_empty() => format!("{},{directives}", *pending),
            Some(pending) => String::clone(&pending),
            None => directives.to_string(),
        });
        let joined = Zeroizing::new(format!("{PUSH_REPLY_PREFIX},{}", *complete));

        match PushReply::parse(&joined) {
            Err(PushReplyError::Continuation) => {
                let kept: Vec<&str> = complete
                    .split(',')
                    .filter(|token| {
                        let token = token.trim();
                        !token.is_empty() && !token.starts_with(CONTINUATION_DIRECTIVE)
                    })
                    .collect();
                debug!("Awaiting PUSH_REPLY continuation ({} directives so far)", kept.len());
                self.pending = Some(Zeroizing::new(kept.join(",")));
                Ok(None)
            }
            other => other,
        }
    }

    /// Drop any partial reply
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

/// Directive list following the `PUSH_REPLY` token
fn directives_of(message: &str) -> Option<&str> {
    let rest = message.strip_prefix(PUSH_REPLY_PREFIX)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix(',')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topology {
    Net30,
    P2p,
    Subnet,
}

struct RouteSpec<'a> {
    token: &'a str,
    destination: &'a str,
    mask: &'a str,
    gateway: Option<&'a str>,
}

struct Route6Spec<'a> {
    token: &'a str,
    destination: &'a str,
    prefix: u8,
    gateway: Option<&'a str>,
}

#[derive(Default)]
struct Builder<'a> {
    options: PushOptions,
    ignored: Vec<String>,
    topology: Option<Topology>,
    ifconfig4: Option<(&'a str, Vec<&'a str>)>,
    ifconfig6: Option<(&'a str, Vec<&'a str>)>,
    route_gateway: Option<Vec<&'a str>>,
    routes4: Option<Vec<RouteSpec<'a>>>,
    routes6: Option<Vec<Route6Spec<'a>>>,
    redirect_flags: Option<BTreeSet<&'a str>>,
}

impl<'a> Builder<'a> {
    fn put(&mut self, token: &'a str, components: &[&'a str]) -> Result<(), PushReplyError> {
        let args = &components[1..];
        let accepted = match components[0] {
            CONTINUATION_DIRECTIVE => {
                if args.first() == Some(&"2") {
                    return Err(PushReplyError::Continuation);
                }
                true
            }

            // addressing
            "topology" => match args {
                ["net30"] => self.set_topology(Topology::Net30),
                ["p2p"] => self.set_topology(Topology::P2p),
                ["subnet"] => self.set_topology(Topology::Subnet),
                _ => false,
            },
            "ifconfig" if !args.is_empty() => {
                self.ifconfig4 = Some((token, args.to_vec()));
                true
            }
            "ifconfig-ipv6" if !args.is_empty() => {
                self.ifconfig6 = Some((token, args.to_vec()));
                true
            }
            "route-gateway" => {
                self.route_gateway = Some(args.to_vec());
                true
            }
            "route" if !args.is_empty() => {
                let gateway = args.get(2).copied().filter(|gw| *gw != VPN_GATEWAY);
                self.routes4.get_or_insert_with(Vec::new).push(RouteSpec {
                    token,
                    destination: args[0],
                    mask: args.get(1).copied().unwrap_or(HOST_MASK),
                    gateway,
                });
                true
            }
            "route-ipv6" if !args.is_empty() => self.put_route6(token, args),
            "redirect-gateway" => {
                let flags = self.redirect_flags.get_or_insert_with(BTreeSet::new);
                flags.insert("def1");
                flags.extend(args.iter().copied());
                true
            }
            "dhcp-option" => self.put_dhcp_option(args),

            // timing
            "ping" => set_number(&mut self.options.keep_alive_interval, args),
            "ping-restart" => set_number(&mut self.options.keep_alive_timeout, args),
            "keepalive" => match args {
                [ping, restart] => {
                    set_number(&mut self.options.keep_alive_interval, &[*ping])
                        && set_number(&mut self.options.keep_alive_timeout, &[*restart])
                }
                _ => false,
            },
            "reneg-sec" => set_number(&mut self.options.renegotiates_after, args),

            // data channel
            "comp-lzo" => {
                self.options.compression_framing = Some(CompressionFraming::CompLzo);
                self.options.compression_algorithm = Some(match args.last() {
                    Some(&"no") => CompressionAlgorithm::Disabled,
                    _ => CompressionAlgorithm::Lzo,
                });
                true
            }
            "compress" => {
                let (framing, algorithm) = match args.first() {
                    None | Some(&"stub") => {
                        (CompressionFraming::Compress, CompressionAlgorithm::Disabled)
                    }
                    Some(&"stub-v2") => {
                        (CompressionFraming::CompressV2, CompressionAlgorithm::Disabled)
                    }
                    Some(&"lzo") => (CompressionFraming::Compress, CompressionAlgorithm::Lzo),
                    Some(_) => (CompressionFraming::Compress, CompressionAlgorithm::Other),
                };
                self.options.compression_framing = Some(framing);
                self.options.compression_algorithm = Some(algorithm);
                true
            }
            "cipher" => match args {
                [name] => name.parse().map(|c| self.options.cipher = Some(c)).is_ok(),
                _ => false,
            },
            "auth" => match args {
                [name] => name.parse().map(|d| self.options.digest = Some(d)).is_ok(),
                _ => false,
            },
            "peer-id" => {
                let mut peer_id = None;
                let ok = set_number(&mut peer_id, args);
                self.options.peer_id = peer_id.and_then(|id: u64| u32::try_from(id).ok());
                ok && self.options.peer_id.is_some()
            }
            "auth-token" => {
                // bare token carries nothing
                if let [token] = args {
                    self.options.auth_token = Some(ZeroingBuffer::from_text(token, false));
                }
                return Ok(());
            }

            _ => false,
        };

        if !accepted {
            debug!("Ignoring PUSH_REPLY directive: {}", token);
            self.ignored.push(token.to_string());
        }
        Ok(())
    }

    fn set_topology(&mut self, topology: Topology) -> bool {
        self.topology = Some(topology);
        true
    }

    fn put_route6(&mut self, token: &'a str, args: &[&'a str]) -> bool {
        let Some((destination, prefix)) = args[0].split_once('/') else {
            return false;
        };
        let Ok(prefix) = prefix.parse::<u8>() else {
            return false;
        };
        let gateway = args.get(1).copied().filter(|gw| *gw != VPN_GATEWAY);
        self.routes6.get_or_insert_with(Vec::new).push(Route6Spec {
            token,
            destination,
            prefix,
            gateway,
        });
        true
    }

    fn put_dhcp_option(&mut self, args: &[&'a str]) -> bool {
        let options = &mut self.options;
        match args {
            ["DNS" | "DNS6", address] => match address.parse::<IpAddr>() {
                Ok(ip) => {
                    options.dns_servers.get_or_insert_with(Vec::new).push(ip);
                    true
                }
                Err(_) => false,
            },
            ["DOMAIN", domain] => {
                options.dns_domain = Some(domain.to_string());
                true
            }
            ["DOMAIN-SEARCH", domain] => {
                options
                    .search_domains
                    .get_or_insert_with(Vec::new)
                    .push(domain.to_string());
                true
            }
            ["PROXY_AUTO_CONFIG_URL", url] => {
                options.proxy_auto_config_url = Some(url.to_string());
                true
            }
            [kind @ ("PROXY_HTTP" | "PROXY_HTTPS"), host, port] => {
                let Ok(port) = port.parse::<u16>() else {
                    return false;
                };
                let proxy = Some(ProxyAddress {
                    host: host.to_string(),
                    port,
                });
                if *kind == "PROXY_HTTPS" {
                    options.https_proxy = proxy;
                } else {
                    options.http_proxy = proxy;
                }
                true
            }
            ["PROXY_BYPASS", domains @ ..] if !domains.is_empty() => {
                options.proxy_bypass_domains =
                    Some(domains.iter().map(|d| d.to_string()).collect());
                true
            }
            _ => false,
        }
    }

    fn build(mut self) -> (PushOptions, Vec<String>) {
        let gateway4 = self.build_ipv4();
        if let Some(specs) = self.routes4.take() {
            let mut routes = Vec::with_capacity(specs.len());
            for spec in specs {
                let subnet = match Subnet::from_ipv4_mask(spec.destination, spec.mask) {
                    Ok(subnet) => subnet,
                    Err(e) => {
                        self.skip(spec.token, &e);
                        continue;
                    }
                };
                match resolve_gateway(spec.gateway, gateway4) {
                    Some(gateway) => routes.push(Route::new(subnet, Some(gateway))),
                    None => self.skip(spec.token, &"no usable gateway"),
                }
            }
            self.options.routes4 = Some(routes);
        }

        let gateway6 = self.build_ipv6();
        if let Some(specs) = self.routes6.take() {
            let mut routes = Vec::with_capacity(specs.len());
            for spec in specs {
                let subnet = match Subnet::from_prefix(spec.destination, spec.prefix) {
                    Ok(subnet) => subnet,
                    Err(e) => {
                        self.skip(spec.token, &e);
                        continue;
                    }
                };
                match resolve_gateway(spec.gateway, gateway6) {
                    Some(gateway) => routes.push(Route::new(subnet, Some(gateway))),
                    None => self.skip(spec.token, &"no usable gateway"),
                }
            }
            self.options.routes6 = Some(routes);
        }

        if let Some(flags) = &self.redirect_flags {
            let mut policies = BTreeSet::new();
            for flag in flags {
                match *flag {
                    "def1" => {
                        policies.insert(RoutingPolicy::IPv4);
                    }
                    "ipv6" => {
                        policies.insert(RoutingPolicy::IPv6);
                    }
                    "block-local" => {
                        policies.insert(RoutingPolicy::BlockLocal);
                    }
                    _ => {}
                }
            }
            if flags.contains("!ipv4") {
                policies.remove(&RoutingPolicy::IPv4);
            }
            self.options.routing_policies = Some(policies);
        }

        (self.options, self.ignored)
    }

    /// Directive accepted by `put` but unusable once the reply is complete
    fn skip(&mut self, token: &str, reason: &dyn fmt::Display) {
        warn!("Ignoring PUSH_REPLY directive {}: {}", token, reason);
        self.ignored.push(token.to_string());
    }

    /// Interface settings from `ifconfig`, returning the default gateway
    fn build_ipv4(&mut self) -> Option<IpAddr> {
        let (token, args) = self.ifconfig4.take()?;
        let [address, second] = args[..] else {
            self.skip(token, &format_args!("expected 2 arguments, got {}", args.len()));
            return None;
        };

        let (mask, gateway) = match self.topology.unwrap_or(Topology::Net30) {
            Topology::Subnet => match self.route_gateway.as_deref() {
                Some([gateway]) => (second, *gateway),
                _ => {
                    self.skip(token, &"topology subnet requires a single route-gateway");
                    return None;
                }
            },
            Topology::Net30 | Topology::P2p => (HOST_MASK, second),
        };

        let subnet = match Subnet::from_ipv4_mask(address, mask) {
            Ok(subnet) => subnet,
            Err(e) => {
                self.skip(token, &e);
                return None;
            }
        };
        let mut settings = IpSettings::new(subnet);
        let gateway = gateway.parse().ok();
        if let Some(gateway) = gateway {
            settings = settings.including(Route::default_with_gateway(gateway));
        }
        self.options.ipv4 = Some(settings);
        gateway
    }

    /// Interface settings from `ifconfig-ipv6`, returning the default gateway
    fn build_ipv6(&mut self) -> Option<IpAddr> {
        let (token, args) = self.ifconfig6.take()?;
        let [address, gateway] = args[..] else {
            self.skip(token, &format_args!("expected 2 arguments, got {}", args.len()));
            return None;
        };
        let Some((address, prefix)) = address.split_once('/') else {
            self.skip(token, &"address must have a /prefix");
            return None;
        };
        let subnet = prefix
            .parse()
            .ok()
            .and_then(|prefix| Subnet::from_prefix(address, prefix).ok());
        let Some(subnet) = subnet else {
            self.skip(token, &"malformed address");
            return None;
        };

        let mut settings = IpSettings::new(subnet);
        let gateway = gateway.parse().ok();
        if let Some(gateway) = gateway {
            settings = settings.including(Route::default_with_gateway(gateway));
        }
        self.options.ipv6 = Some(settings);
        gateway
    }
}

fn resolve_gateway(explicit: Option<&str>, inherited: Option<IpAddr>) -> Option<IpAddr> {
    match explicit {
        Some(gw) => gw.parse().ok(),
        None => inherited,
    }
}

fn set_number(field: &mut Option<u64>, args: &[&str]) -> bool {
    match args {
        [value] => match value.parse() {
            Ok(n) => {
                *field = Some(n);
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    const CONTINUED: &str = "PUSH_REPLY,route 87.233.192.218,route 87.233.192.219,route 87.233.192.220,route 87.248.186.252,route 92.241.171.245,route 103.246.200.0 255.255.252.0,route 109.239.140.0 255.255.255.0,route 128.199.0.0 255.255.0.0,route 13.125.0.0 255.255.0.0,route 13.230.0.0 255.254.0.0,route 13.56.0.0 255.252.0.0,route 149.154.160.0 255.255.252.0,route 149.154.164.0 255.255.252.0,route 149.154.168.0 255.255.252.0,route 149.154.172.0 255.255.252.0,route 159.122.128.0 255.255.192.0,route 159.203.0.0 255.255.0.0,route 159.65.0.0 255.255.0.0,route 159.89.0.0 255.255.0.0,route 165.227.0.0 255.255.0.0,route 167.99.0.0 255.255.0.0,route 174.138.0.0 255.255.128.0,route 176.67.169.0 255.255.255.0,route 178.239.88.0 255.255.248.0,route 178.63.0.0 255.255.0.0,route 18.130.0.0 255.255.0.0,route 18.144.0.0 255.255.0.0,route 18.184.0.0 255.254.0.0,route 18.194.0.0 255.254.0.0,route 18.196.0.0 255.254.0.0,route 18.204.0.0 255.252.0.0,push-continuation 2";

    const COMPRESSION_BASE: &str = "PUSH_REPLY,dhcp-option DNS 8.8.8.8,dhcp-option DNS 4.4.4.4,route 10.8.0.1,topology net30,ping 10,ping-restart 120,ifconfig 10.8.0.6 10.8.0.5,peer-id 0,cipher AES-256-CBC";

    fn parse(message: &str) -> PushReply {
        PushReply::parse(message).unwrap().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn ipv4_summary(options: &PushOptions) -> (IpAddr, Ipv4Addr, IpAddr) {
        let ipv4 = options.ipv4.as_ref().unwrap();
        let subnet = ipv4.subnet.unwrap();
        (
            subnet.address,
            subnet.ipv4_mask().unwrap(),
            ipv4.default_gateway().unwrap(),
        )
    }

    #[test]
    fn test_no_fallback_values() {
        let reply = parse("PUSH_REPLY,redirect-gateway def1");
        assert_eq!(reply.options.cipher, None);
        assert_eq!(reply.options.digest, None);
        assert_eq!(reply.options.compression_framing, None);
        assert_eq!(reply.options.compression_algorithm, None);
    }

    #[test]
    fn test_not_a_push_reply() {
        assert_eq!(PushReply::parse("AUTH_FAILED"), Ok(None));
        assert_eq!(PushReply::parse("PUSH_REPLYX,ping 10"), Ok(None));
    }

    #[test]
    fn test_net30() {
        let reply = parse("PUSH_REPLY,redirect-gateway def1,dhcp-option DNS 209.222.18.222,dhcp-option DNS 209.222.18.218,ping 10,comp-lzo no,route 10.5.10.1,topology net30,ifconfig 10.5.10.6 10.5.10.5,auth-token AUkQf/b3nj3L+CH4RJPP0Vuq8/gpntr7uPqzjQhncig=");

        assert_eq!(
            ipv4_summary(&reply.options),
            (ip("10.5.10.6"), Ipv4Addr::new(255, 255, 255, 255), ip("10.5.10.5"))
        );
        assert_eq!(
            reply.options.dns_servers,
            Some(vec![ip("209.222.18.222"), ip("209.222.18.218")])
        );

        // route before ifconfig still inherits its gateway
        let routes = reply.options.routes4.unwrap();
        assert_eq!(routes[0].destination.unwrap().prefix_length, 32);
        assert_eq!(routes[0].gateway, Some(ip("10.5.10.5")));

        let token = reply.options.auth_token.unwrap();
        assert!(token.eq_bytes(b"AUkQf/b3nj3L+CH4RJPP0Vuq8/gpntr7uPqzjQhncig="));
    }

    #[test]
    fn test_subnet() {
        let reply = parse("PUSH_REPLY,dhcp-option DNS 8.8.8.8,dhcp-option DNS 4.4.4.4,route-gateway 10.8.0.1,topology subnet,ping 10,ping-restart 120,ifconfig 10.8.0.2 255.255.255.0,peer-id 0");

        assert_eq!(
            ipv4_summary(&reply.options),
            (ip("10.8.0.2"), Ipv4Addr::new(255, 255, 255, 0), ip("10.8.0.1"))
        );
        assert_eq!(reply.options.dns_servers, Some(vec![ip("8.8.8.8"), ip("4.4.4.4")]));
        assert_eq!(reply.options.peer_id, Some(0));
        assert!(reply.ignored.is_empty());
    }

    #[test]
    fn test_subnet_without_route_gateway() {
        let reply = parse("PUSH_REPLY,topology subnet,ifconfig 10.8.0.2 255.255.255.0,ping 10");
        assert_eq!(reply.options.ipv4, None);
        assert_eq!(reply.options.keep_alive_interval, Some(10));
        assert_eq!(reply.ignored, vec!["ifconfig 10.8.0.2 255.255.255.0".to_string()]);
    }

    #[test]
    fn test_unusable_directives_are_ignored() {
        let reply = parse("PUSH_REPLY,topology subnet,ifconfig 10.8.0.2 255.255.255.0,route 10.0.0.0 255.0.255.0 10.8.0.1,ifconfig-ipv6 fe80::1 fe80::2");

        assert_eq!(reply.options.ipv4, None);
        assert_eq!(reply.options.ipv6, None);
        assert_eq!(reply.options.routes4, Some(vec![]));
        assert_eq!(
            reply.ignored,
            vec![
                "ifconfig 10.8.0.2 255.255.255.0".to_string(),
                "route 10.0.0.0 255.0.255.0 10.8.0.1".to_string(),
                "ifconfig-ipv6 fe80::1 fe80::2".to_string(),
            ]
        );

        let reply = parse("PUSH_REPLY,ifconfig 10.8.0.6,ifconfig-ipv6 fd00::2/129 fd00::1");
        assert_eq!(
            reply.ignored,
            vec!["ifconfig 10.8.0.6".to_string(), "ifconfig-ipv6 fd00::2/129 fd00::1".to_string()]
        );
    }

    #[test]
    fn test_route() {
        let reply = parse("PUSH_REPLY,dhcp-option DNS 8.8.8.8,dhcp-option DNS 4.4.4.4,route-gateway 10.8.0.1,route 192.168.0.0 255.255.255.0 10.8.0.12,topology subnet,ping 10,ping-restart 120,ifconfig 10.8.0.2 255.255.255.0,peer-id 0");

        let route = reply.options.routes4.unwrap()[0];
        let destination = route.destination.unwrap();
        assert_eq!(destination.address, ip("192.168.0.0"));
        assert_eq!(destination.ipv4_mask(), Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(route.gateway, Some(ip("10.8.0.12")));
    }

    #[test]
    fn test_route_gateway_resolution() {
        let reply = parse("PUSH_REPLY,route 10.1.0.0 255.255.0.0 vpn_gateway,route 10.2.0.0 255.255.0.0 net_gateway,route 10.3.0.0 255.0.255.0,topology net30,ifconfig 10.8.0.6 10.8.0.5");

        let routes = reply.options.routes4.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].gateway, Some(ip("10.8.0.5")));
        assert_eq!(
            reply.ignored,
            vec![
                "route 10.2.0.0 255.255.0.0 net_gateway".to_string(),
                "route 10.3.0.0 255.0.255.0".to_string(),
            ]
        );

        // no interface gateway to inherit
        let reply = parse("PUSH_REPLY,route 10.1.0.0 255.255.0.0");
        assert_eq!(reply.options.routes4, Some(vec![]));
        assert_eq!(reply.ignored, vec!["route 10.1.0.0 255.255.0.0".to_string()]);
    }

    #[test]
    fn test_ipv6() {
        let reply = parse("PUSH_REPLY,dhcp-option DNS6 2001:4860:4860::8888,dhcp-option DNS6 2001:4860:4860::8844,tun-ipv6,route-gateway 10.8.0.1,topology subnet,ping 10,ping-restart 120,ifconfig-ipv6 fe80::601:30ff:feb7:ec01/64 fe80::601:30ff:feb7:dc02,ifconfig 10.8.0.2 255.255.255.0,peer-id 0");

        assert_eq!(
            ipv4_summary(&reply.options),
            (ip("10.8.0.2"), Ipv4Addr::new(255, 255, 255, 0), ip("10.8.0.1"))
        );

        let ipv6 = reply.options.ipv6.unwrap();
        let subnet = ipv6.subnet.unwrap();
        assert_eq!(subnet.address, ip("fe80::601:30ff:feb7:ec01"));
        assert_eq!(subnet.prefix_length, 64);
        assert_eq!(ipv6.default_gateway(), Some(ip("fe80::601:30ff:feb7:dc02")));
        assert_eq!(
            reply.options.dns_servers,
            Some(vec![ip("2001:4860:4860::8888"), ip("2001:4860:4860::8844")])
        );
        assert_eq!(reply.ignored, vec!["tun-ipv6".to_string()]);
    }

    #[test]
    fn test_route_ipv6() {
        let reply = parse("PUSH_REPLY,ifconfig-ipv6 fd00::2/64 fd00::1,route-ipv6 2000::/3,route-ipv6 fd01::/48 fd00::9,route-ipv6 bogus");

        let routes = reply.options.routes6.unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].destination.unwrap().prefix_length, 3);
        assert_eq!(routes[0].gateway, Some(ip("fd00::1")));
        assert_eq!(routes[1].gateway, Some(ip("fd00::9")));
        assert_eq!(reply.ignored, vec!["route-ipv6 bogus".to_string()]);
    }

    #[test]
    fn test_compression_framing() {
        let reply = parse("PUSH_REPLY,dhcp-option DNS 8.8.8.8,dhcp-option DNS 4.4.4.4,comp-lzo no,route 10.8.0.1,topology net30,ping 10,ping-restart 120,ifconfig 10.8.0.6 10.8.0.5,peer-id 0,cipher AES-256-CBC");
        assert_eq!(reply.options.compression_framing, Some(CompressionFraming::CompLzo));
    }

    #[test]
    fn test_compression_algorithm() {
        let cases = [
            (",comp-lzo no", CompressionFraming::CompLzo, CompressionAlgorithm::Disabled),
            (",comp-lzo", CompressionFraming::CompLzo, CompressionAlgorithm::Lzo),
            (",comp-lzo yes", CompressionFraming::CompLzo, CompressionAlgorithm::Lzo),
            (",compress", CompressionFraming::Compress, CompressionAlgorithm::Disabled),
            (",compress lz4", CompressionFraming::Compress, CompressionAlgorithm::Other),
            (",compress lzo", CompressionFraming::Compress, CompressionAlgorithm::Lzo),
            (",compress stub", CompressionFraming::Compress, CompressionAlgorithm::Disabled),
            (",compress stub-v2", CompressionFraming::CompressV2, CompressionAlgorithm::Disabled),
        ];
        for (suffix, framing, algorithm) in cases {
            let reply = parse(&format!("{COMPRESSION_BASE}{suffix}"));
            assert_eq!(reply.options.compression_framing, Some(framing), "{suffix}");
            assert_eq!(reply.options.compression_algorithm, Some(algorithm), "{suffix}");
        }
    }

    #[test]
    fn test_ncp_cipher() {
        let reply = parse("PUSH_REPLY,dhcp-option DNS 8.8.8.8,dhcp-option DNS 4.4.4.4,comp-lzo no,route 10.8.0.1,topology net30,ping 10,ping-restart 120,ifconfig 10.8.0.6 10.8.0.5,peer-id 0,cipher AES-256-GCM");
        assert_eq!(reply.options.cipher, Some(Cipher::Aes256Gcm));
    }

    #[test]
    fn test_trailing_bare_auth_token() {
        let reply = parse("PUSH_REPLY,dhcp-option DNS 8.8.8.8,dhcp-option DNS 4.4.4.4,comp-lzo no,route 10.8.0.1,topology net30,ping 10,ping-restart 120,ifconfig 10.8.0.18 10.8.0.17,peer-id 3,cipher AES-256-GCM,auth-token");
        assert_eq!(reply.options.cipher, Some(Cipher::Aes256Gcm));
        assert_eq!(reply.options.peer_id, Some(3));
        assert!(reply.options.auth_token.is_none());
    }

    #[test]
    fn test_unknown_cipher_is_ignored() {
        let reply = parse("PUSH_REPLY,cipher BF-CBC,auth SHA512,ping 5");
        assert_eq!(reply.options.cipher, None);
        assert_eq!(reply.options.digest, Some(Digest::Sha512));
        assert_eq!(reply.options.keep_alive_interval, Some(5));
        assert_eq!(reply.ignored, vec!["cipher BF-CBC".to_string()]);
    }

    #[test]
    fn test_ping_and_restart() {
        let message = "PUSH_REPLY,route 192.168.1.0 255.255.255.0,route 10.0.2.0 255.255.255.0,dhcp-option DNS 192.168.1.99,dhcp-option DNS 176.103.130.130,route 10.0.2.1,topology net30,ping 10,ping-restart 60,ifconfig 10.0.2.14 10.0.2.13";
        let reply = parse(message);
        assert_eq!(reply.options.keep_alive_interval, Some(10));
        assert_eq!(reply.options.keep_alive_timeout, Some(60));
        assert_eq!(reply.options.routes4.unwrap().len(), 3);
    }

    #[test]
    fn test_keepalive_and_reneg() {
        let reply = parse("PUSH_REPLY,keepalive 15 90,reneg-sec 3600,ping abc");
        assert_eq!(reply.options.keep_alive_interval, Some(15));
        assert_eq!(reply.options.keep_alive_timeout, Some(90));
        assert_eq!(reply.options.renegotiates_after, Some(3600));
        assert_eq!(reply.ignored, vec!["ping abc".to_string()]);
    }

    #[test]
    fn test_continuation() {
        assert_eq!(PushReply::parse(CONTINUED), Err(PushReplyError::Continuation));
    }

    #[test]
    fn test_last_continuation_part() {
        let reply = parse("PUSH_REPLY,ping 10,push-continuation 1");
        assert_eq!(reply.options.keep_alive_interval, Some(10));
        assert!(reply.ignored.is_empty());
    }

    #[test]
    fn test_parse_is_fast_enough() {
        let iterations = 100;
        let start = Instant::now();
        for _ in 0..iterations {
            let _ = PushReply::parse(CONTINUED);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_multiple_redirect_gateway() {
        let reply = parse("PUSH_REPLY,redirect-gateway def1,redirect-gateway bypass-dhcp,redirect-gateway autolocal,dhcp-option DNS 8.8.8.8,route-gateway 10.8.0.1,topology subnet,ping 10,ping-restart 20,ifconfig 10.8.0.2 255.255.255.0,peer-id 0,cipher AES-256-GCM");
        assert_eq!(
            reply.options.routing_policies,
            Some(BTreeSet::from([RoutingPolicy::IPv4]))
        );
    }

    #[test]
    fn test_redirect_gateway_flags() {
        let reply = parse("PUSH_REPLY,redirect-gateway ipv6 !ipv4,redirect-gateway block-local");
        assert_eq!(
            reply.options.routing_policies,
            Some(BTreeSet::from([RoutingPolicy::IPv6, RoutingPolicy::BlockLocal]))
        );
    }

    #[test]
    fn test_dhcp_extras() {
        let reply = parse("PUSH_REPLY,dhcp-option DOMAIN example.com,dhcp-option DOMAIN-SEARCH a.example.com,dhcp-option DOMAIN-SEARCH b.example.com,dhcp-option PROXY_HTTP proxy.example.com 8080,dhcp-option PROXY_HTTPS proxy.example.com 8443,dhcp-option PROXY_AUTO_CONFIG_URL http://example.com/proxy.pac,dhcp-option PROXY_BYPASS localhost intranet,dhcp-option WINS 10.0.0.1");
        let options = reply.options;
        assert_eq!(options.dns_domain.as_deref(), Some("example.com"));
        assert_eq!(
            options.search_domains,
            Some(vec!["a.example.com".to_string(), "b.example.com".to_string()])
        );
        assert_eq!(options.http_proxy.unwrap().port, 8080);
        assert_eq!(options.https_proxy.unwrap().host, "proxy.example.com");
        assert_eq!(
            options.proxy_auto_config_url.as_deref(),
            Some("http://example.com/proxy.pac")
        );
        assert_eq!(
            options.proxy_bypass_domains,
            Some(vec!["localhost".to_string(), "intranet".to_string()])
        );
        assert_eq!(reply.ignored, vec!["dhcp-option WINS 10.0.0.1".to_string()]);
    }

    #[test]
    fn test_display_masks_auth_token() {
        let reply = parse("PUSH_REPLY,ping 10,auth-token secret123");
        let rendered = reply.to_string();
        assert!(!rendered.contains("secret123"));
        assert_eq!(rendered, "PUSH_REPLY,ping 10,auth-token <redacted>");
        assert!(!format!("{:?}", reply).contains("secret123"));
        assert!(!reply.original.contains("secret123"));
        assert!(reply.options.auth_token.unwrap().eq_bytes(b"secret123"));
    }

    #[test]
    fn test_assembler_keeps_auth_token_private() {
        let mut assembler = PushReplyAssembler::new();
        assembler
            .feed("PUSH_REPLY,auth-token secret123,push-continuation 2")
            .unwrap();
        assert!(!format!("{:?}", assembler).contains("secret123"));

        let reply = assembler
            .feed("PUSH_REPLY,topology net30,ifconfig 10.8.0.6 10.8.0.5")
            .unwrap()
            .unwrap();
        assert!(reply.options.auth_token.unwrap().eq_bytes(b"secret123"));
        assert!(!reply.original.contains("secret123"));
    }

    #[test]
    fn test_assembler() {
        let mut assembler = PushReplyAssembler::new();
        assert_eq!(assembler.feed(CONTINUED), Ok(None));
        assert!(assembler.is_pending());

        let reply = assembler
            .feed("PUSH_REPLY,topology net30,ifconfig 10.8.0.6 10.8.0.5,push-continuation 1")
            .unwrap()
            .unwrap();
        assert!(!assembler.is_pending());
        assert!(reply.ignored.is_empty());

        let routes = reply.options.routes4.unwrap();
        assert_eq!(routes.len(), 31);
        assert!(routes.iter().all(|r| r.gateway == Some(ip("10.8.0.5"))));
        assert!(reply.options.ipv4.is_some());
    }

    #[test]
    fn test_assembler_ignores_other_messages() {
        let mut assembler = PushReplyAssembler::new();
        assert_eq!(assembler.feed("PUSH_REPLY,ping 10,push-continuation 2"), Ok(None));
        assert_eq!(assembler.feed("INFO,hello"), Ok(None));
        assert!(assembler.is_pending());

        let reply = assembler.feed("PUSH_REPLY,ping-restart 60").unwrap().unwrap();
        assert_eq!(reply.options.keep_alive_interval, Some(10));
        assert_eq!(reply.options.keep_alive_timeout, Some(60));

        assembler.feed("PUSH_REPLY,ping 10,push-continuation 2").unwrap();
        assembler.reset();
        assert!(!assembler.is_pending());
    }
}
