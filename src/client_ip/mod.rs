//! Client identity resolution
//!
//! Derives the logical client address for a request. Forwarded headers
//! (`X-Forwarded-For`, `X-Real-IP`) are honored only when the immediate TCP
//! peer is in the configured trusted-proxy allowlist; otherwise the peer
//! address is used verbatim so a client cannot spoof its way into a fresh
//! rate-limit bucket.

use crate::error::{GuardError, Result};
use http::HeaderMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Represents an IP address or CIDR range
#[derive(Debug, Clone)]
enum IpRange {
    Single(IpAddr),
    Cidr { network: IpAddr, prefix_len: u8 },
}

impl IpRange {
    /// Parse an IP or CIDR string into an IpRange
    fn parse(s: &str) -> Result<Self> {
        if let Some((network_str, prefix_str)) = s.split_once('/') {
            // CIDR notation
            let network = IpAddr::from_str(network_str).map_err(|e| {
                GuardError::InvalidProxyEntry(s.to_string(), format!("invalid network: {}", e))
            })?;

            let prefix_len = prefix_str.parse::<u8>().map_err(|e| {
                GuardError::InvalidProxyEntry(s.to_string(), format!("invalid prefix: {}", e))
            })?;

            match network {
                IpAddr::V4(_) if prefix_len > 32 => {
                    return Err(GuardError::InvalidProxyEntry(
                        s.to_string(),
                        format!("IPv4 prefix length {} must be 0-32", prefix_len),
                    ));
                }
                IpAddr::V6(_) if prefix_len > 128 => {
                    return Err(GuardError::InvalidProxyEntry(
                        s.to_string(),
                        format!("IPv6 prefix length {} must be 0-128", prefix_len),
                    ));
                }
                _ => {}
            }

            Ok(IpRange::Cidr {
                network,
                prefix_len,
            })
        } else {
            let ip = IpAddr::from_str(s).map_err(|e| {
                GuardError::InvalidProxyEntry(s.to_string(), format!("invalid address: {}", e))
            })?;
            Ok(IpRange::Single(ip))
        }
    }

    /// Check if an IP address matches this range
    fn contains(&self, ip: &IpAddr) -> bool {
        match self {
            IpRange::Single(range_ip) => ip == range_ip,
            IpRange::Cidr {
                network,
                prefix_len,
            } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let net_bits = u32::from_be_bytes(net.octets());
                    let addr_bits = u32::from_be_bytes(addr.octets());
                    let mask = if *prefix_len == 0 {
                        0
                    } else {
                        !0u32 << (32 - prefix_len)
                    };
                    (net_bits & mask) == (addr_bits & mask)
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let net_bits = u128::from_be_bytes(net.octets());
                    let addr_bits = u128::from_be_bytes(addr.octets());
                    let mask = if *prefix_len == 0 {
                        0
                    } else {
                        !0u128 << (128 - prefix_len)
                    };
                    (net_bits & mask) == (addr_bits & mask)
                }
                // Different IP versions never match
                _ => false,
            },
        }
    }
}

/// Parsed trusted-proxy allowlist (IPs and CIDR ranges)
#[derive(Debug)]
pub struct TrustedProxies {
    ranges: Vec<IpRange>,
}

impl TrustedProxies {
    /// Parse a list of IP/CIDR strings. Fatal at startup on any bad entry.
    pub fn parse(entries: &[String]) -> Result<Self> {
        let ranges: Result<Vec<IpRange>> = entries.iter().map(|s| IpRange::parse(s)).collect();
        Ok(Self { ranges: ranges? })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Resolves the logical client address from the TCP peer and request headers
#[derive(Debug)]
pub struct ClientIpResolver {
    /// Whether forwarded headers are honored at all
    proxy_headers_enabled: bool,
    trusted: TrustedProxies,
    /// Emit at most one warning when proxy headers are enabled without
    /// any trusted proxies configured.
    missing_trust_warned: AtomicBool,
}

impl ClientIpResolver {
    pub fn new(proxy_headers_enabled: bool, trusted_proxies: &[String]) -> Result<Self> {
        Ok(Self {
            proxy_headers_enabled,
            trusted: TrustedProxies::parse(trusted_proxies)?,
            missing_trust_warned: AtomicBool::new(false),
        })
    }

    /// Resolve the client address. Never fails; malformed or missing input
    /// degrades to the immediate peer address.
    pub fn resolve(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> String {
        let peer = match peer {
            Some(p) => p,
            None => return "unknown".to_string(),
        };

        if !self.proxy_headers_enabled {
            return peer.to_string();
        }

        if self.trusted.is_empty() {
            if !self.missing_trust_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    "proxy headers are enabled but the trusted proxy list is empty; \
                     ignoring forwarded client addresses"
                );
            }
            return peer.to_string();
        }

        if !self.trusted.contains(&peer) {
            debug!(peer = %peer, "peer not in trusted proxy list, ignoring forwarded headers");
            return peer.to_string();
        }

        match forwarded_ip(headers) {
            Some(ip) => ip.to_string(),
            None => peer.to_string(),
        }
    }
}

/// Extract the forwarded client address: left-most `X-Forwarded-For` entry,
/// falling back to `X-Real-IP`. Values must parse as an IP to be used.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = xff.split(',').next().map(str::trim).unwrap_or("");
        if let Ok(ip) = IpAddr::from_str(first) {
            return Some(ip);
        }
    }

    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = IpAddr::from_str(real.trim()) {
            return Some(ip);
        }
    }

    None
}
