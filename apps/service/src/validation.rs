//! Address validation and /24 segment grouping.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

/// Label used for every IPv6 host, they are not split into segments
pub const IPV6_SEGMENT: &str = "IPv6";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid segment filter '{0}', use e.g. 192.168.56.0/24 or 56/24")]
pub struct InvalidSegmentFilter(pub String);

/// Parse a user supplied address, surrounding whitespace ignored
pub fn parse_address(raw: &str) -> Option<IpAddr> {
    raw.trim().parse().ok()
}

/// Canonical textual form of a user supplied address
pub fn normalize_address(raw: &str) -> Option<String> {
    parse_address(raw).map(|ip| ip.to_string())
}

/// The segment an address belongs to: its /24 network, or `IPv6`
pub fn segment_of(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}/24", network_base(v4)),
        IpAddr::V6(_) => IPV6_SEGMENT.to_string(),
    }
}

fn network_base(ip: &Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 0)
}

/// Filter on the segment of stored hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFilter {
    /// Short form `56/24`: any IPv4 host whose third octet is 56
    ThirdOctet(u8),
    /// A full /24 network, stored as its base address
    Network(Ipv4Addr),
}

impl SegmentFilter {
    /// Parse a filter string. Blank input means "no filter".
    pub fn parse(raw: &str) -> Result<Option<Self>, InvalidSegmentFilter> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let invalid = || InvalidSegmentFilter(value.to_string());

        let (address, prefix) = value.split_once('/').ok_or_else(invalid)?;
        if prefix != "24" {
            return Err(invalid());
        }

        if !address.contains('.') {
            return match address.parse::<u8>() {
                Ok(octet) if address.chars().all(|c| c.is_ascii_digit()) => {
                    Ok(Some(SegmentFilter::ThirdOctet(octet)))
                }
                _ => Err(invalid()),
            };
        }

        let ip: Ipv4Addr = address.parse().map_err(|_| invalid())?;
        Ok(Some(SegmentFilter::Network(network_base(&ip))))
    }

    pub fn matches(&self, ip: &IpAddr) -> bool {
        match (self, ip) {
            (SegmentFilter::ThirdOctet(octet), IpAddr::V4(v4)) => v4.octets()[2] == *octet,
            (SegmentFilter::Network(base), IpAddr::V4(v4)) => network_base(v4) == *base,
            (_, IpAddr::V6(_)) => false,
        }
    }
}

impl fmt::Display for SegmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentFilter::ThirdOctet(octet) => write!(f, "third octet {octet}"),
            SegmentFilter::Network(base) => write!(f, "{base}/24"),
        }
    }
}
