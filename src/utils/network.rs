//! Network Address Helpers
//!
//! Classification of client addresses before geolocation lookups.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns true for addresses that can never be geolocated: loopback,
/// private ranges, link-local, unspecified and unique-local IPv6.
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_ipv4(v4),
            None => is_local_ipv6(v6),
        },
    }
}

fn is_local_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_local_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

/// Picks the originating client from an `X-Forwarded-For` header value
pub fn parse_forwarded_for(value: &str) -> Option<IpAddr> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .and_then(|candidate| candidate.parse().ok())
}
