//! Caller identity for rate limiting.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derives the rate-limit partition key for a request.
///
/// The first `X-Forwarded-For` entry wins when forwarded headers are trusted,
/// then the peer address. Ports are dropped so that one client opening many
/// connections stays one identity.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for
        && let Some(forwarded) = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    {
        return strip_port(forwarded);
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

fn strip_port(address: &str) -> String {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return ip.to_string();
    }
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    address.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(value));
        headers
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.7:51234".parse().unwrap())
    }

    #[test]
    fn test_peer_address_without_port() {
        assert_eq!(client_identity(&HeaderMap::new(), peer(), true), "192.0.2.7");
    }

    #[test]
    fn test_first_forwarded_entry_wins() {
        let headers = forwarded(" 203.0.113.9 , 10.0.0.1");
        assert_eq!(client_identity(&headers, peer(), true), "203.0.113.9");
    }

    #[test]
    fn test_forwarded_entry_with_port() {
        assert_eq!(
            client_identity(&forwarded("203.0.113.9:8443"), peer(), true),
            "203.0.113.9"
        );
        assert_eq!(
            client_identity(&forwarded("[2001:db8::1]:443"), peer(), true),
            "2001:db8::1"
        );
    }

    #[test]
    fn test_untrusted_forwarded_header_is_ignored() {
        assert_eq!(
            client_identity(&forwarded("203.0.113.9"), peer(), false),
            "192.0.2.7"
        );
    }

    #[test]
    fn test_empty_forwarded_header_falls_back() {
        assert_eq!(client_identity(&forwarded(" , x"), peer(), true), "192.0.2.7");
        assert_eq!(client_identity(&HeaderMap::new(), None, true), "unknown");
    }
}
