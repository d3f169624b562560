//! Client IP resolution for requests arriving through proxies.

use axum::http::HeaderMap;
use std::net::SocketAddr;

use bastion_common::constants::UNKNOWN_IP;
use bastion_common::constants::headers::{X_FORWARDED_FOR, X_REAL_IP};

/// Resolve the client IP.
///
/// Order: first `X-Forwarded-For` entry, then `X-Real-IP`, then the peer
/// address of the connection, then `"unknown"`.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    forwarded_for(headers)
        .or_else(|| header_value(headers, X_REAL_IP))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_value(headers, X_FORWARDED_FOR)?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
