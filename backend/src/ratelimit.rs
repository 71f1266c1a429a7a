//! Per-client-IP request throttle.
//!
//! A coarse denial-of-service guard in front of the authentication and chat
//! endpoints. Keyed GCRA limiter, so a burst of `per_minute` requests is
//! admitted and further ones are rejected until the rolling window drains.
//! Independent of the per-user daily quota.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;

use axum::http::HeaderMap;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

pub struct IpRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl IpRateLimiter {
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    /// Whether a request from `ip` is admitted right now.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Client address for rate-limiting purposes: the first `X-Forwarded-For`
/// hop when running behind a proxy, else the socket peer address.
pub fn client_ip(headers: &HeaderMap, peer: &SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}
