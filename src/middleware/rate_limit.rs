//! Per-IP rate limiting of the credential endpoints using governor.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use tracing::{debug, warn};

use crate::config::SecurityConfig;
use crate::error::ApiError;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

/// Idle client entries are dropped once every this many checks.
const PRUNE_EVERY: u64 = 1024;

/// Limiter for `/auth/*`. `None` when rate limiting is switched off.
#[derive(Clone, Default)]
pub struct AuthRateLimit {
    limiter: Option<Arc<KeyedRateLimiter>>,
    per_minute: u32,
    checks: Arc<AtomicU64>,
}

impl AuthRateLimit {
    pub fn from_config(config: &SecurityConfig) -> Self {
        if !config.rate_limiting_enabled {
            return Self::disabled();
        }
        Self::per_minute(config.auth_requests_per_minute)
    }

    pub fn per_minute(requests: u32) -> Self {
        let Some(per_minute) = NonZeroU32::new(requests) else {
            return Self::disabled();
        };

        Self::with_quota(Quota::per_minute(per_minute), requests)
    }

    fn with_quota(quota: Quota, per_minute: u32) -> Self {
        Self {
            limiter: Some(Arc::new(RateLimiter::dashmap(quota))),
            per_minute,
            checks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// `Err` carries the number of seconds until the next request is allowed.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        limiter.check_key(&ip).map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }

    /// Forgets clients whose budget has fully replenished.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            let before = limiter.len();
            limiter.retain_recent();
            limiter.shrink_to_fit();
            debug!(before, after = limiter.len(), "Pruned auth rate limiter");
        }
    }

    /// Number of clients currently holding limiter state.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

#[derive(Debug)]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::new(
                "Too many authentication attempts",
                "RATE_LIMITED",
            )),
        )
            .into_response();

        if let Ok(value) = HeaderValue::from_str(&self.retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        response
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn auth_rate_limit_middleware(
    State(limit): State<AuthRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let ip = client_ip(&request);

    if let Err(retry_after_secs) = limit.check(ip) {
        warn!(ip = %ip, retry_after_secs, "Auth rate limit exceeded");
        return Err(RateLimitExceeded { retry_after_secs });
    }

    let mut response = next.run(request).await;
    if limit.is_enabled() {
        if let Ok(value) = HeaderValue::from_str(&limit.per_minute.to_string()) {
            response.headers_mut().insert("X-RateLimit-Limit", value);
        }
    }
    Ok(response)
}
