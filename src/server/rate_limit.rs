use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Per-client request budget keyed by remote IP.
pub struct ClientRateLimiter {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl ClientRateLimiter {
    /// `0` disables limiting.
    pub fn per_minute(limit: u32) -> Self {
        Self::with_quota(NonZeroU32::new(limit).map(Quota::per_minute))
    }

    fn with_quota(quota: Option<Quota>) -> Self {
        Self {
            limiter: quota.map(RateLimiter::keyed),
        }
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops clients whose budget has fully refilled.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    pub fn check(&self, client: &str) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(&client.to_string()).is_ok(),
            None => true,
        }
    }
}

/// Prunes `limiter` every `period` until the last strong reference is dropped.
pub fn spawn_pruner(limiter: &Arc<ClientRateLimiter>, period: Duration) {
    let weak: Weak<ClientRateLimiter> = Arc::downgrade(limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };
            let before = limiter.len();
            limiter.prune();
            tracing::debug!(before, after = limiter.len(), "Pruned rate limiter");
        }
    });
}

pub async fn limit_by_client(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.rate_limiter.check(&client) {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    Ok(next.run(request).await)
}
