//! Per-owner fixed-window limiter for the dynamic endpoints.
//!
//! The window size and per-plan limits come from `api` config. Only
//! responses below 400 are counted, so failed requests never use up quota.

use async_trait::async_trait;
use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::access_token::DynamicOwner;
use crate::config::{self, ApiConfig};
use crate::services::{ServiceError, UserService};

/// Source of an owner's subscription plan
#[async_trait]
pub trait PlanLookup: Send + Sync {
    /// `Ok(None)` when the owner does not exist
    async fn plan_for(&self, owner_id: Uuid) -> Result<Option<String>, ServiceError>;
}

/// Reads `users.plan` from the platform database
pub struct DatabasePlanLookup;

#[async_trait]
impl PlanLookup for DatabasePlanLookup {
    async fn plan_for(&self, owner_id: Uuid) -> Result<Option<String>, ServiceError> {
        UserService::new().await?.plan_for(owner_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { limit: u32, used: u32, reset_secs: u64 },
    Limited { limit: u32, reset_secs: u64 },
}

struct Window {
    started: Instant,
    count: u32,
}

struct CachedLimit {
    limit: u32,
    fetched: Instant,
}

pub struct RateLimiter {
    lookup: Arc<dyn PlanLookup>,
    settings: ApiConfig,
    windows: Mutex<HashMap<Uuid, Window>>,
    limits: Mutex<HashMap<Uuid, CachedLimit>>,
}

impl RateLimiter {
    pub fn new(lookup: Arc<dyn PlanLookup>, settings: ApiConfig) -> Self {
        Self {
            lookup,
            settings,
            windows: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static RateLimiter {
        static INSTANCE: OnceLock<RateLimiter> = OnceLock::new();
        INSTANCE.get_or_init(|| RateLimiter::new(Arc::new(DatabasePlanLookup), config::config().api.clone()))
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.settings.rate_limit_window_secs)
    }

    fn plan_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.plan_cache_ttl_secs)
    }

    /// Requests per window for the owner, `None` when the plan cannot be read
    pub async fn limit_for(&self, owner_id: Uuid) -> Option<u32> {
        {
            let limits = self.limits.lock().await;
            if let Some(cached) = limits.get(&owner_id).filter(|c| c.fetched.elapsed() < self.plan_ttl()) {
                return Some(cached.limit);
            }
        }

        let limit = match self.lookup.plan_for(owner_id).await {
            Ok(Some(plan)) => self.settings.limit_for_plan(&plan),
            Ok(None) => self.settings.unknown_owner_limit,
            Err(e) => {
                warn!("Plan lookup failed for {}; allowing request: {}", owner_id, e);
                return None;
            }
        };

        self.limits.lock().await.insert(
            owner_id,
            CachedLimit {
                limit,
                fetched: Instant::now(),
            },
        );
        Some(limit)
    }

    /// Decide whether the next request may run; `None` means fail open
    pub async fn check(&self, owner_id: Uuid) -> Option<Decision> {
        let limit = self.limit_for(owner_id).await?;
        let window = self.window();

        let mut windows = self.windows.lock().await;
        let entry = windows.entry(owner_id).or_insert_with(|| Window {
            started: Instant::now(),
            count: 0,
        });
        if entry.started.elapsed() >= window {
            entry.started = Instant::now();
            entry.count = 0;
        }
        let reset_secs = window.saturating_sub(entry.started.elapsed()).as_secs();

        Some(if entry.count >= limit {
            Decision::Limited { limit, reset_secs }
        } else {
            Decision::Allowed {
                limit,
                used: entry.count,
                reset_secs,
            }
        })
    }

    /// Count a successful request; returns the new usage
    pub async fn record(&self, owner_id: Uuid) -> u32 {
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(owner_id).or_insert_with(|| Window {
            started: Instant::now(),
            count: 0,
        });
        entry.count = entry.count.saturating_add(1);
        entry.count
    }

    /// Drop expired windows and stale plan entries
    pub async fn sweep(&self) -> usize {
        let window = self.window();
        let ttl = self.plan_ttl();

        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| w.started.elapsed() < window);
        let removed = before - windows.len();
        drop(windows);

        self.limits.lock().await.retain(|_, c| c.fetched.elapsed() < ttl);
        removed
    }
}

pub fn spawn_sweeper(interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = RateLimiter::global().sweep().await;
            debug!("Rate limit sweep removed {} windows", removed);
        }
    })
}

fn set_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    headers.insert("ratelimit-limit", HeaderValue::from(limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_secs));
}

pub fn limited_response(limit: u32, reset_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "success": false,
            "message": format!("You've exceeded your {} requests limit for today.", limit),
            "limit": limit,
            "remaining": 0
        })),
    )
        .into_response();
    set_headers(response.headers_mut(), limit, 0, reset_secs);
    response
}

pub async fn rate_limit_middleware(
    Extension(owner): Extension<DynamicOwner>,
    request: Request,
    next: Next,
) -> Response {
    if !config::config().api.enable_rate_limiting {
        return next.run(request).await;
    }
    enforce(RateLimiter::global(), owner.0, request, next).await
}

async fn enforce(limiter: &RateLimiter, owner_id: Uuid, request: Request, next: Next) -> Response {
    match limiter.check(owner_id).await {
        None => next.run(request).await,
        Some(Decision::Limited { limit, reset_secs }) => limited_response(limit, reset_secs),
        Some(Decision::Allowed { limit, used, reset_secs }) => {
            let mut response = next.run(request).await;
            let used = if response.status().as_u16() < 400 {
                limiter.record(owner_id).await
            } else {
                used
            };
            set_headers(response.headers_mut(), limit, limit.saturating_sub(used), reset_secs);
            response
        }
    }
}
