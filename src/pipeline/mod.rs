//! Pipeline orchestration
//!
//! Wires the security filter and the rate limiter, in that strict order,
//! around every route of a wrapped router. The security stage is the
//! outermost layer: it inspects before any quota is consumed, and its
//! hardening headers cover denials from both stages.

use crate::client_ip::ClientIpResolver;
use crate::config::{GuardConfig, StoreBackend};
use crate::error::Result;
use crate::rate_limit::{
    rate_limit_middleware, CounterStore, MemoryCounterStore, RateLimitState, RateLimiter,
    RedisCounterStore,
};
use crate::security::{
    security_middleware, ResponseHardening, SecurityFilter, SecurityState,
};
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The assembled defense pipeline
#[derive(Clone)]
pub struct DefensePipeline {
    security: SecurityState,
    rate_limit: RateLimitState,
}

impl DefensePipeline {
    /// Build the pipeline from validated configuration, connecting to the
    /// shared counter store when one is selected. An unreachable Redis at
    /// startup degrades to the memory backend with a warning, matching the
    /// restart-only config lifecycle; runtime store failures are handled by
    /// each bucket's fail mode.
    pub async fn from_config(config: &GuardConfig) -> Result<Self> {
        let store = build_store(config).await?;

        let resolver = Arc::new(ClientIpResolver::new(
            config.proxy.enable_proxy_headers,
            &config.proxy.trusted_proxies,
        )?);

        let limiter = Arc::new(RateLimiter::new(
            config.rate_limiting.buckets.clone(),
            store,
        )?);

        let filter = Arc::new(SecurityFilter::new(&config.security)?);
        let hardening = Arc::new(ResponseHardening::new(&config.security));

        Ok(Self {
            security: SecurityState { filter, hardening },
            rate_limit: RateLimitState { limiter, resolver },
        })
    }

    /// Build a pipeline over an explicit store and limiter, for tests and
    /// embedders that manage their own backends.
    pub fn with_parts(security: SecurityState, rate_limit: RateLimitState) -> Self {
        Self {
            security,
            rate_limit,
        }
    }

    /// Wrap a router so every request passes security filtering first, then
    /// rate limiting, before reaching its handler.
    pub fn apply(&self, router: Router) -> Router {
        // Layers run outermost-last-added: rate limiting goes on first so the
        // security stage wraps it and always executes before any increment.
        router
            .layer(middleware::from_fn_with_state(
                self.rate_limit.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.security.clone(),
                security_middleware,
            ))
    }
}

async fn build_store(config: &GuardConfig) -> Result<Arc<dyn CounterStore>> {
    match config.rate_limiting.backend {
        StoreBackend::Memory => {
            info!("rate limiter: using in-memory counter store");
            Ok(Arc::new(MemoryCounterStore::new()))
        }
        StoreBackend::Redis => {
            let timeout = Duration::from_millis(config.rate_limiting.store_timeout_ms);
            match RedisCounterStore::new(&config.rate_limiting.redis_url, timeout).await {
                Ok(store) => match store.ping().await {
                    Ok(_) => {
                        info!("rate limiter: using Redis counter store");
                        Ok(Arc::new(store))
                    }
                    Err(e) => {
                        warn!(
                            "rate limiter: Redis ping failed ({}), falling back to memory store",
                            e
                        );
                        Ok(Arc::new(MemoryCounterStore::new()))
                    }
                },
                Err(e) => {
                    warn!(
                        "rate limiter: Redis unavailable ({}), falling back to memory store",
                        e
                    );
                    Ok(Arc::new(MemoryCounterStore::new()))
                }
            }
        }
    }
}
