//! # Route Cache
//!
//! Stores previously discovered split plans so later requests for the same pair can start
//! from a known-good candidate instead of a full discovery pass.
//!
//! The key is (chain, token in, token out, protocol set, trade type). It deliberately
//! leaves out the trade amount: one plan serves a band of similar amounts. A cached plan
//! is only a starting candidate and must be re-quoted against live state before use.
//! Expiry is left to the storage engine ([`InMemoryCache::with_ttl`] or Redis `SET EX`).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ethers::types::{Address, U256};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, InMemoryCache};
use crate::metrics;
use crate::pools::Protocol;
use crate::router::{Route, ScoredRoute, TradeType};
use crate::settings::RouteCacheSettings;
use crate::types::conversions::address_to_string;
use crate::types::{CurrencyAmount, Token};

const PERCENT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouteCacheError {
    #[error("Cached plan has no legs")]
    EmptyPlan,
    #[error("Leg {index} has percent {percent}, expected a value in (0, 100]")]
    InvalidPercent { index: usize, percent: f64 },
    #[error("Leg {index} routes {actual}, plan routes {expected}")]
    LegMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("Leg percents sum to {0}, expected 100")]
    PercentSum(f64),
}

/// One leg of a possibly split plan. Not validated on its own; see [`CachedRoutes::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRouteLeg {
    pub route: Route,
    pub percent: f64,
}

impl CachedRouteLeg {
    pub fn new(route: Route, percent: f64) -> Self {
        Self { route, percent }
    }

    pub fn protocol(&self) -> Protocol {
        self.route.protocol()
    }

    pub fn token_in(&self) -> &Token {
        self.route.input()
    }

    pub fn token_out(&self) -> &Token {
        self.route.output()
    }
}

/// Amount-independent cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteCacheKey {
    pub chain_id: u64,
    pub token_in: Address,
    pub token_out: Address,
    pub protocols: BTreeSet<Protocol>,
    pub trade_type: TradeType,
}

impl RouteCacheKey {
    pub fn new(
        chain_id: u64,
        token_in: &Token,
        token_out: &Token,
        protocols: &[Protocol],
        trade_type: TradeType,
    ) -> Self {
        Self {
            chain_id,
            token_in: token_in.address,
            token_out: token_out.address,
            protocols: protocols.iter().copied().collect(),
            trade_type,
        }
    }
}

impl std::fmt::Display for RouteCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocols: Vec<String> = self.protocols.iter().map(|p| p.to_string()).collect();
        write!(
            f,
            "route-{}-{}-{}-{}-{}",
            self.chain_id,
            address_to_string(self.token_in),
            address_to_string(self.token_out),
            protocols.join(","),
            self.trade_type
        )
    }
}

/// A validated split plan with the metadata it was discovered under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRoutes {
    legs: Vec<CachedRouteLeg>,
    pub chain_id: u64,
    pub token_in: Token,
    pub token_out: Token,
    pub protocols_covered: BTreeSet<Protocol>,
    pub trade_type: TradeType,
    pub block_number: u64,
    /// Amount the plan was originally discovered for. Informational only.
    pub original_amount: CurrencyAmount,
    pub cached_at: DateTime<Utc>,
}

impl CachedRoutes {
    /// Rejects empty plans, legs outside (0, 100], legs that do not connect `token_in`
    /// to `token_out`, and plans whose percents do not sum to 100.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        legs: Vec<CachedRouteLeg>,
        chain_id: u64,
        token_in: Token,
        token_out: Token,
        protocols_covered: BTreeSet<Protocol>,
        trade_type: TradeType,
        block_number: u64,
        original_amount: CurrencyAmount,
    ) -> Result<Self, RouteCacheError> {
        if legs.is_empty() {
            return Err(RouteCacheError::EmptyPlan);
        }
        let expected = format!("{} -> {}", token_in, token_out);
        for (index, leg) in legs.iter().enumerate() {
            if !(leg.percent > 0.0 && leg.percent <= 100.0) {
                return Err(RouteCacheError::InvalidPercent {
                    index,
                    percent: leg.percent,
                });
            }
            if *leg.token_in() != token_in || *leg.token_out() != token_out {
                return Err(RouteCacheError::LegMismatch {
                    index,
                    expected,
                    actual: format!("{} -> {}", leg.token_in(), leg.token_out()),
                });
            }
        }
        let total: f64 = legs.iter().map(|l| l.percent).sum();
        if (total - 100.0).abs() > PERCENT_TOLERANCE {
            return Err(RouteCacheError::PercentSum(total));
        }

        Ok(Self {
            legs,
            chain_id,
            token_in,
            token_out,
            protocols_covered,
            trade_type,
            block_number,
            original_amount,
            cached_at: Utc::now(),
        })
    }

    /// Builds a plan from the scored legs the orchestrator settled on.
    pub fn from_scored(
        scored: &[ScoredRoute],
        chain_id: u64,
        protocols_covered: &[Protocol],
        block_number: u64,
    ) -> Result<Self, RouteCacheError> {
        let first = scored.first().ok_or(RouteCacheError::EmptyPlan)?;
        let trade_type = first.trade_type;
        let token_in = first.quoted.route.input().clone();
        let token_out = first.quoted.route.output().clone();
        let total = scored
            .iter()
            .fold(U256::zero(), |acc, s| acc.saturating_add(s.quoted.amount.raw));
        let original_amount = CurrencyAmount::new(first.quoted.amount.token.clone(), total);
        let legs = scored
            .iter()
            .map(|s| CachedRouteLeg::new(s.quoted.route.clone(), s.quoted.percent))
            .collect();
        Self::new(
            legs,
            chain_id,
            token_in,
            token_out,
            protocols_covered.iter().copied().collect(),
            trade_type,
            block_number,
            original_amount,
        )
    }

    pub fn legs(&self) -> &[CachedRouteLeg] {
        &self.legs
    }

    pub fn key(&self) -> RouteCacheKey {
        RouteCacheKey {
            chain_id: self.chain_id,
            token_in: self.token_in.address,
            token_out: self.token_out.address,
            protocols: self.protocols_covered.clone(),
            trade_type: self.trade_type,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.cached_at
    }

    /// Protocols actually used by the legs, which may be narrower than `protocols_covered`.
    pub fn protocols_used(&self) -> BTreeSet<Protocol> {
        self.legs.iter().map(|l| l.protocol()).collect()
    }
}

#[async_trait]
pub trait RouteCache: Send + Sync {
    async fn get_cached_route(&self, key: &RouteCacheKey) -> Result<Option<CachedRoutes>>;

    async fn set_cached_route(&self, routes: &CachedRoutes) -> Result<()>;
}

/// Route cache over any [`Cache`] engine.
#[derive(Clone)]
pub struct CachingRouteStore {
    cache: Arc<dyn Cache<CachedRoutes>>,
}

impl CachingRouteStore {
    pub fn new(cache: Arc<dyn Cache<CachedRoutes>>) -> Self {
        Self { cache }
    }

    /// In-process store sized and expired per settings.
    pub fn in_memory(settings: &RouteCacheSettings) -> Self {
        let cache = InMemoryCache::new("route", settings.max_entries)
            .with_ttl(Duration::from_secs(settings.ttl_seconds.max(1)));
        Self::new(Arc::new(cache))
    }

    /// Redis-backed store when `redis_url` is configured, in-process otherwise.
    #[cfg(feature = "redis")]
    pub async fn from_settings(settings: &RouteCacheSettings) -> Result<Self> {
        match &settings.redis_url {
            Some(url) => {
                let cache =
                    crate::redis_cache::RedisCache::<CachedRoutes>::connect(url, "route", settings.ttl_seconds)
                        .await?;
                Ok(Self::new(Arc::new(cache)))
            }
            None => Ok(Self::in_memory(settings)),
        }
    }

    #[cfg(not(feature = "redis"))]
    pub async fn from_settings(settings: &RouteCacheSettings) -> Result<Self> {
        if settings.redis_url.is_some() {
            log::warn!("route_cache.redis_url is set but the redis feature is disabled; using in-memory cache");
        }
        Ok(Self::in_memory(settings))
    }
}

#[async_trait]
impl RouteCache for CachingRouteStore {
    async fn get_cached_route(&self, key: &RouteCacheKey) -> Result<Option<CachedRoutes>> {
        let cache_key = key.to_string();
        match self.cache.get(&cache_key).await {
            Ok(Some(routes)) => {
                debug!("Route cache hit for {} ({} legs)", cache_key, routes.legs.len());
                metrics::increment_route_cache_lookup("hit");
                Ok(Some(routes))
            }
            Ok(None) => {
                metrics::increment_route_cache_lookup("miss");
                Ok(None)
            }
            Err(e) => {
                metrics::increment_route_cache_lookup("error");
                Err(e)
            }
        }
    }

    async fn set_cached_route(&self, routes: &CachedRoutes) -> Result<()> {
        let cache_key = routes.key().to_string();
        self.cache.set(&cache_key, routes.clone()).await?;
        metrics::increment_route_cache_write();
        info!(
            "Cached {}-leg plan {} at block {}",
            routes.legs.len(),
            cache_key,
            routes.block_number
        );
        Ok(())
    }
}
