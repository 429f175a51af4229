//! # MIG Routing SDK
//!
//! The discovery and scoring core of a smart order router for Uniswap V2/V3-style
//! liquidity. Given a chain and a token pair it resolves token metadata, proposes candidate
//! pools, prices gas for every candidate route, and remembers winning split plans.
//!
//! ## Overview
//!
//! - **Chain Registry**: immutable per-chain configuration (wrapped native token, curated
//!   base tokens, protocol deployments, gas constants, rollup kind).
//! - **Token Resolver**: cache first, then one batched on-chain lookup, then optional
//!   fallback resolvers. Tokens that fail validation are dropped, never fatal.
//! - **Candidate Pool Generator**: base × base and pair × base expansion with CREATE2
//!   address derivation; V3 candidates are confirmed against live state.
//! - **Gas Model Factory**: one asynchronous build per request, then a synchronous
//!   per-route estimate in native, quote and USD terms, plus rollup L1 data fees.
//! - **Route Cache**: amount-independent storage of split plans.
//!
//! ## Data flow
//!
//! ```text
//! ChainRegistry ─► TokenProvider ─► CandidatePoolGenerator ─► (external quoting)
//!                                                               │
//!                        RouteCache ◄── select_best ◄── score_routes(GasModel)
//! ```
//!
//! Quote simulation and the orchestrator that drives these stages live outside this crate.

// Configuration
/// Configuration management
pub mod settings;
/// Chain registry and built-in chain data
pub mod chains;

// Core Types
/// Tokens, amounts and conversions
pub mod types;
/// Pool types and deterministic pool addresses
pub mod pools;
/// Routes, quoted routes and scoring
pub mod router;

// Contracts (Public ABIs Only)
/// Smart contract ABIs (read-only)
pub mod contracts;

// Infrastructure
/// Multicall3 batch RPC utilities
pub mod multicall;
/// Cache contract and in-memory engine
pub mod cache;
/// Redis cache engine (feature-gated)
#[cfg(feature = "redis")]
pub mod redis_cache;
/// Metrics and observability
pub mod metrics;

// Routing Core
/// Token metadata resolution
pub mod token_provider;
/// On-chain pool state providers
pub mod pool_provider;
/// Candidate pool generation
pub mod candidate_pools;
/// Gas models
pub mod gas_model;
/// Split plan caching
pub mod route_cache;

// Re-exports for convenience
pub use candidate_pools::{CandidatePoolGenerator, CandidatePoolSet, PoolIndexProvider};
pub use chains::{ChainConfig, ChainRegistry, ChainRegistryError};
pub use gas_model::{GasCostEstimate, GasModel, GasModelFactory, HeuristicGasModelFactory};
pub use pools::{Pool, Protocol};
pub use route_cache::{CachedRouteLeg, CachedRoutes, CachingRouteStore, RouteCache, RouteCacheKey};
pub use router::{select_best, GetRoutesResult, QuotedRoute, Route, ScoredRoute, TradeType};
pub use settings::Settings;
pub use token_provider::{CachingTokenProvider, OnChainTokenProvider, TokenProvider};
pub use types::{CurrencyAmount, Token, TokenAccessor};
