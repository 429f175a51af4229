// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers descriptions for every metric the router emits. Call once at startup.
pub fn describe_metrics() {
    describe_counter!("cache_hits_total", Unit::Count, "Cache hits, labeled by cache.");
    describe_counter!("cache_miss_total", Unit::Count, "Cache misses, labeled by cache.");
    describe_gauge!("cache_size_gauge", "Current entry count, labeled by cache.");
    describe_histogram!("multicall_batch_size_bucket", "Calls per aggregate3 request.");
    describe_counter!(
        "tokens_resolved_total",
        Unit::Count,
        "Tokens resolved, labeled by tier (cache, primary, fallback)."
    );
    describe_counter!(
        "tokens_dropped_total",
        Unit::Count,
        "Tokens dropped during metadata validation, labeled by reason."
    );
    describe_counter!(
        "candidate_pools_total",
        Unit::Count,
        "Candidate pools emitted, labeled by protocol and selection reason."
    );
    describe_counter!(
        "candidate_pools_missing_total",
        Unit::Count,
        "V3 candidates excluded because no live pool was found."
    );
    describe_counter!("gas_models_built_total", Unit::Count, "Gas models built, labeled by chain.");
    describe_counter!(
        "gas_model_conversion_missing_total",
        Unit::Count,
        "Gas models built without a conversion pool, labeled by target."
    );
    describe_counter!(
        "route_cache_lookups_total",
        Unit::Count,
        "Cached plan lookups, labeled by outcome (hit, miss, error)."
    );
    describe_counter!("route_cache_writes_total", Unit::Count, "Cached plans written.");
}

/// Installs the Prometheus recorder with an HTTP scrape endpoint. Needs a tokio runtime.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    describe_metrics();
    Ok(())
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn set_cache_size(cache_name: &str, size: f64) {
    gauge!("cache_size_gauge", size, "cache" => cache_name.to_string());
}

pub fn record_multicall_batch_size(size: f64) {
    histogram!("multicall_batch_size_bucket", size);
}

pub fn increment_tokens_resolved(tier: &str, count: usize) {
    counter!("tokens_resolved_total", count as u64, "tier" => tier.to_string());
}

pub fn increment_tokens_dropped(reason: &str) {
    counter!("tokens_dropped_total", 1, "reason" => reason.to_string());
}

pub fn increment_candidate_pools(protocol: &str, reason: &str, count: usize) {
    counter!(
        "candidate_pools_total",
        count as u64,
        "protocol" => protocol.to_string(),
        "reason" => reason.to_string()
    );
}

pub fn increment_candidate_pools_missing(count: usize) {
    counter!("candidate_pools_missing_total", count as u64);
}

pub fn increment_gas_model_built(chain_id: u64) {
    counter!("gas_models_built_total", 1, "chain" => chain_id.to_string());
}

pub fn increment_gas_model_conversion_missing(target: &str) {
    counter!("gas_model_conversion_missing_total", 1, "target" => target.to_string());
}

pub fn increment_route_cache_lookup(outcome: &str) {
    counter!("route_cache_lookups_total", 1, "outcome" => outcome.to_string());
}

pub fn increment_route_cache_write() {
    counter!("route_cache_writes_total", 1);
}
