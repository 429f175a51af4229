//! Integration tests for configuration loading
//!
//! Tests cover:
//! - Loading a TOML file from disk
//! - Per-chain deployment overrides flowing into the registry and pool generation

use mig_routing_sdk::candidate_pools::CandidatePoolGenerator;
use mig_routing_sdk::chains::{ChainRegistry, ChainRegistryError, LayeredChainKind, ROLLUX};
use mig_routing_sdk::pools::Protocol;
use mig_routing_sdk::settings::Settings;
use std::io::Write;
use std::sync::Arc;

const CONFIG: &str = r#"
[rpc]
http_url = "https://rpc.rollux.com"

[chain]
chain_id = 570

[multicall]
batch_size = 50

[route_cache]
ttl_seconds = 30

[routing]
protocols = ["v2"]

[chains.570]
name = "Rollux (custom)"
layered = "op-stack"
v2_factory = "0x7Bbbb6abaD521dE677aBe089C85b29e3b2021496"
v2_init_code_hash = "0xe3ef01d2de3b4ba1e9a2fe1ebc8ae6c6b9c9a2de5b3f41bd27d2ed2a4a2b8a6d"
base_swap_cost = 6000
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(CONFIG);
    let settings = Settings::from_path(file.path().to_str().unwrap()).unwrap();

    assert_eq!(settings.chain.chain_id, ROLLUX);
    assert_eq!(settings.multicall.batch_size, 50);
    // untouched fields keep their defaults
    assert_eq!(settings.multicall.timeout_seconds, 3);
    assert_eq!(settings.token_cache.max_entries, 10_000);
    assert_eq!(settings.protocols().unwrap(), vec![Protocol::V2]);
    assert!(settings.chains.contains_key("570"));
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Settings::from_path("/nonexistent/route-sdk-config.toml").is_err());
}

#[tokio::test]
async fn test_chain_override_enables_generation() {
    let settings = Settings::from_toml_str(CONFIG).unwrap();
    let registry = Arc::new(ChainRegistry::from_settings(&settings).unwrap());
    let rollux = registry.get(ROLLUX).unwrap();

    assert_eq!(rollux.name, "Rollux (custom)");
    assert_eq!(rollux.layered, Some(LayeredChainKind::Optimism));
    assert_eq!(rollux.gas_costs.base_swap_cost, 6000);
    assert_eq!(rollux.supported_protocols(), vec![Protocol::V2]);

    let set = CandidatePoolGenerator::new(registry)
        .with_protocols(&settings.protocols().unwrap())
        .generate(ROLLUX, None, None)
        .await
        .unwrap();
    assert_eq!(set.len(), 6);
}

#[test]
fn test_override_for_unknown_chain_is_rejected() {
    let settings = Settings::from_toml_str("[chains.31337]\nname = \"anvil\"\n").unwrap();
    assert!(matches!(
        ChainRegistry::from_settings(&settings),
        Err(ChainRegistryError::UnsupportedChain(31337))
    ));
}

#[test]
fn test_bad_override_is_rejected() {
    let settings = Settings::from_toml_str("[chains.570]\nmulticall = \"not-an-address\"\n").unwrap();
    assert!(matches!(
        ChainRegistry::from_settings(&settings),
        Err(ChainRegistryError::InvalidOverride { .. })
    ));
}
