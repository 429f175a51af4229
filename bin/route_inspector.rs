//! # Route Inspector
//!
//! Diagnostic CLI: resolves a token pair, prints the candidate pool set the generator
//! would hand to quoting, and prices gas for the best direct pool.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin route_inspector -- \
//!     --token-in 0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2 \
//!     --token-out 0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ethers::prelude::{Http, Middleware, Provider, U256};
use log::{info, warn};
use std::sync::Arc;

use mig_routing_sdk::{
    cache::InMemoryCache,
    candidate_pools::{CandidatePoolGenerator, SelectionReason},
    chains::ChainRegistry,
    gas_model::{l2, GasModelContext, GasModelFactory, HeuristicGasModelFactory},
    multicall::{BatchCaller, Multicall},
    pool_provider::{OnChainV2PoolProvider, OnChainV3PoolProvider, V2PoolProvider, V3PoolProvider},
    pools::{FeeAmount, Pool},
    router::{QuotedRoute, Route},
    settings::Settings,
    token_provider::{CachingTokenProvider, OnChainTokenProvider},
    types::{CurrencyAmount, Token},
};

#[derive(Parser, Debug)]
#[command(name = "route_inspector", about = "Inspect candidate pools and gas costs for a token pair")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Chain id; defaults to `chain.chain_id` from the configuration
    #[arg(long)]
    chain_id: Option<u64>,

    #[arg(long)]
    token_in: String,

    #[arg(long)]
    token_out: String,

    /// Gas price override in gwei; otherwise read from the node
    #[arg(long)]
    gas_price_gwei: Option<u64>,

    /// Print the candidate pool set as JSON and exit
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let settings = Settings::from_path(&args.config).context("Failed to load settings")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log.level)).init();

    let chain_id = args.chain_id.unwrap_or(settings.chain.chain_id);
    let registry = Arc::new(ChainRegistry::from_settings(&settings)?);
    let chain = registry.get(chain_id)?;
    let protocols = settings.protocols().map_err(|e| anyhow!(e))?;
    info!("Inspecting chain {} ({}) with protocols {:?}", chain.name, chain_id, protocols);

    let provider = Arc::new(Provider::<Http>::try_from(settings.rpc.http_url.as_str())?);
    let caller: Arc<dyn BatchCaller> = Arc::new(Multicall::from_settings(
        provider.clone(),
        chain.multicall,
        &settings.multicall,
    ));

    // 1. Tokens
    let token_cache = Arc::new(InMemoryCache::<Token>::new("token", settings.token_cache.max_entries));
    let resolver = CachingTokenProvider::new(
        chain.clone(),
        token_cache,
        Arc::new(OnChainTokenProvider::new(chain_id, caller.clone())),
        Vec::new(),
    );
    let tokens = resolver
        .get_tokens_by_str(&[args.token_in.as_str(), args.token_out.as_str()], None)
        .await?;
    let token_in = tokens
        .get_token_by_address(&args.token_in)
        .cloned()
        .ok_or_else(|| anyhow!("Could not resolve token {}", args.token_in))?;
    let token_out = tokens
        .get_token_by_address(&args.token_out)
        .cloned()
        .ok_or_else(|| anyhow!("Could not resolve token {}", args.token_out))?;
    println!("Token in:  {} ({} decimals)", token_in, token_in.decimals);
    println!("Token out: {} ({} decimals)", token_out, token_out.decimals);

    // 2. Candidate pools
    let v3_provider: Arc<dyn V3PoolProvider> = Arc::new(OnChainV3PoolProvider::new(chain.clone(), caller.clone()));
    let v2_provider: Arc<dyn V2PoolProvider> = Arc::new(OnChainV2PoolProvider::new(chain.clone(), caller.clone()));
    let generator = CandidatePoolGenerator::new(registry.clone())
        .with_v3_pool_provider(chain_id, v3_provider.clone())
        .with_protocols(&protocols);
    let candidates = generator.generate(chain_id, Some(&token_in), Some(&token_out)).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }
    println!("\n{} candidate pools", candidates.len());
    for reason in [
        SelectionReason::Direct,
        SelectionReason::TokenInBase,
        SelectionReason::TokenOutBase,
        SelectionReason::BaseBase,
    ] {
        let pools = candidates.by_reason(reason);
        println!("  {:<16} {}", reason.to_string(), pools.len());
        for candidate in pools.iter().take(5) {
            let fee = candidate
                .pool
                .fee_tier
                .map(|f| f.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    [{}] {} fee {} liquidity {}",
                candidate.pool.protocol, candidate.pool.id, fee, candidate.pool.liquidity
            );
        }
    }

    // 3. Gas model
    let gas_price_wei = match args.gas_price_gwei {
        Some(gwei) => U256::from(gwei) * U256::exp10(9),
        None => provider.get_gas_price().await.context("Failed to read gas price")?,
    };
    let ctx = GasModelContext {
        chain: chain.clone(),
        gas_price_wei,
        quote_token: token_out.clone(),
        v3_pool_provider: v3_provider.clone(),
        v2_pool_provider: Some(v2_provider.clone()),
        l2_gas_data_provider: chain.layered.map(|kind| l2::provider_for(kind, caller.clone())),
        block: None,
    };
    let gas_model = HeuristicGasModelFactory::new().build_gas_model(&ctx).await?;

    let direct = match best_direct_pool(&v3_provider, &v2_provider, &token_in, &token_out).await? {
        Some(pool) => pool,
        None => {
            warn!("No direct pool for {} / {}", token_in.symbol, token_out.symbol);
            println!("\nNo direct pool; gas estimate skipped");
            return Ok(());
        }
    };
    let one = U256::exp10(token_in.decimals as usize);
    let quote = direct.convert_amount(&token_in, one).unwrap_or_default();
    let quoted = QuotedRoute {
        route: Route::new(vec![direct], token_in.clone(), token_out.clone())?,
        amount: CurrencyAmount::new(token_in.clone(), one),
        quote: CurrencyAmount::new(token_out.clone(), quote),
        percent: 100.0,
        initialized_ticks_crossed: 1,
        uninitialized_ticks_crossed: 0,
    };
    let estimate = gas_model.estimate_cost(&quoted);
    println!("\nDirect route {}", quoted.route);
    println!("  mid-price quote   {}", quoted.quote);
    println!("  gas units         {}", estimate.gas_units);
    println!("  cost (native)     {}", estimate.cost_in_native);
    println!("  cost (quote)      {}", estimate.cost_in_quote_token);
    println!("  cost (usd)        {}", estimate.cost_in_fiat);
    if let Some(l1) = gas_model.aggregate_layered_chain_fees(std::slice::from_ref(&quoted)) {
        println!("  l1 data gas       {}", l1.l1_gas_used);
        println!("  l1 fee (native)   {}", l1.fee_in_native);
        println!("  l1 fee (quote)    {}", l1.fee_in_quote_token);
    }

    Ok(())
}

async fn best_direct_pool(
    v3: &Arc<dyn V3PoolProvider>,
    v2: &Arc<dyn V2PoolProvider>,
    a: &Token,
    b: &Token,
) -> Result<Option<Pool>> {
    let pairs: Vec<_> = FeeAmount::ALL.iter().map(|fee| (a.clone(), b.clone(), *fee)).collect();
    let v3_pools = v3.get_pools(&pairs, None).await?;
    let best_v3 = v3_pools
        .get_all_pools()
        .into_iter()
        .max_by_key(|p| p.liquidity)
        .cloned();
    if let Some(pool) = best_v3 {
        return Ok(Some(Pool::V3(pool)));
    }
    let v2_pools = v2.get_pools(&[(a.clone(), b.clone())], None).await?;
    Ok(v2_pools.get_pool(a, b).cloned().map(Pool::V2))
}
