// Contracts Module - read-only ABIs used by the batched collaborators

pub mod arb_gas_info;
pub mod gas_price_oracle;
pub mod i_erc20_metadata;
pub mod i_uniswap_v2_pair;
pub mod i_uniswap_v3_pool;

pub use arb_gas_info::{ArbGasInfo, ARBGASINFO_ABI};
pub use gas_price_oracle::{GasPriceOracle, GASPRICEORACLE_ABI};
pub use i_erc20_metadata::{IERC20Metadata, IERC20METADATA_ABI};
pub use i_uniswap_v2_pair::{IUniswapV2Pair, IUNISWAPV2PAIR_ABI};
pub use i_uniswap_v3_pool::{IUniswapV3Pool, IUNISWAPV3POOL_ABI};
