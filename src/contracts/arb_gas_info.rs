use ethers::prelude::abigen;

// Arbitrum precompile at 0x000000000000000000000000000000000000006C
abigen!(
    ArbGasInfo,
    r#"[
        function getPricesInWei() external view returns (uint256, uint256, uint256, uint256, uint256, uint256)
    ]"#
);
