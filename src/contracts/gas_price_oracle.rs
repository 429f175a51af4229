use ethers::prelude::abigen;

// OP-stack predeploy at 0x420000000000000000000000000000000000000F
abigen!(
    GasPriceOracle,
    r#"[
        function l1BaseFee() external view returns (uint256)
        function scalar() external view returns (uint256)
        function decimals() external view returns (uint256)
        function overhead() external view returns (uint256)
    ]"#
);
