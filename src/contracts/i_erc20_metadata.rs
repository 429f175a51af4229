use ethers::prelude::abigen;

abigen!(
    IERC20Metadata,
    r#"[
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function name() external view returns (string)
    ]"#
);
