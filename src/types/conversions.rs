use ethers::types::{Address, H256, U256};
use log::warn;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

// Human-readable amounts for logs and fiat reporting
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    let value_str = value.to_string();
    let mut decimal_value = Decimal::from_str(&value_str)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;

    // Integer input has scale 0, so the mantissa is the raw amount
    decimal_value
        .set_scale(decimals as u32)
        .map_err(|_| ConversionError::Overflow)?;
    Ok(decimal_value)
}

/// Canonical lowercase `0x`-prefixed form used for cache keys and logs.
pub fn address_to_string(addr: Address) -> String {
    format!("{:#x}", addr)
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

pub fn string_to_h256(s: &str) -> Result<H256, ConversionError> {
    let normalized = s.trim().trim_start_matches("0x");
    let bytes = hex::decode(normalized).map_err(|e| ConversionError::InvalidHash(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ConversionError::InvalidHash(format!(
            "expected 32 bytes, got {} (value: {})",
            bytes.len(),
            s
        )));
    }
    Ok(H256::from_slice(&bytes))
}

/// Parses, lowercases and deduplicates requested addresses, keeping first-seen order.
///
/// Inputs that are not valid addresses are dropped with a warning; a bad entry never
/// poisons the rest of the request.
pub fn normalize_addresses<S: AsRef<str>>(inputs: &[S]) -> Vec<Address> {
    let mut seen: HashSet<Address> = HashSet::with_capacity(inputs.len());
    let mut out = Vec::with_capacity(inputs.len());
    for raw in inputs {
        match string_to_address(&raw.as_ref().to_lowercase()) {
            Ok(addr) => {
                if seen.insert(addr) {
                    out.push(addr);
                }
            }
            Err(e) => warn!("Dropping unparsable token address '{}': {}", raw.as_ref(), e),
        }
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dedupes_mixed_case_and_drops_garbage() {
        let inputs = [
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "not-an-address",
            "0x6B175474E89094C44Da98b954EedeAC495271d0F",
        ];
        let out = normalize_addresses(&inputs);
        assert_eq!(out.len(), 2);
        assert_eq!(
            address_to_string(out[0]),
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
    }

    #[test]
    fn decimal_scaling() {
        let raw = U256::from(1_500_000u64);
        let d = u256_to_decimal(raw, 6).unwrap();
        assert_eq!(d, Decimal::from_str("1.5").unwrap());
    }

    #[test]
    fn h256_requires_32_bytes() {
        assert!(string_to_h256("0x1234").is_err());
        assert!(string_to_h256(
            "0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"
        )
        .is_ok());
    }
}
