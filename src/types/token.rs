use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::types::conversions::{address_to_string, string_to_address, u256_to_decimal, ConversionError};

/// ERC-20 token metadata resolved for one chain.
///
/// Metadata never changes once deployed, so resolved tokens are cached indefinitely.
/// Two tokens are equal when they live on the same chain at the same address; symbol and
/// decimals do not participate in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub chain_id: u64,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Token {
    pub fn new(chain_id: u64, address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            chain_id,
            address,
            decimals,
            symbol: symbol.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lowercase hex address, the form used in cache keys.
    pub fn address_key(&self) -> String {
        address_to_string(self.address)
    }

    /// EIP-55 display form. Not stored; derived on demand from the canonical address.
    pub fn checksummed_address(&self) -> String {
        to_checksum(&self.address, None)
    }

    /// Canonical pool ordering: the token with the lower address is token0.
    pub fn sorts_before(&self, other: &Token) -> bool {
        self.address < other.address
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.symbol, self.address_key())
    }
}

/// Returns the pair in canonical (token0, token1) order.
pub fn sort_tokens<'a>(a: &'a Token, b: &'a Token) -> (&'a Token, &'a Token) {
    if a.sorts_before(b) {
        (a, b)
    } else {
        (b, a)
    }
}

/// An amount of a token in raw (smallest unit) terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub token: Token,
    pub raw: U256,
}

impl CurrencyAmount {
    pub fn new(token: Token, raw: U256) -> Self {
        Self { token, raw }
    }

    pub fn zero(token: Token) -> Self {
        Self { token, raw: U256::zero() }
    }

    pub fn to_decimal(&self) -> Result<Decimal, ConversionError> {
        u256_to_decimal(self.raw, self.token.decimals)
    }
}

impl std::fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_decimal() {
            Ok(d) => write!(f, "{} {}", d, self.token.symbol),
            Err(_) => write!(f, "{} raw {}", self.raw, self.token.symbol),
        }
    }
}

/// Read-only view over the tokens resolved for a single request.
///
/// Lookups never fail: unknown or unparsable inputs simply return `None`.
#[derive(Debug, Clone, Default)]
pub struct TokenAccessor {
    by_address: HashMap<Address, Token>,
    by_symbol: HashMap<String, Token>,
}

impl TokenAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens<I: IntoIterator<Item = Token>>(tokens: I) -> Self {
        let mut accessor = Self::new();
        for token in tokens {
            accessor.insert(token);
        }
        accessor
    }

    /// Later inserts win on symbol collisions; addresses are unique.
    pub(crate) fn insert(&mut self, token: Token) {
        self.by_symbol
            .insert(token.symbol.to_lowercase(), token.clone());
        self.by_address.insert(token.address, token);
    }

    pub fn get_token_by_address(&self, address: &str) -> Option<&Token> {
        let parsed = string_to_address(&address.to_lowercase()).ok()?;
        self.by_address.get(&parsed)
    }

    pub fn get_token(&self, address: &Address) -> Option<&Token> {
        self.by_address.get(address)
    }

    pub fn get_token_by_symbol(&self, symbol: &str) -> Option<&Token> {
        self.by_symbol.get(&symbol.to_lowercase())
    }

    pub fn get_all_tokens(&self) -> Vec<&Token> {
        self.by_address.values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
