//! Value types shared across the routing pipeline.

pub mod conversions;
pub mod token;

pub use conversions::ConversionError;
pub use token::{sort_tokens, CurrencyAmount, Token, TokenAccessor};
