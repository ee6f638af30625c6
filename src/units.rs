use std::fmt;

use alloy_primitives::utils::{format_units, parse_units, UnitsError};
use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("amount must not be empty")]
    Empty,
    #[error("amount {0:?} is negative")]
    Negative(String),
    #[error("invalid amount {input:?}: {source}")]
    Invalid {
        input: String,
        #[source]
        source: UnitsError,
    },
}

/// Human-facing unit of the chain's native currency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayUnit {
    symbol: String,
    decimals: u8,
}

impl DisplayUnit {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Converts a display-unit decimal such as `1.5` into base units.
    pub fn to_base_units(&self, amount: &str) -> Result<U256, AmountError> {
        let trimmed = amount.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        let parsed = parse_units(trimmed, self.decimals).map_err(|source| AmountError::Invalid {
            input: trimmed.to_owned(),
            source,
        })?;
        if parsed.is_negative() {
            return Err(AmountError::Negative(trimmed.to_owned()));
        }
        Ok(parsed.get_absolute())
    }

    /// Renders base units as a display-unit decimal without trailing zeros.
    pub fn format_base_units(&self, amount: U256) -> String {
        match format_units(amount, self.decimals) {
            Ok(rendered) => trim_fraction(rendered),
            Err(_) => amount.to_string(),
        }
    }

    /// Renders base units followed by the unit symbol, e.g. `1 BNB`.
    pub fn display(&self, amount: U256) -> String {
        format!("{} {}", self.format_base_units(amount), self.symbol)
    }
}

impl Default for DisplayUnit {
    fn default() -> Self {
        Self::new("BNB", 18)
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (10^{} base units)", self.symbol, self.decimals)
    }
}

fn trim_fraction(rendered: String) -> String {
    if !rendered.contains('.') {
        return rendered;
    }
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_owned()
}
