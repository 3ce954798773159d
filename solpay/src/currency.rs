//! Supported checkout currencies.
//!
//! Currency is a closed enum rather than a string-keyed table so that adding
//! a new currency is a compile-time-checked change: every `match` over
//! [`Currency`] must be extended, including the per-cluster mint tables in
//! [`crate::networks`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A currency a checkout can be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Native SOL, denominated in lamports (9 decimals).
    Sol,
    /// Circle USDC (SPL Token, 6 decimals).
    Usdc,
    /// Tether USDT (SPL Token, 6 decimals).
    Usdt,
}

impl Currency {
    /// Decimal precision of the currency's base unit.
    #[must_use]
    pub const fn decimals(self) -> u8 {
        match self {
            Self::Sol => 9,
            Self::Usdc | Self::Usdt => 6,
        }
    }

    /// Whether this is the native coin (no mint, no holding accounts).
    #[must_use]
    pub const fn is_native(self) -> bool {
        matches!(self, Self::Sol)
    }

    /// Canonical ticker symbol.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Sol => "SOL",
            Self::Usdc => "USDC",
            Self::Usdt => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when parsing an unknown currency code.
#[derive(Debug, thiserror::Error)]
#[error("unknown currency code: {0}")]
pub struct CurrencyParseError(String);

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SOL" => Ok(Self::Sol),
            "USDC" => Ok(Self::Usdc),
            "USDT" => Ok(Self::Usdt),
            _ => Err(CurrencyParseError(s.to_owned())),
        }
    }
}
