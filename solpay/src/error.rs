//! The payment error taxonomy.
//!
//! Every failure the engine can surface is one of the variants of
//! [`PaymentError`]. Builder failures are synchronous and typed; mid-flight
//! failures from the RPC provider arrive as free-form message strings and
//! are translated into the taxonomy by [`classify`], a total mapping whose
//! fallthrough is [`PaymentError::Unknown`] carrying the original text.

use std::fmt;

use rust_decimal::Decimal;
use solana_pubkey::Pubkey;

use crate::currency::Currency;
use crate::networks::Cluster;

/// A low-level ledger query failure.
///
/// Carries the provider's message verbatim; callers decide whether to
/// collapse it (existence probes), retry it (poll ticks), or surface it as
/// [`PaymentError::NetworkUnavailable`] (builder reads).
#[derive(Debug, Clone, thiserror::Error)]
#[error("rpc request failed: {0}")]
pub struct RpcError(pub String);

/// Numeric detail for a native-balance shortfall, reported to six decimal
/// places of SOL.
#[derive(Debug, Clone, Copy)]
pub struct NativeShortfall {
    /// Lamports needed: transfer units plus the fee buffer.
    pub required: u64,
    /// Lamports the sender actually holds.
    pub available: u64,
}

impl NativeShortfall {
    fn sol(lamports: u64) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(lamports), 9)
    }
}

impl fmt::Display for NativeShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deficit = self.required.saturating_sub(self.available);
        write!(
            f,
            "insufficient SOL balance: required {:.6}, available {:.6}, short {:.6}",
            Self::sol(self.required),
            Self::sol(self.available),
            Self::sol(deficit),
        )
    }
}

fn native_shortfall_message(shortfall: &Option<NativeShortfall>) -> String {
    shortfall.as_ref().map_or_else(
        || "insufficient SOL balance to cover the transfer and network fee".to_owned(),
        ToString::to_string,
    )
}

fn token_available(available: &u64, decimals: &u8) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(*available), u32::from(*decimals))
}

/// Failures the checkout engine can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    /// Amount is non-positive, non-finite, or exceeds the unit's granularity.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount converts to fewer base units than the settlement floor.
    #[error("amount too small: {units} base units is below the {floor} unit floor")]
    AmountTooSmall {
        /// Base units the amount converts to.
        units: u64,
        /// Minimum accepted base units.
        floor: u64,
    },

    /// Sender cannot cover the transfer plus the fee buffer.
    ///
    /// Carries numeric detail when raised by the builder; provider-message
    /// classification has no fresh numbers and omits it.
    #[error("{}", native_shortfall_message(.shortfall))]
    InsufficientNativeBalance {
        /// Required/available lamports, when known.
        shortfall: Option<NativeShortfall>,
    },

    /// Currency has no deployment on the selected cluster.
    #[error("{currency} is not supported on {}", .cluster.as_str())]
    UnsupportedCurrency {
        /// Requested currency.
        currency: Currency,
        /// Selected cluster.
        cluster: Cluster,
    },

    /// Sender has no holding account for the token; the builder never
    /// creates one on the sender's behalf.
    #[error("no {mint} token account found for {owner}")]
    TokenAccountMissing {
        /// Owner whose holding account is absent.
        owner: Pubkey,
        /// Token mint.
        mint: Pubkey,
    },

    /// Sender's token balance cannot cover the transfer.
    #[error(
        "insufficient {currency} balance: required {required} base units, available {}",
        token_available(.available, .decimals)
    )]
    InsufficientTokenBalance {
        /// Token currency.
        currency: Currency,
        /// Required base units.
        required: u64,
        /// Available base units.
        available: u64,
        /// Token decimal precision, for the human-readable balance.
        decimals: u8,
    },

    /// A recipient or reference string does not parse as a Solana address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Reference generation failed after internal retries.
    #[error("reference generation failed: {0}")]
    ReferenceGeneration(String),

    /// The poll session exhausted its attempt budget without a match.
    ///
    /// Absence of a detected match is not proof of non-payment; the message
    /// directs the payer to their own transaction history.
    #[error(
        "payment verification timed out after {attempts} checks; this does not mean the payment \
         failed, please check your wallet's transaction history before retrying"
    )]
    PollTimeout {
        /// Ticks performed before giving up.
        attempts: u32,
    },

    /// A transient ledger query failure inside a poll tick; retried, only
    /// surfaced if the attempt budget is exhausted.
    #[error("transient poll error: {0}")]
    PollTransient(String),

    /// The signer declined to sign or the transaction was rejected.
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    /// The ledger endpoint could not be reached or answered incoherently.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Fallback for provider messages outside the known families.
    #[error("payment failed: {0}")]
    Unknown(String),
}

impl From<RpcError> for PaymentError {
    fn from(e: RpcError) -> Self {
        Self::NetworkUnavailable(e.0)
    }
}

/// Translates a low-level provider error message into the taxonomy.
///
/// The mapping is total: every input resolves to some variant, with
/// [`PaymentError::Unknown`] carrying the original text as the fallthrough.
/// Matching is on lowercase substrings of the message families observed
/// from RPC nodes and wallet signers.
#[must_use]
pub fn classify(message: &str) -> PaymentError {
    let lower = message.to_ascii_lowercase();

    if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
        // Covers both plain transfers and "insufficient funds for rent".
        return PaymentError::InsufficientNativeBalance { shortfall: None };
    }
    if lower.contains("user rejected") || lower.contains("rejected") {
        return PaymentError::TransactionRejected(message.to_owned());
    }
    if lower.contains("blockhash not found")
        || lower.contains("block height exceeded")
        || lower.contains("node is behind")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("network")
        || lower.contains("fetch")
    {
        return PaymentError::NetworkUnavailable(message.to_owned());
    }
    PaymentError::Unknown(message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_insufficient_funds_family() {
        let cases = [
            "Transaction simulation failed: insufficient funds for rent",
            "Transfer: insufficient lamports 100, need 200",
            "Insufficient funds",
        ];
        for msg in cases {
            assert!(matches!(
                classify(msg),
                PaymentError::InsufficientNativeBalance { shortfall: None }
            ));
        }
    }

    #[test]
    fn test_classify_rejection() {
        assert!(matches!(
            classify("User rejected the request."),
            PaymentError::TransactionRejected(_)
        ));
        assert!(matches!(
            classify("Transaction rejected by wallet"),
            PaymentError::TransactionRejected(_)
        ));
    }

    #[test]
    fn test_classify_network_family() {
        for msg in [
            "Blockhash not found",
            "block height exceeded",
            "error sending request: connection refused",
            "request timed out",
        ] {
            assert!(matches!(classify(msg), PaymentError::NetworkUnavailable(_)));
        }
    }

    #[test]
    fn test_classify_fallthrough_keeps_original_text() {
        let err = classify("custom program error: 0x1771");
        match err {
            PaymentError::Unknown(text) => assert_eq!(text, "custom program error: 0x1771"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_native_shortfall_reports_six_decimal_places() {
        let err = PaymentError::InsufficientNativeBalance {
            shortfall: Some(NativeShortfall {
                required: 10_010_000,
                available: 2_000_000,
            }),
        };
        let text = err.to_string();
        assert!(text.contains("required 0.010010"), "{text}");
        assert!(text.contains("available 0.002000"), "{text}");
        assert!(text.contains("short 0.008010"), "{text}");
    }

    #[test]
    fn test_token_balance_message_is_human_readable() {
        let err = PaymentError::InsufficientTokenBalance {
            currency: Currency::Usdc,
            required: 2_500_000,
            available: 1_250_000,
            decimals: 6,
        };
        assert!(err.to_string().contains("available 1.250000"), "{err}");
    }

    #[test]
    fn test_poll_timeout_does_not_assert_non_payment() {
        let text = PaymentError::PollTimeout { attempts: 60 }.to_string();
        assert!(text.contains("does not mean the payment failed"), "{text}");
        assert!(text.contains("transaction history"), "{text}");
    }
}
