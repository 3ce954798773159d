//! Solana Pay URI encoding and parsing.
//!
//! The canonical request URI is
//! `solana:<recipient>?amount=<decimal>[&spl-token=<mint>]&reference=<id>[&label=<text>][&memo=<text>]`
//! with `spl-token` present iff the currency is non-native. The recipient
//! rides in the path, never the query string.

use std::str::FromStr;

use rust_decimal::Decimal;
use solana_pubkey::Pubkey;
use url::form_urlencoded;

use crate::amount;
use crate::error::PaymentError;
use crate::networks::{self, NetworkContext};
use crate::request::PaymentRequest;

/// URI scheme token.
pub const SCHEME: &str = "solana";

/// Encoded length above which some scanners reject the payload.
pub const SCANNER_LENGTH_LIMIT: usize = 2048;

/// Encodes a request into its canonical scannable URI.
///
/// The cluster in `ctx` selects the mint table, so the same request encodes
/// with a devnet mint against a devnet endpoint. A URI longer than
/// [`SCANNER_LENGTH_LIMIT`] is still returned, with a warning.
///
/// # Errors
///
/// Returns [`PaymentError::UnsupportedCurrency`] if the request's currency
/// has no mint on the selected cluster.
pub fn encode(request: &PaymentRequest, ctx: &NetworkContext) -> Result<String, PaymentError> {
    let mint = networks::mint_for(ctx.cluster(), request.currency())?;

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("amount", &amount::format_amount(request.amount()));
    if let Some(mint) = mint {
        query.append_pair("spl-token", &mint.to_string());
    }
    query.append_pair("reference", &request.reference().to_string());
    query.append_pair("label", request.label());
    if let Some(memo) = request.message() {
        query.append_pair("memo", memo);
    }

    let uri = format!("{SCHEME}:{}?{}", request.recipient(), query.finish());
    if uri.len() > SCANNER_LENGTH_LIMIT {
        tracing::warn!(
            length = uri.len(),
            limit = SCANNER_LENGTH_LIMIT,
            "encoded payment URI exceeds common scanner limits"
        );
    }
    Ok(uri)
}

/// The fields recovered from a payment URI.
#[derive(Debug, Clone)]
pub struct PayUrlParts {
    /// Recipient address from the URI path.
    pub recipient: Pubkey,
    /// Requested amount.
    pub amount: Decimal,
    /// Token mint; `None` for a native-coin request.
    pub spl_token: Option<Pubkey>,
    /// Correlation reference.
    pub reference: Pubkey,
    /// Merchant or product label.
    pub label: Option<String>,
    /// Optional payer-facing memo.
    pub memo: Option<String>,
}

/// Parses a payment URI back into its fields.
///
/// # Errors
///
/// Returns [`PaymentError::InvalidAddress`] for a foreign scheme or any
/// address field that does not parse, and [`PaymentError::InvalidAmount`]
/// for a missing or malformed amount.
pub fn parse(uri: &str) -> Result<PayUrlParts, PaymentError> {
    let rest = uri
        .strip_prefix(SCHEME)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(|| PaymentError::InvalidAddress(format!("not a {SCHEME}: URI: {uri}")))?;

    let (recipient_str, query) = match rest.split_once('?') {
        Some((r, q)) => (r, q),
        None => (rest, ""),
    };
    let recipient = Pubkey::from_str(recipient_str)
        .map_err(|_| PaymentError::InvalidAddress(recipient_str.to_owned()))?;

    let mut amount_str = None;
    let mut spl_token = None;
    let mut reference = None;
    let mut label = None;
    let mut memo = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "amount" => amount_str = Some(value.into_owned()),
            "spl-token" => {
                spl_token = Some(
                    Pubkey::from_str(&value)
                        .map_err(|_| PaymentError::InvalidAddress(value.into_owned()))?,
                );
            }
            "reference" => {
                reference = Some(
                    Pubkey::from_str(&value)
                        .map_err(|_| PaymentError::InvalidAddress(value.into_owned()))?,
                );
            }
            "label" => label = Some(value.into_owned()),
            "memo" => memo = Some(value.into_owned()),
            _ => {}
        }
    }

    let amount_str =
        amount_str.ok_or_else(|| PaymentError::InvalidAmount("missing amount".to_owned()))?;
    let amount = Decimal::from_str(&amount_str)
        .map_err(|_| PaymentError::InvalidAmount(amount_str.clone()))?;
    let reference = reference
        .ok_or_else(|| PaymentError::InvalidAddress("missing reference".to_owned()))?;

    Ok(PayUrlParts {
        recipient,
        amount,
        spl_token,
        reference,
        label,
        memo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;

    const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn mainnet() -> NetworkContext {
        NetworkContext::new("https://api.mainnet-beta.solana.com")
    }

    #[test]
    fn test_encode_native_omits_spl_token() {
        let request = PaymentRequest::new(
            RECIPIENT,
            Decimal::from_str("0.5").unwrap(),
            Currency::Sol,
            "Coffee",
        )
        .unwrap();
        let uri = encode(&request, &mainnet()).unwrap();
        assert!(uri.starts_with(&format!("solana:{RECIPIENT}?")));
        assert!(uri.contains("amount=0.5"));
        assert!(!uri.contains("spl-token"));
    }

    #[test]
    fn test_encode_token_carries_mint() {
        let request = PaymentRequest::new(RECIPIENT, Decimal::ONE, Currency::Usdc, "Coffee").unwrap();
        let uri = encode(&request, &mainnet()).unwrap();
        assert!(uri.contains("spl-token=EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"));
    }

    #[test]
    fn test_encode_devnet_selects_devnet_mint() {
        let request = PaymentRequest::new(RECIPIENT, Decimal::ONE, Currency::Usdc, "Coffee").unwrap();
        let ctx = NetworkContext::new("https://api.devnet.solana.com");
        let uri = encode(&request, &ctx).unwrap();
        assert!(uri.contains("spl-token=4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"));
    }

    #[test]
    fn test_roundtrip_recovers_all_fields() {
        let request = PaymentRequest::new(
            RECIPIENT,
            Decimal::from_str("1.234567891").unwrap(),
            Currency::Usdc,
            "Fancy Hat & Co.",
        )
        .unwrap()
        .with_message("order #42");
        let uri = encode(&request, &mainnet()).unwrap();
        let parts = parse(&uri).unwrap();
        assert_eq!(parts.recipient, request.recipient());
        assert_eq!(parts.amount, Decimal::from_str("1.234567891").unwrap());
        assert_eq!(parts.reference, request.reference().pubkey());
        assert_eq!(parts.label.as_deref(), Some("Fancy Hat & Co."));
        assert_eq!(parts.memo.as_deref(), Some("order #42"));
        assert!(parts.spl_token.is_some());
    }

    #[test]
    fn test_parse_rejects_foreign_scheme() {
        assert!(matches!(
            parse("bitcoin:1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"),
            Err(PaymentError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_amount() {
        let uri = format!("solana:{RECIPIENT}?reference={RECIPIENT}");
        assert!(matches!(parse(&uri), Err(PaymentError::InvalidAmount(_))));
    }
}
