//! Immutable payment requests.

use std::str::FromStr;

use rust_decimal::Decimal;
use solana_pubkey::Pubkey;

use crate::currency::Currency;
use crate::error::PaymentError;
use crate::reference::Reference;

/// One payment a merchant wants to receive.
///
/// Immutable once created: every accessor borrows, and the `with_*`
/// constructors consume and return the value. A fresh [`Reference`] is
/// minted per request and never reused.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    recipient: Pubkey,
    amount: Decimal,
    currency: Currency,
    reference: Reference,
    label: String,
    message: Option<String>,
}

impl PaymentRequest {
    /// Creates a request for `amount` units of `currency` payable to
    /// `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::InvalidAddress`] if the recipient does not
    /// parse as a Solana address, or [`PaymentError::InvalidAmount`] if the
    /// amount is not positive.
    pub fn new(
        recipient: &str,
        amount: Decimal,
        currency: Currency,
        label: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        let recipient = Pubkey::from_str(recipient)
            .map_err(|_| PaymentError::InvalidAddress(recipient.to_owned()))?;
        if amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "{amount} is not a positive amount"
            )));
        }
        Ok(Self {
            recipient,
            amount,
            currency,
            reference: Reference::generate(),
            label: label.into(),
            message: None,
        })
    }

    /// Attaches an optional free-form message shown to the payer.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replaces the auto-minted reference with a caller-supplied one.
    ///
    /// If the supplied string is not a well-formed address, the auto-minted
    /// reference is kept; a fresh valid identifier is always preferable to
    /// a malformed one downstream.
    #[must_use]
    pub fn with_reference(mut self, reference: &str) -> Self {
        match reference.parse::<Reference>() {
            Ok(parsed) => self.reference = parsed,
            Err(_) => {
                tracing::warn!(
                    supplied = reference,
                    "caller-supplied reference is not a valid address, keeping minted one"
                );
            }
        }
        self
    }

    /// Recipient address.
    #[must_use]
    pub const fn recipient(&self) -> Pubkey {
        self.recipient
    }

    /// Requested amount in whole currency units.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// Requested currency.
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// Correlation reference for this request.
    #[must_use]
    pub const fn reference(&self) -> Reference {
        self.reference
    }

    /// Merchant or product label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Optional payer-facing message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[test]
    fn test_new_mints_a_reference() {
        let a = PaymentRequest::new(RECIPIENT, Decimal::ONE, Currency::Sol, "Coffee").unwrap();
        let b = PaymentRequest::new(RECIPIENT, Decimal::ONE, Currency::Sol, "Coffee").unwrap();
        assert_ne!(a.reference(), b.reference());
    }

    #[test]
    fn test_new_rejects_bad_recipient() {
        let err = PaymentRequest::new("nope", Decimal::ONE, Currency::Sol, "Coffee").unwrap_err();
        assert!(matches!(err, PaymentError::InvalidAddress(_)));
    }

    #[test]
    fn test_new_rejects_non_positive_amount() {
        assert!(PaymentRequest::new(RECIPIENT, Decimal::ZERO, Currency::Sol, "x").is_err());
        assert!(PaymentRequest::new(RECIPIENT, Decimal::from(-2), Currency::Sol, "x").is_err());
    }

    #[test]
    fn test_with_reference_accepts_valid() {
        let reference = crate::reference::Reference::generate();
        let request = PaymentRequest::new(RECIPIENT, Decimal::ONE, Currency::Usdc, "x")
            .unwrap()
            .with_reference(&reference.to_string());
        assert_eq!(request.reference(), reference);
    }

    #[test]
    fn test_with_reference_keeps_minted_on_invalid() {
        let request = PaymentRequest::new(RECIPIENT, Decimal::ONE, Currency::Usdc, "x").unwrap();
        let minted = request.reference();
        let request = request.with_reference("!!not-base58!!");
        assert_eq!(request.reference(), minted);
    }
}
