//! Payment reference identifiers.
//!
//! A reference is a freshly drawn 32-byte key-shaped identifier attached to
//! each payment request. The builder embeds it in the transfer instruction's
//! account list, which lets the confirmation poller look up ledger activity
//! by the reference address directly instead of scanning the recipient's
//! general history. Uniqueness is probabilistic over the 256-bit space; no
//! collision detection is performed.

use std::fmt;
use std::str::FromStr;

use rand::{RngCore, TryRngCore};
use solana_pubkey::Pubkey;

use crate::error::PaymentError;

/// A unique correlation identifier for one payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference(Pubkey);

impl Reference {
    /// Draws a fresh reference.
    ///
    /// Bytes come from the OS entropy source. If the OS source fails, this
    /// falls back to the thread-local generator, announcing the downgrade
    /// with a warning rather than silently. Draws that do not form a
    /// usable address (the all-zero key) are discarded and retried.
    #[must_use]
    pub fn generate() -> Self {
        loop {
            let pubkey = Pubkey::new_from_array(random_bytes());
            if pubkey != Pubkey::default() {
                return Self(pubkey);
            }
            tracing::debug!("discarded unusable reference draw, retrying");
        }
    }

    /// The reference as an address.
    #[must_use]
    pub const fn pubkey(&self) -> Pubkey {
        self.0
    }
}

fn random_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    if let Err(e) = rand::rngs::OsRng.try_fill_bytes(&mut bytes) {
        // Weaker pseudo-random fallback; only reachable when the OS
        // entropy source is unavailable.
        tracing::warn!(error = %e, "OS entropy unavailable, falling back to thread-local RNG");
        rand::rng().fill_bytes(&mut bytes);
    }
    bytes
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Pubkey> for Reference {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl FromStr for Reference {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pubkey::from_str(s)
            .map(Self)
            .map_err(|_| PaymentError::InvalidAddress(s.to_owned()))
    }
}
