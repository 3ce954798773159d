//! Cluster selection and per-cluster token deployments.
//!
//! The engine never relies on ambient configuration: callers construct a
//! [`NetworkContext`] from their RPC endpoint once and thread it through
//! every call. The cluster tag it carries selects which mint table
//! [`mint_for`] consults.

use std::sync::LazyLock;

use solana_pubkey::{Pubkey, pubkey};

use crate::currency::Currency;
use crate::error::PaymentError;

/// A named deployment of the Solana network.
///
/// Anything that looks like a development endpoint (devnet, testnet, a local
/// validator) maps to [`Cluster::Devnet`]; everything else is treated as
/// production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cluster {
    /// Production mainnet-beta.
    Mainnet,
    /// Development networks (devnet, testnet, local validators).
    Devnet,
}

impl Cluster {
    /// Derives the cluster from an RPC endpoint string.
    #[must_use]
    pub fn from_rpc_url(rpc_url: &str) -> Self {
        const DEV_MARKERS: &[&str] = &["devnet", "testnet", "localhost", "127.0.0.1"];
        let lower = rpc_url.to_ascii_lowercase();
        if DEV_MARKERS.iter().any(|m| lower.contains(m)) {
            Self::Devnet
        } else {
            Self::Mainnet
        }
    }

    /// Human-readable cluster tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet-beta",
            Self::Devnet => "devnet",
        }
    }
}

/// Network configuration supplied by the host, never mutated by the engine.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    rpc_url: String,
    cluster: Cluster,
}

impl NetworkContext {
    /// Creates a context for the given RPC endpoint, deriving the cluster tag.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let rpc_url = rpc_url.into();
        let cluster = Cluster::from_rpc_url(&rpc_url);
        Self { rpc_url, cluster }
    }

    /// The configured RPC endpoint.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// The derived cluster tag.
    #[must_use]
    pub const fn cluster(&self) -> Cluster {
        self.cluster
    }
}

/// A token's deployment on a specific cluster: mint address plus its fixed
/// decimal precision.
#[derive(Debug, Clone, Copy)]
pub struct TokenDeployment {
    /// Cluster the mint lives on.
    pub cluster: Cluster,
    /// Currency this deployment represents.
    pub currency: Currency,
    /// Mint address.
    pub mint: Pubkey,
    /// Base-unit decimal precision.
    pub decimals: u8,
}

static TOKEN_DEPLOYMENTS: LazyLock<Vec<TokenDeployment>> = LazyLock::new(|| {
    vec![
        // Mainnet: native Circle USDC (SPL Token)
        // Verify: https://solscan.io/token/EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v
        TokenDeployment {
            cluster: Cluster::Mainnet,
            currency: Currency::Usdc,
            mint: pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            decimals: 6,
        },
        // Mainnet: Tether USDT (SPL Token)
        // Verify: https://solscan.io/token/Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB
        TokenDeployment {
            cluster: Cluster::Mainnet,
            currency: Currency::Usdt,
            mint: pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
            decimals: 6,
        },
        // Devnet: Circle USDC testnet deployment (SPL Token)
        // Verify: https://explorer.solana.com/address/4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU?cluster=devnet
        // USDT has no devnet deployment; it resolves to UnsupportedCurrency there.
        TokenDeployment {
            cluster: Cluster::Devnet,
            currency: Currency::Usdc,
            mint: pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
            decimals: 6,
        },
    ]
});

/// Looks up a token deployment for a cluster/currency pair.
///
/// Pure table lookup, no network access. Native SOL has no deployment and
/// is rejected here; use [`mint_for`] when "no mint needed" is a valid
/// answer.
#[must_use]
pub fn deployment_for(cluster: Cluster, currency: Currency) -> Option<&'static TokenDeployment> {
    TOKEN_DEPLOYMENTS
        .iter()
        .find(|d| d.cluster == cluster && d.currency == currency)
}

/// Resolves the mint for a cluster/currency pair.
///
/// Returns `Ok(None)` for the native coin (no mint required) and the mint
/// address for supported tokens.
///
/// # Errors
///
/// Returns [`PaymentError::UnsupportedCurrency`] if the currency has no
/// deployment on the selected cluster.
pub fn mint_for(cluster: Cluster, currency: Currency) -> Result<Option<Pubkey>, PaymentError> {
    if currency.is_native() {
        return Ok(None);
    }
    deployment_for(cluster, currency)
        .map(|d| Some(d.mint))
        .ok_or(PaymentError::UnsupportedCurrency { currency, cluster })
}
