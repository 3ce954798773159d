//! Ledger access for the checkout engine.
//!
//! [`RpcClientLike`] is the seam between the engine and the chain: the
//! builder, poller, and signer path all speak this trait, the real
//! [`solana_client`] nonblocking client implements it, and tests substitute
//! a synthetic ledger. Everything it returns is a point-in-time snapshot,
//! never cached across calls.

use async_trait::async_trait;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransaction, TransactionConfirmationStatus, UiMessage, UiTransactionEncoding,
};
use std::str::FromStr;

use crate::error::RpcError;

/// Point-in-time snapshot of a plain account.
#[derive(Debug, Clone, Copy)]
pub struct AccountState {
    /// Whether the account exists (or could be confirmed to exist).
    pub exists: bool,
    /// Lamport balance, when the account exists.
    pub lamports: Option<u64>,
}

/// Point-in-time snapshot of a token holding account.
#[derive(Debug, Clone, Copy)]
pub struct TokenAccountState {
    /// Balance in token base units.
    pub amount: u64,
    /// The mint's decimal precision.
    pub decimals: u8,
}

/// How durably the ledger has recorded a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationLevel {
    /// Seen by the node but not yet voted on.
    Processed,
    /// Voted on by a supermajority.
    Confirmed,
    /// Rooted; will not be rolled back.
    Finalized,
}

impl ConfirmationLevel {
    /// Whether this level counts as settled for payment purposes.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

/// One entry from a recent-signatures listing.
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    /// The transaction signature.
    pub signature: Signature,
    /// Ledger-recorded time, when available.
    pub block_time: Option<i64>,
    /// Settlement status at listing time.
    pub confirmation: ConfirmationLevel,
    /// Whether the transaction itself failed on chain.
    pub failed: bool,
}

/// A recipient-relevant token balance inside a transaction's metadata.
#[derive(Debug, Clone)]
pub struct TokenBalanceRecord {
    /// Owner of the holding account, when the node reports it.
    pub owner: Option<Pubkey>,
    /// Token mint.
    pub mint: Pubkey,
    /// Balance in base units.
    pub amount: u64,
}

/// The parts of a transaction's detail the matcher needs.
#[derive(Debug, Clone, Default)]
pub struct TransactionRecord {
    /// Static account list, in transaction order.
    pub account_keys: Vec<Pubkey>,
    /// Lamport balances before execution, aligned with `account_keys`.
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution, aligned with `account_keys`.
    pub post_balances: Vec<u64>,
    /// Token balances before execution.
    pub pre_token_balances: Vec<TokenBalanceRecord>,
    /// Token balances after execution.
    pub post_token_balances: Vec<TokenBalanceRecord>,
}

/// The ledger query/submit surface the engine consumes.
#[async_trait]
pub trait RpcClientLike: Send + Sync {
    /// Lamport balance of an account.
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError>;

    /// Whether an account exists at `confirmed` commitment.
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError>;

    /// Balance and precision of a token holding account, `None` if absent.
    async fn get_token_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<TokenAccountState>, RpcError>;

    /// Most recent signatures touching an address, newest first.
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>, RpcError>;

    /// Full detail for one transaction.
    async fn get_transaction(&self, signature: &Signature) -> Result<TransactionRecord, RpcError>;

    /// A recent blockhash for message compilation.
    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError>;

    /// Submits a fully signed transaction.
    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, RpcError>;

    /// Whether a signature has reached `confirmed` commitment.
    async fn confirm_transaction(&self, signature: &Signature) -> Result<bool, RpcError>;
}

/// Probes whether an account exists.
///
/// A query failure is collapsed to "absent" with a warning, the
/// conservative default. Callers must treat `false` as
/// "absent-or-unreachable"; reads that need to distinguish the two go
/// through [`RpcClientLike`] directly.
pub async fn probe_account<R: RpcClientLike + ?Sized>(rpc: &R, address: &Pubkey) -> AccountState {
    match rpc.account_exists(address).await {
        Ok(exists) => AccountState {
            exists,
            lamports: None,
        },
        Err(e) => {
            tracing::warn!(%address, error = %e, "account probe failed, treating as absent");
            AccountState {
                exists: false,
                lamports: None,
            }
        }
    }
}

/// Probes a token holding account, collapsing query failures to `None`.
///
/// Same conservative semantics as [`probe_account`].
pub async fn probe_token_account<R: RpcClientLike + ?Sized>(
    rpc: &R,
    address: &Pubkey,
) -> Option<TokenAccountState> {
    match rpc.get_token_account(address).await {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(%address, error = %e, "token account probe failed, treating as absent");
            None
        }
    }
}

impl From<solana_client::client_error::ClientError> for RpcError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Self(e.to_string())
    }
}

#[async_trait]
impl RpcClientLike for solana_client::nonblocking::rpc_client::RpcClient {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError> {
        Ok(Self::get_balance(self, address).await?)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError> {
        let response = self
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value.is_some())
    }

    async fn get_token_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<TokenAccountState>, RpcError> {
        let response = self
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        if response.value.is_none() {
            return Ok(None);
        }
        let balance = self.get_token_account_balance(address).await?;
        let amount = balance
            .amount
            .parse::<u64>()
            .map_err(|e| RpcError(format!("malformed token balance for {address}: {e}")))?;
        Ok(Some(TokenAccountState {
            amount,
            decimals: balance.decimals,
        }))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>, RpcError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };
        let statuses = self
            .get_signatures_for_address_with_config(address, config)
            .await?;
        let mut records = Vec::with_capacity(statuses.len());
        for status in statuses {
            let signature = Signature::from_str(&status.signature)
                .map_err(|e| RpcError(format!("malformed signature {}: {e}", status.signature)))?;
            let confirmation = match status.confirmation_status {
                Some(TransactionConfirmationStatus::Finalized) => ConfirmationLevel::Finalized,
                Some(TransactionConfirmationStatus::Confirmed) => ConfirmationLevel::Confirmed,
                Some(TransactionConfirmationStatus::Processed) | None => {
                    ConfirmationLevel::Processed
                }
            };
            records.push(SignatureRecord {
                signature,
                block_time: status.block_time,
                confirmation,
                failed: status.err.is_some(),
            });
        }
        Ok(records)
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<TransactionRecord, RpcError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let response = self.get_transaction_with_config(signature, config).await?;
        let encoded = response.transaction;

        let account_keys = match encoded.transaction {
            EncodedTransaction::Json(tx) => match tx.message {
                UiMessage::Raw(raw) => parse_keys(raw.account_keys.iter().map(String::as_str))?,
                UiMessage::Parsed(parsed) => {
                    parse_keys(parsed.account_keys.iter().map(|a| a.pubkey.as_str()))?
                }
            },
            _ => {
                return Err(RpcError(format!(
                    "unexpected transaction encoding for {signature}"
                )));
            }
        };

        let meta = encoded
            .meta
            .ok_or_else(|| RpcError(format!("no metadata for {signature}")))?;
        let pre_token_balances = token_balances(meta.pre_token_balances);
        let post_token_balances = token_balances(meta.post_token_balances);

        Ok(TransactionRecord {
            account_keys,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances,
            post_token_balances,
        })
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        Ok(Self::get_latest_blockhash(self).await?)
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, RpcError> {
        Ok(Self::send_transaction(self, transaction).await?)
    }

    async fn confirm_transaction(&self, signature: &Signature) -> Result<bool, RpcError> {
        let response = self
            .confirm_transaction_with_commitment(signature, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value)
    }
}

fn parse_keys<'a>(keys: impl Iterator<Item = &'a str>) -> Result<Vec<Pubkey>, RpcError> {
    keys.map(|k| Pubkey::from_str(k).map_err(|e| RpcError(format!("malformed account key {k}: {e}"))))
        .collect()
}

fn token_balances(
    balances: OptionSerializer<Vec<solana_transaction_status::UiTransactionTokenBalance>>,
) -> Vec<TokenBalanceRecord> {
    let balances: Option<Vec<_>> = balances.into();
    balances
        .unwrap_or_default()
        .into_iter()
        .filter_map(|b| {
            let owner: Option<String> = b.owner.into();
            Some(TokenBalanceRecord {
                owner: owner.and_then(|o| Pubkey::from_str(&o).ok()),
                mint: Pubkey::from_str(&b.mint).ok()?,
                amount: b.ui_token_amount.amount.parse().ok()?,
            })
        })
        .collect()
}
