//! On-chain confirmation detection.
//!
//! After a payment request is handed to a wallet, the engine does not see
//! the signed transaction. Instead the poller watches the ledger for the
//! request's reference key: the builder embeds it as a read-only non-signer
//! on the transfer instruction, so a signature listing for that key returns
//! exactly the transactions that carried this payment. Each candidate is
//! then matched against the expected recipient, amount, and currency before
//! it counts as a confirmation.

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::amount;
use crate::currency::Currency;
use crate::error::{PaymentError, RpcError};
use crate::networks::NetworkContext;
use crate::request::PaymentRequest;
use crate::rpc::{RpcClientLike, TransactionRecord};
use crate::status::PaymentStatusMachine;

/// Tuning knobs for the confirmation loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Ticks before the poller gives up.
    pub max_attempts: u32,
    /// Delay between ticks.
    pub interval: Duration,
    /// How many recent signatures to fetch per tick.
    pub signature_limit: usize,
    /// Slack when comparing block time against the poll start, to absorb
    /// clock skew between this host and the cluster.
    pub clock_skew: Duration,
    /// Tolerance in base units when matching transfer amounts, to absorb
    /// rounding in transaction metadata.
    pub unit_tolerance: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(5),
            signature_limit: 20,
            clock_skew: Duration::from_secs(30),
            unit_tolerance: 1_000,
        }
    }
}

/// What to look for on chain.
#[derive(Debug, Clone)]
pub struct PollTarget {
    /// The reference key embedded in the transfer instruction.
    pub reference: Pubkey,
    /// The merchant's receiving wallet.
    pub recipient: Pubkey,
    /// Expected transfer size in base units.
    pub expected_units: u64,
    /// Currency being watched.
    pub currency: Currency,
    /// Mint for token currencies, `None` for native transfers.
    pub mint: Option<Pubkey>,
}

impl PollTarget {
    /// Derives a target from a payment request on a given network.
    pub fn for_request(
        request: &PaymentRequest,
        network: &NetworkContext,
    ) -> Result<Self, PaymentError> {
        let currency = request.currency();
        let mint = crate::networks::mint_for(network.cluster(), currency)?;
        let expected_units = amount::to_base_units(request.amount(), currency.decimals())?;
        Ok(Self {
            reference: request.reference().pubkey(),
            recipient: request.recipient(),
            expected_units,
            currency,
            mint,
        })
    }
}

/// How a poll run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A matching transfer settled on chain.
    Confirmed(Signature),
    /// The attempt budget ran out without a match.
    TimedOut {
        /// Ticks spent before giving up.
        attempts: u32,
    },
    /// The caller cancelled the run.
    Cancelled,
}

/// Polls the ledger until a matching payment settles, the attempt budget
/// runs out, or the token is cancelled.
#[derive(Debug, Clone)]
pub struct ConfirmationPoller {
    config: PollConfig,
    /// Unix seconds at construction; transactions recorded before this
    /// (minus clock skew) are ignored.
    started_at: i64,
}

impl ConfirmationPoller {
    #[must_use]
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            started_at: unix_now(),
        }
    }

    /// Runs the confirmation loop.
    ///
    /// Transient query failures count against the attempt budget instead of
    /// aborting the run, so a flaky node degrades into a slower poll rather
    /// than a spurious failure.
    pub async fn poll<R: RpcClientLike + ?Sized>(
        &self,
        rpc: &R,
        target: &PollTarget,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        tracing::info!(
            reference = %target.reference,
            recipient = %target.recipient,
            currency = target.currency.code(),
            max_attempts = self.config.max_attempts,
            "watching for payment confirmation"
        );

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                tracing::debug!(attempt, "poll cancelled");
                return PollOutcome::Cancelled;
            }

            match self.tick(rpc, target).await {
                Ok(Some(signature)) => {
                    if cancel.is_cancelled() {
                        return PollOutcome::Cancelled;
                    }
                    tracing::info!(%signature, attempt, "payment confirmed");
                    return PollOutcome::Confirmed(signature);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "poll tick failed, will retry");
                }
            }

            if attempt < self.config.max_attempts {
                tokio::select! {
                    () = cancel.cancelled() => return PollOutcome::Cancelled,
                    () = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        tracing::warn!(
            attempts = self.config.max_attempts,
            reference = %target.reference,
            "confirmation window elapsed without a match"
        );
        PollOutcome::TimedOut {
            attempts: self.config.max_attempts,
        }
    }

    async fn tick<R: RpcClientLike + ?Sized>(
        &self,
        rpc: &R,
        target: &PollTarget,
    ) -> Result<Option<Signature>, RpcError> {
        let cutoff = self.started_at - self.config.clock_skew.as_secs() as i64;
        let records = rpc
            .get_signatures_for_address(&target.reference, self.config.signature_limit)
            .await?;

        for record in records {
            if record.failed || !record.confirmation.is_settled() {
                continue;
            }
            if record.block_time.is_some_and(|t| t < cutoff) {
                continue;
            }
            let transaction = match rpc.get_transaction(&record.signature).await {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::debug!(signature = %record.signature, error = %e, "detail fetch failed");
                    continue;
                }
            };
            if self.matches(target, &transaction) {
                return Ok(Some(record.signature));
            }
            tracing::debug!(
                signature = %record.signature,
                "transaction references the key but does not match the expected transfer"
            );
        }
        Ok(None)
    }

    fn matches(&self, target: &PollTarget, transaction: &TransactionRecord) -> bool {
        match target.mint {
            None => self.matches_native(target, transaction),
            Some(mint) => self.matches_token(target, &mint, transaction),
        }
    }

    /// Native match: the recipient's lamport balance grew by the expected
    /// amount, within tolerance.
    fn matches_native(&self, target: &PollTarget, transaction: &TransactionRecord) -> bool {
        let Some(index) = transaction
            .account_keys
            .iter()
            .position(|k| *k == target.recipient)
        else {
            return false;
        };
        let (Some(&pre), Some(&post)) = (
            transaction.pre_balances.get(index),
            transaction.post_balances.get(index),
        ) else {
            return false;
        };
        let delta = post.saturating_sub(pre);
        within_tolerance(delta, target.expected_units, self.config.unit_tolerance)
    }

    /// Token match: a recipient-owned holding of the expected mint grew by
    /// the expected amount, within tolerance.
    fn matches_token(
        &self,
        target: &PollTarget,
        mint: &Pubkey,
        transaction: &TransactionRecord,
    ) -> bool {
        let holding = |records: &[crate::rpc::TokenBalanceRecord]| {
            records
                .iter()
                .filter(|b| b.mint == *mint && b.owner == Some(target.recipient))
                .map(|b| b.amount)
                .sum::<u64>()
        };
        let pre = holding(&transaction.pre_token_balances);
        let post = holding(&transaction.post_token_balances);
        let delta = post.saturating_sub(pre);
        within_tolerance(delta, target.expected_units, self.config.unit_tolerance)
    }
}

fn within_tolerance(actual: u64, expected: u64, tolerance: u64) -> bool {
    actual.abs_diff(expected) <= tolerance
}

fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Single-flight wrapper that runs at most one poll per checkout session
/// and drives the session's status machine from the outcome.
pub struct PollSession {
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Default for PollSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// Whether a poll is currently running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawns the confirmation loop for `target`, reporting through
    /// `status`. A second start while one is in flight is a no-op.
    pub fn start<R>(
        &self,
        rpc: Arc<R>,
        config: PollConfig,
        target: PollTarget,
        status: Arc<PaymentStatusMachine>,
    ) where
        R: RpcClientLike + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("poll already in flight, ignoring start");
            return;
        }

        status.processing();
        let active = Arc::clone(&self.active);
        let cancel = self.cancel.clone();
        let poller = ConfirmationPoller::new(config);
        tokio::spawn(async move {
            let outcome = poller.poll(rpc.as_ref(), &target, &cancel).await;
            match outcome {
                PollOutcome::Confirmed(signature) => status.complete(signature),
                PollOutcome::TimedOut { attempts } => {
                    status.fail(&PaymentError::PollTimeout { attempts });
                }
                PollOutcome::Cancelled => {}
            }
            active.store(false, Ordering::SeqCst);
        });
    }

    /// Stops the in-flight poll, if any. The session cannot be restarted
    /// after stopping; build a new one for a retry.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
