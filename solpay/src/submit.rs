//! Signs and submits a built transfer plan.

use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use crate::builder::TransactionPlan;
use crate::error::{PaymentError, classify};
use crate::rpc::RpcClientLike;

/// Compiles, signs, submits, and confirms `plan` with `signer` as the sole
/// signer and fee payer.
///
/// Submission and confirmation errors are classified into the payment
/// error taxonomy from the node's message text, so callers see
/// [`PaymentError::TransactionRejected`] for wallet/program rejections and
/// [`PaymentError::NetworkUnavailable`] for connectivity trouble.
pub async fn send_payment<R: RpcClientLike + ?Sized>(
    rpc: &R,
    signer: &dyn Signer,
    plan: &TransactionPlan,
) -> Result<Signature, PaymentError> {
    let recent_blockhash = rpc
        .get_latest_blockhash()
        .await
        .map_err(|e| PaymentError::NetworkUnavailable(e.to_string()))?;
    let message = plan.compile(recent_blockhash)?;

    let transaction = VersionedTransaction::try_new(message, &[signer])
        .map_err(|e| PaymentError::TransactionRejected(format!("signing failed: {e}")))?;

    let signature = rpc
        .send_transaction(&transaction)
        .await
        .map_err(|e| classify(&e.to_string()))?;
    tracing::info!(%signature, "transaction submitted, awaiting confirmation");

    let confirmed = rpc
        .confirm_transaction(&signature)
        .await
        .map_err(|e| classify(&e.to_string()))?;
    if !confirmed {
        return Err(PaymentError::TransactionRejected(format!(
            "transaction {signature} was not confirmed"
        )));
    }

    Ok(signature)
}
