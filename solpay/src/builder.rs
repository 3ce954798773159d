//! Turns a payment request into an unsigned transfer plan.
//!
//! The builder reads the payer's balances up front so that checkout can
//! refuse impossible payments before a wallet prompt ever appears, derives
//! associated token accounts for non-native currencies, and threads the
//! request's reference key through the transfer instruction as a read-only
//! non-signer so the confirmation poller can find the transaction later.

use solana_instruction::{AccountMeta, Instruction};
use solana_message::{VersionedMessage, v0::Message as MessageV0};
use solana_pubkey::{Pubkey, pubkey};

use crate::amount;
use crate::error::{NativeShortfall, PaymentError};
use crate::networks::{NetworkContext, deployment_for};
use crate::reference::Reference;
use crate::request::PaymentRequest;
use crate::rpc::{RpcClientLike, probe_account};

/// Lamports held back from affordability checks to leave room for fees.
///
/// This is a headroom check only; the actual fee is whatever the network
/// charges at submission time.
pub const FEE_BUFFER_LAMPORTS: u64 = 10_000;

/// Smallest transfer the builder will produce, in base units.
///
/// The floor is defined for native transfers; applying it to token
/// transfers as well is a deliberate extension, since sub-1000-unit token
/// dust is just as impractical to settle. Dust below the floor is rejected
/// before any instruction is built.
pub const DUST_FLOOR_UNITS: u64 = 1_000;

const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// An unsigned transfer ready for signing and submission.
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    fee_payer: Pubkey,
    reference: Reference,
    instructions: Vec<Instruction>,
}

impl TransactionPlan {
    /// The account that signs and pays for the transaction.
    #[must_use]
    pub const fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    /// The reference key embedded in the transfer instruction.
    #[must_use]
    pub const fn reference(&self) -> &Reference {
        &self.reference
    }

    /// The instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Compiles the plan into a v0 message against a recent blockhash.
    pub fn compile(&self, recent_blockhash: solana_message::Hash) -> Result<VersionedMessage, PaymentError> {
        let message =
            MessageV0::try_compile(&self.fee_payer, &self.instructions, &[], recent_blockhash)
                .map_err(|e| PaymentError::Unknown(format!("message compilation failed: {e}")))?;
        Ok(VersionedMessage::V0(message))
    }
}

/// Derives the associated token account for `owner` and `mint`.
#[must_use]
pub fn derive_associated_token_account(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let seeds = [owner.as_ref(), spl_token::ID.as_ref(), mint.as_ref()];
    Pubkey::find_program_address(&seeds, &ATA_PROGRAM_PUBKEY).0
}

/// Builds the transfer plan for `request`, paid by `sender`.
///
/// Native payments yield a single system transfer; token payments yield a
/// `transfer_checked`, preceded by recipient account creation when the
/// recipient has never held the token. Affordability and precision are
/// validated against live ledger state, so a stale snapshot can still lose
/// a race with a concurrent spend; the submission path surfaces that as a
/// rejection.
pub async fn build_transfer<R: RpcClientLike + ?Sized>(
    rpc: &R,
    network: &NetworkContext,
    request: &PaymentRequest,
    sender: &Pubkey,
) -> Result<TransactionPlan, PaymentError> {
    let currency = request.currency();
    tracing::debug!(
        %sender,
        recipient = %request.recipient(),
        currency = currency.code(),
        "building transfer plan"
    );

    let mut instructions = if currency.is_native() {
        build_native_transfer(rpc, request, sender).await?
    } else {
        build_token_transfer(rpc, network, request, sender).await?
    };

    // The transfer instruction carries the reference as a read-only
    // non-signer so signature listings for the reference key surface
    // exactly this payment.
    let transfer = instructions
        .last_mut()
        .ok_or_else(|| PaymentError::Unknown("empty instruction list".to_owned()))?;
    transfer.accounts.push(AccountMeta::new_readonly(
        request.reference().pubkey(),
        false,
    ));

    Ok(TransactionPlan {
        fee_payer: *sender,
        reference: request.reference(),
        instructions,
    })
}

async fn build_native_transfer<R: RpcClientLike + ?Sized>(
    rpc: &R,
    request: &PaymentRequest,
    sender: &Pubkey,
) -> Result<Vec<Instruction>, PaymentError> {
    let lamports = amount::to_base_units(request.amount(), 9)?;
    if lamports < DUST_FLOOR_UNITS {
        return Err(PaymentError::AmountTooSmall {
            units: lamports,
            floor: DUST_FLOOR_UNITS,
        });
    }

    let available = rpc
        .get_balance(sender)
        .await
        .map_err(|e| PaymentError::NetworkUnavailable(e.to_string()))?;
    let required = lamports
        .checked_add(FEE_BUFFER_LAMPORTS)
        .ok_or_else(|| PaymentError::InvalidAmount("amount overflows u64".to_owned()))?;
    if available < required {
        return Err(PaymentError::InsufficientNativeBalance {
            shortfall: Some(NativeShortfall {
                required,
                available,
            }),
        });
    }

    Ok(vec![solana_system_interface::instruction::transfer(
        sender,
        &request.recipient(),
        lamports,
    )])
}

async fn build_token_transfer<R: RpcClientLike + ?Sized>(
    rpc: &R,
    network: &NetworkContext,
    request: &PaymentRequest,
    sender: &Pubkey,
) -> Result<Vec<Instruction>, PaymentError> {
    let currency = request.currency();
    let deployment = deployment_for(network.cluster(), currency).ok_or(
        PaymentError::UnsupportedCurrency {
            currency,
            cluster: network.cluster(),
        },
    )?;
    let mint = deployment.mint;

    let sender_ata = derive_associated_token_account(sender, &mint);
    let token_account = rpc
        .get_token_account(&sender_ata)
        .await
        .map_err(|e| PaymentError::NetworkUnavailable(e.to_string()))?
        .ok_or(PaymentError::TokenAccountMissing {
            owner: *sender,
            mint,
        })?;

    // The on-chain mint precision is authoritative over the static table.
    let units = amount::to_base_units(request.amount(), token_account.decimals)?;
    if units < DUST_FLOOR_UNITS {
        return Err(PaymentError::AmountTooSmall {
            units,
            floor: DUST_FLOOR_UNITS,
        });
    }
    if token_account.amount < units {
        return Err(PaymentError::InsufficientTokenBalance {
            currency,
            required: units,
            available: token_account.amount,
            decimals: token_account.decimals,
        });
    }

    let recipient_ata = derive_associated_token_account(&request.recipient(), &mint);
    let mut instructions = Vec::with_capacity(2);
    if !probe_account(rpc, &recipient_ata).await.exists {
        tracing::debug!(%recipient_ata, %mint, "recipient token account absent, adding creation");
        instructions.push(
            spl_associated_token_account::instruction::create_associated_token_account(
                sender,
                &request.recipient(),
                &mint,
                &spl_token::ID,
            ),
        );
    }

    let transfer = spl_token::instruction::transfer_checked(
        &spl_token::ID,
        &sender_ata,
        &mint,
        &recipient_ata,
        sender,
        &[],
        units,
        token_account.decimals,
    )
    .map_err(|e| PaymentError::Unknown(format!("transfer instruction rejected: {e}")))?;
    instructions.push(transfer);

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::rpc::{TokenAccountState, mock::MockLedger};
    use rust_decimal::Decimal;

    const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn request(amount: Decimal, currency: Currency) -> PaymentRequest {
        PaymentRequest::new(RECIPIENT, amount, currency, "Test Store")
            .expect("valid request")
    }

    fn devnet() -> NetworkContext {
        NetworkContext::new("https://api.devnet.solana.com")
    }

    fn mainnet() -> NetworkContext {
        NetworkContext::new("https://api.mainnet-beta.solana.com")
    }

    #[tokio::test]
    async fn test_native_transfer_plan() {
        let sender = Pubkey::new_unique();
        let mut ledger = MockLedger::default();
        ledger.balances.insert(sender, 1_000_000_000);

        let request = request(Decimal::new(1, 2), Currency::Sol); // 0.01 SOL
        let plan = build_transfer(&ledger, &devnet(), &request, &sender)
            .await
            .expect("plan builds");

        assert_eq!(plan.instructions().len(), 1);
        assert_eq!(plan.fee_payer(), &sender);
        let transfer = &plan.instructions()[0];
        // system program + reference appended last, read-only non-signer.
        let reference_meta = transfer.accounts.last().expect("reference meta");
        assert_eq!(reference_meta.pubkey, request.reference().pubkey());
        assert!(!reference_meta.is_signer);
        assert!(!reference_meta.is_writable);
    }

    #[tokio::test]
    async fn test_native_exact_balance_with_buffer_succeeds() {
        let sender = Pubkey::new_unique();
        let mut ledger = MockLedger::default();
        // 0.01 SOL = 10_000_000 lamports, plus the fee buffer, exactly.
        ledger.balances.insert(sender, 10_000_000 + FEE_BUFFER_LAMPORTS);

        let request = request(Decimal::new(1, 2), Currency::Sol);
        assert!(build_transfer(&ledger, &devnet(), &request, &sender).await.is_ok());
    }

    #[tokio::test]
    async fn test_native_transfer_moves_exact_units() {
        let sender = Pubkey::new_unique();
        let mut ledger = MockLedger::default();
        ledger.balances.insert(sender, 50_000_000);

        let request = request(Decimal::new(2, 2), Currency::Sol); // 0.02 SOL
        let plan = build_transfer(&ledger, &devnet(), &request, &sender)
            .await
            .expect("plan builds");

        assert_eq!(plan.instructions().len(), 1);
        // System transfer data ends with the lamport amount, little endian.
        let data = &plan.instructions()[0].data;
        assert_eq!(&data[data.len() - 8..], &20_000_000u64.to_le_bytes());
    }

    #[tokio::test]
    async fn test_native_shortfall_reports_amounts() {
        let sender = Pubkey::new_unique();
        let mut ledger = MockLedger::default();
        ledger.balances.insert(sender, 5_000_000);

        let request = request(Decimal::new(1, 2), Currency::Sol);
        let err = build_transfer(&ledger, &devnet(), &request, &sender)
            .await
            .expect_err("must fail");
        match err {
            PaymentError::InsufficientNativeBalance { shortfall: Some(s) } => {
                assert_eq!(s.required, 10_000_000 + FEE_BUFFER_LAMPORTS);
                assert_eq!(s.available, 5_000_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_native_dust_rejected() {
        let sender = Pubkey::new_unique();
        let mut ledger = MockLedger::default();
        ledger.balances.insert(sender, 1_000_000_000);

        // 500 lamports, under the floor.
        let request = request(Decimal::new(5, 7), Currency::Sol);
        let err = build_transfer(&ledger, &devnet(), &request, &sender)
            .await
            .expect_err("must fail");
        assert!(matches!(err, PaymentError::AmountTooSmall { units: 500, .. }));
    }

    #[tokio::test]
    async fn test_native_outage_is_network_unavailable() {
        let sender = Pubkey::new_unique();
        let ledger = MockLedger {
            outage: Some("connection refused".to_owned()),
            ..MockLedger::default()
        };

        let request = request(Decimal::ONE, Currency::Sol);
        let err = build_transfer(&ledger, &devnet(), &request, &sender)
            .await
            .expect_err("must fail");
        assert!(matches!(err, PaymentError::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn test_token_transfer_existing_recipient() {
        let sender = Pubkey::new_unique();
        let network = mainnet();
        let mint = deployment_for(network.cluster(), Currency::Usdc)
            .expect("mainnet usdc")
            .mint;
        let request = request(Decimal::new(1050, 2), Currency::Usdc); // 10.50 USDC

        let sender_ata = derive_associated_token_account(&sender, &mint);
        let recipient_ata = derive_associated_token_account(&request.recipient(), &mint);
        let mut ledger = MockLedger::default();
        ledger.token_accounts.insert(
            sender_ata,
            TokenAccountState {
                amount: 50_000_000,
                decimals: 6,
            },
        );
        ledger.accounts.insert(recipient_ata);

        let plan = build_transfer(&ledger, &network, &request, &sender)
            .await
            .expect("plan builds");
        assert_eq!(plan.instructions().len(), 1);
    }

    #[tokio::test]
    async fn test_token_transfer_creates_missing_recipient_account() {
        let sender = Pubkey::new_unique();
        let network = mainnet();
        let mint = deployment_for(network.cluster(), Currency::Usdc)
            .expect("mainnet usdc")
            .mint;
        let request = request(Decimal::TEN, Currency::Usdc);

        let sender_ata = derive_associated_token_account(&sender, &mint);
        let mut ledger = MockLedger::default();
        ledger.token_accounts.insert(
            sender_ata,
            TokenAccountState {
                amount: 50_000_000,
                decimals: 6,
            },
        );

        let plan = build_transfer(&ledger, &network, &request, &sender)
            .await
            .expect("plan builds");
        // account creation first, then the transfer.
        assert_eq!(plan.instructions().len(), 2);
        let reference_meta = plan.instructions()[1].accounts.last().expect("meta");
        assert_eq!(reference_meta.pubkey, request.reference().pubkey());
    }

    #[tokio::test]
    async fn test_token_dust_rejected() {
        let sender = Pubkey::new_unique();
        let network = mainnet();
        let mint = deployment_for(network.cluster(), Currency::Usdc)
            .expect("mainnet usdc")
            .mint;
        // 0.0005 USDC = 500 base units, under the floor.
        let request = request(Decimal::new(5, 4), Currency::Usdc);

        let sender_ata = derive_associated_token_account(&sender, &mint);
        let mut ledger = MockLedger::default();
        ledger.token_accounts.insert(
            sender_ata,
            TokenAccountState {
                amount: 50_000_000,
                decimals: 6,
            },
        );

        let err = build_transfer(&ledger, &network, &request, &sender)
            .await
            .expect_err("must fail");
        assert!(matches!(err, PaymentError::AmountTooSmall { units: 500, .. }));
    }

    #[tokio::test]
    async fn test_token_sender_without_account() {
        let sender = Pubkey::new_unique();
        let request = request(Decimal::TEN, Currency::Usdc);
        let ledger = MockLedger::default();

        let err = build_transfer(&ledger, &mainnet(), &request, &sender)
            .await
            .expect_err("must fail");
        assert!(matches!(err, PaymentError::TokenAccountMissing { .. }));
    }

    #[tokio::test]
    async fn test_token_insufficient_balance() {
        let sender = Pubkey::new_unique();
        let network = mainnet();
        let mint = deployment_for(network.cluster(), Currency::Usdc)
            .expect("mainnet usdc")
            .mint;
        let request = request(Decimal::TEN, Currency::Usdc); // 10_000_000 units

        let sender_ata = derive_associated_token_account(&sender, &mint);
        let mut ledger = MockLedger::default();
        ledger.token_accounts.insert(
            sender_ata,
            TokenAccountState {
                amount: 2_000_000,
                decimals: 6,
            },
        );

        let err = build_transfer(&ledger, &network, &request, &sender)
            .await
            .expect_err("must fail");
        match err {
            PaymentError::InsufficientTokenBalance {
                required,
                available,
                ..
            } => {
                assert_eq!(required, 10_000_000);
                assert_eq!(available, 2_000_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_usdt_unsupported_on_devnet() {
        let sender = Pubkey::new_unique();
        let request = request(Decimal::TEN, Currency::Usdt);
        let ledger = MockLedger::default();

        let err = build_transfer(&ledger, &devnet(), &request, &sender)
            .await
            .expect_err("must fail");
        assert!(matches!(err, PaymentError::UnsupportedCurrency { .. }));
    }

    #[test]
    fn test_plan_compiles_to_v0_message() {
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let plan = TransactionPlan {
            fee_payer: sender,
            reference: Reference::generate(),
            instructions: vec![solana_system_interface::instruction::transfer(
                &sender, &recipient, 1_000_000,
            )],
        };
        let message = plan.compile(solana_message::Hash::default()).expect("compiles");
        assert!(matches!(message, VersionedMessage::V0(_)));
    }
}
