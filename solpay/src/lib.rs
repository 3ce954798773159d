//! Merchant checkout engine for Solana Pay.
//!
//! The engine covers both halves of a non-custodial checkout:
//!
//! - **Requesting**: [`request::PaymentRequest`] captures what the merchant
//!   wants paid, [`builder::build_transfer`] turns it into an unsigned
//!   transfer for a connected wallet, and [`uri::encode`] renders it as a
//!   `solana:` payment URL for wallets that scan instead.
//! - **Confirming**: every request carries a unique [`reference::Reference`]
//!   key that the transfer instruction mentions on chain, and
//!   [`poller::ConfirmationPoller`] watches signature listings for that key
//!   until a transfer matching the expected recipient, amount, and currency
//!   settles.
//!
//! All ledger access goes through [`rpc::RpcClientLike`], implemented for
//! the nonblocking [`solana_client`] RPC client.
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use solpay::{Currency, NetworkContext, PaymentRequest};
//!
//! # fn main() -> Result<(), solpay::PaymentError> {
//! let network = NetworkContext::new("https://api.mainnet-beta.solana.com");
//! let request = PaymentRequest::new(
//!     "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
//!     Decimal::new(1050, 2),
//!     Currency::Usdc,
//!     "Corner Store",
//! )?
//! .with_message("Order #4021");
//! let url = solpay::uri::encode(&request, &network)?;
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod amount;
pub mod builder;
pub mod currency;
pub mod error;
pub mod networks;
pub mod poller;
pub mod reference;
pub mod request;
pub mod rpc;
pub mod status;
pub mod submit;
pub mod uri;

pub use builder::{TransactionPlan, build_transfer};
pub use currency::Currency;
pub use error::PaymentError;
pub use networks::{Cluster, NetworkContext};
pub use poller::{ConfirmationPoller, PollConfig, PollOutcome, PollSession, PollTarget};
pub use reference::Reference;
pub use request::PaymentRequest;
pub use status::{PaymentStatus, PaymentStatusMachine};
pub use submit::send_payment;
