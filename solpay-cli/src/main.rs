//! Merchant checkout from the command line.
//!
//! `solpay request` mints a payment request and prints the `solana:` URL
//! plus the reference key; `solpay watch` then polls the ledger for that
//! reference until the payment settles, the window elapses, or Ctrl-C.

#![allow(clippy::print_stdout)]

use clap::{Parser, Subcommand};
use solana_client::nonblocking::rpc_client::RpcClient;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use solpay::poller::{ConfirmationPoller, PollConfig, PollOutcome, PollTarget};
use solpay::{Currency, NetworkContext, PaymentError, PaymentRequest};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Parser)]
#[command(name = "solpay", version, about = "Merchant checkout for Solana Pay")]
struct Cli {
    /// RPC endpoint; the cluster is inferred from the URL.
    #[arg(long, env = "SOLPAY_RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    rpc_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mint a payment request and print its payment URL.
    Request {
        /// Merchant wallet address receiving the payment.
        #[arg(long)]
        recipient: String,
        /// Amount in whole currency units, e.g. 10.50.
        #[arg(long)]
        amount: f64,
        /// SOL, USDC, or USDT.
        #[arg(long, default_value = "SOL")]
        currency: Currency,
        /// Merchant name shown by the paying wallet.
        #[arg(long, default_value = "solpay merchant")]
        label: String,
        /// Free-form note attached to the request.
        #[arg(long)]
        message: Option<String>,
    },
    /// Watch the ledger until a request's payment settles.
    Watch {
        /// Merchant wallet address receiving the payment.
        #[arg(long)]
        recipient: String,
        /// Amount in whole currency units, as printed by `request`.
        #[arg(long)]
        amount: f64,
        /// SOL, USDC, or USDT.
        #[arg(long, default_value = "SOL")]
        currency: Currency,
        /// Reference key printed by `request`.
        #[arg(long)]
        reference: String,
        /// Seconds between ledger checks.
        #[arg(long, default_value_t = 5)]
        interval: u64,
        /// Checks before giving up.
        #[arg(long, default_value_t = 60)]
        attempts: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "checkout failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, PaymentError> {
    let network = NetworkContext::new(cli.rpc_url.clone());
    tracing::debug!(rpc_url = network.rpc_url(), cluster = network.cluster().as_str(), "resolved network");

    match cli.command {
        Command::Request {
            recipient,
            amount,
            currency,
            label,
            message,
        } => {
            let amount = solpay::amount::from_f64(amount)?;
            let mut request = PaymentRequest::new(&recipient, amount, currency, label)?;
            if let Some(message) = message {
                request = request.with_message(message);
            }
            let url = solpay::uri::encode(&request, &network)?;

            println!("payment url: {url}");
            println!("reference:   {}", request.reference());
            println!();
            println!(
                "waiting for payment? run: solpay watch --recipient {recipient} \
                 --amount {} --currency {} --reference {}",
                solpay::amount::format_amount(request.amount()),
                currency.code(),
                request.reference(),
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch {
            recipient,
            amount,
            currency,
            reference,
            interval,
            attempts,
        } => {
            let amount = solpay::amount::from_f64(amount)?;
            let request = PaymentRequest::new(&recipient, amount, currency, "solpay merchant")?
                .with_reference(&reference);
            let target = PollTarget::for_request(&request, &network)?;

            let rpc = Arc::new(RpcClient::new(cli.rpc_url));
            let config = PollConfig {
                max_attempts: attempts,
                interval: Duration::from_secs(interval),
                ..PollConfig::default()
            };
            let cancel = shutdown_token();
            let poller = ConfirmationPoller::new(config);

            match poller.poll(rpc.as_ref(), &target, &cancel).await {
                PollOutcome::Confirmed(signature) => {
                    println!("payment confirmed: {signature}");
                    Ok(ExitCode::SUCCESS)
                }
                PollOutcome::TimedOut { attempts } => {
                    Err(PaymentError::PollTimeout { attempts })
                }
                PollOutcome::Cancelled => {
                    tracing::info!("watch cancelled");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Token that trips on Ctrl-C so an in-flight watch can wind down cleanly.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping watch");
            trip.cancel();
        }
    });
    token
}
