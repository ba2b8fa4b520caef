//! Deliverly CLI - checkout from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Preview totals for a cart with a promo code
//! dl-cli promo SUMMER --cart fixtures/cart.yaml
//!
//! # Place a storefront order
//! dl-cli checkout --cart fixtures/cart.yaml --street "Chui 120" --house 4 --flat 12 --payment cash
//!
//! # Place a courier order
//! dl-cli courier --from "Akhunbaeva 1" --to "Manasa 40" --price 300 --payment freedom
//! ```
//!
//! # Commands
//!
//! - `promo` - Evaluate a promo code against a cart
//! - `checkout` - Submit a storefront order for a cart
//! - `courier` - Submit a point-to-point courier order

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use deliverly_client::ClientConfig;
use deliverly_core::PaymentMethod;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cart_file;
mod commands;

#[derive(Parser)]
#[command(name = "dl-cli")]
#[command(author, version, about = "Deliverly checkout CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a promo code against a cart
    Promo {
        /// Promo code as the user would type it
        code: String,

        /// YAML cart file
        #[arg(short, long)]
        cart: PathBuf,
    },
    /// Submit a storefront order for a cart
    Checkout {
        /// YAML cart file
        #[arg(long)]
        cart: PathBuf,

        #[arg(long)]
        street: String,

        #[arg(long, default_value = "")]
        house: String,

        #[arg(long, default_value = "")]
        flat: String,

        /// Free-form note appended to the address
        #[arg(long)]
        comment: Option<String>,

        /// Payment method (`cash`, `qr`, `freedom`)
        #[arg(short, long)]
        payment: PaymentMethod,

        #[arg(long)]
        promo: Option<String>,
    },
    /// Submit a point-to-point courier order
    Courier {
        /// Pickup address
        #[arg(long)]
        from: String,

        /// Drop-off address
        #[arg(long)]
        to: String,

        /// Offered delivery price
        #[arg(long)]
        price: u64,

        /// Payment method (`cash`, `qr`, `freedom`)
        #[arg(short, long)]
        payment: PaymentMethod,

        #[arg(long, default_value = "")]
        comment: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    // Keep the guard alive so buffered events flush on exit
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deliverly_client=info,dl_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Promo { code, cart } => commands::promo::quote(config, &cart, &code).await?,
        Commands::Checkout {
            cart,
            street,
            house,
            flat,
            comment,
            payment,
            promo,
        } => {
            let address = deliverly_client::checkout::DeliveryAddress {
                street,
                house,
                flat,
                comment,
            };
            commands::checkout::place_order(
                config,
                &cart,
                address,
                payment,
                promo.unwrap_or_default(),
            )
            .await?;
        }
        Commands::Courier {
            from,
            to,
            price,
            payment,
            comment,
        } => {
            let request = deliverly_client::checkout::CourierOrderRequest {
                from,
                to,
                price: deliverly_core::Money::new(price),
                payment_method: Some(payment),
                comment,
            };
            commands::courier::place_order(config, request).await?;
        }
    }
    Ok(())
}

/// Initialize Sentry error tracking when a DSN is configured.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Send errors and warnings to Sentry as events, lower levels as breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}
