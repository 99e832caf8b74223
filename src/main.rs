//! Feewatch - price alerts and token activity notifications for Solana

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use feewatch::cli::commands::{self, ChannelOptOuts};
use feewatch::config::Config;

/// Feewatch - Solana token monitor
#[derive(Parser)]
#[command(name = "feewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "FEEWATCH_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the price alert and token activity monitors
    Start {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage price alerts
    Alert {
        #[command(subcommand)]
        action: AlertAction,
    },

    /// Manage watched tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage notification channels
    Channel {
        #[command(subcommand)]
        action: ChannelAction,
    },

    /// Look up the current USD price of a token
    Price {
        /// Token mint address
        mint: String,
    },

    /// Run rug-pull risk checks on a token
    Risk {
        /// Token mint address
        mint: String,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (RPC, price oracle, Telegram)
    Health,
}

#[derive(Subcommand)]
enum AlertAction {
    /// Create a price alert
    Add {
        /// Owning user id
        #[arg(long)]
        user: String,

        /// Token mint address
        token: String,

        /// Target price in USD
        target: f64,

        /// above or below
        #[arg(long, default_value = "above")]
        direction: String,

        /// Display symbol (defaults to the shortened address)
        #[arg(long)]
        symbol: Option<String>,
    },

    /// List alerts
    List {
        /// Only this user's alerts
        #[arg(long)]
        user: Option<String>,
    },

    /// Delete an alert
    Remove {
        /// Alert id
        id: String,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Watch a token for a user (replaces their current token)
    Watch {
        #[arg(long)]
        user: String,

        /// Token mint address
        mint: String,

        /// Creator fee wallet to watch for claimable fees
        #[arg(long)]
        fee_wallet: Option<String>,
    },

    /// Stop watching a user's token
    Unwatch {
        #[arg(long)]
        user: String,
    },

    /// List watched tokens
    List,
}

#[derive(Subcommand)]
enum ChannelAction {
    /// Set a user's Telegram chat
    Set {
        #[arg(long)]
        user: String,

        /// Telegram chat id
        chat_id: String,

        /// Keep the channel but send nothing
        #[arg(long)]
        disable: bool,

        #[arg(long)]
        no_price_alerts: bool,

        #[arg(long)]
        no_large_buys: bool,

        #[arg(long)]
        no_fee_ready: bool,
    },

    /// Show channels
    Show {
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let default_directive = "feewatch=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|e| anyhow::anyhow!("invalid log directive: {}", e))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_directive),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Alert { action } => match action {
            AlertAction::Add {
                user,
                token,
                target,
                direction,
                symbol,
            } => commands::alert_add(&config, &user, &token, symbol, target, &direction).await,
            AlertAction::List { user } => commands::alert_list(&config, user.as_deref()).await,
            AlertAction::Remove { id } => commands::alert_remove(&config, &id).await,
        },
        Commands::Token { action } => match action {
            TokenAction::Watch {
                user,
                mint,
                fee_wallet,
            } => commands::token_watch(&config, &user, &mint, fee_wallet).await,
            TokenAction::Unwatch { user } => commands::token_unwatch(&config, &user).await,
            TokenAction::List => commands::token_list(&config).await,
        },
        Commands::Channel { action } => match action {
            ChannelAction::Set {
                user,
                chat_id,
                disable,
                no_price_alerts,
                no_large_buys,
                no_fee_ready,
            } => {
                let opt_outs = ChannelOptOuts {
                    disabled: disable,
                    no_price_alerts,
                    no_large_buys,
                    no_fee_ready,
                };
                commands::channel_set(&config, &user, &chat_id, opt_outs).await
            }
            ChannelAction::Show { user } => commands::channel_show(&config, user.as_deref()).await,
        },
        Commands::Price { mint } => commands::price(&config, &mint).await,
        Commands::Risk { mint } => commands::risk(&config, &mint).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
