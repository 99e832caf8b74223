//! CLI command implementations

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::chain::{parse_pubkey, ChainSource, SolanaChain};
use crate::config::Config;
use crate::dexscreener::DexScreenerClient;
use crate::models::{AlertDirection, ChannelConfig, NewAlert, TokenConfig};
use crate::monitor::{PriceAlertMonitor, TokenActivityMonitor};
use crate::notify::{build_notifier, message, TelegramNotifier};
use crate::price::build_oracle;
use crate::risk::RiskChecker;
use crate::store::{JsonStore, Store};

async fn open_store(config: &Config) -> Result<Arc<JsonStore>> {
    let store = JsonStore::open(&config.store.path)
        .await
        .with_context(|| format!("Failed to open store at {}", config.store.path))?;
    Ok(Arc::new(store))
}

fn solana_chain(config: &Config) -> SolanaChain {
    SolanaChain::new(
        config.rpc.endpoint.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
    )
}

/// Start both monitors and run until Ctrl-C
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - notifications will be logged, not sent");
    }

    info!("Starting feewatch...");
    info!("Opening store at {}", config.store.path);
    let store: Arc<dyn Store> = open_store(config).await?;

    info!("Initializing RPC client...");
    let chain: Arc<dyn ChainSource> = Arc::new(solana_chain(config));
    let oracle = build_oracle(&config.price)?;
    let notifier = build_notifier(&config.telegram, dry_run)?;

    let price_monitor = Arc::new(PriceAlertMonitor::new(
        store.clone(),
        oracle,
        notifier.clone(),
        config.monitor.clone(),
    ));
    let token_monitor = Arc::new(TokenActivityMonitor::new(
        store.clone(),
        chain,
        notifier,
        config.monitor.clone(),
    ));

    if let Err(e) = token_monitor.load_from_store().await {
        error!("Failed to load watched tokens: {}", e);
    }

    let price_handle = price_monitor.start();
    let token_handle = token_monitor.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    price_monitor.stop();
    token_monitor.stop();

    for (name, handle) in [("price alert", price_handle), ("token activity", token_handle)] {
        if let Err(e) = handle.await {
            error!("{} monitor task failed: {}", name, e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

pub async fn alert_add(
    config: &Config,
    user_id: &str,
    token: &str,
    symbol: Option<String>,
    target_price: f64,
    direction: &str,
) -> Result<()> {
    parse_pubkey(token)?;
    let direction: AlertDirection = direction.parse()?;
    if !target_price.is_finite() || target_price <= 0.0 {
        bail!("target price must be a positive number, got {}", target_price);
    }

    let store = open_store(config).await?;
    let alert = store
        .insert_alert(NewAlert {
            user_id: user_id.to_string(),
            token_address: token.to_string(),
            token_symbol: symbol.unwrap_or_else(|| message::short_address(token)),
            target_price,
            direction,
        })
        .await?;

    println!(
        "Created alert {}: {} {} ${}",
        alert.id,
        alert.token_symbol,
        alert.direction,
        message::format_price(alert.target_price)
    );
    Ok(())
}

pub async fn alert_list(config: &Config, user_id: Option<&str>) -> Result<()> {
    let store = open_store(config).await?;
    let alerts = store.alerts(user_id).await?;

    println!("\n=== PRICE ALERTS ===\n");
    println!(
        "{:<38} {:<12} {:<10} {:<7} {:<14} {}",
        "ID", "USER", "SYMBOL", "DIR", "TARGET", "STATUS"
    );
    println!("{}", "-".repeat(96));

    for alert in &alerts {
        let status = match (alert.is_triggered, alert.triggered_price) {
            (true, Some(price)) => format!("triggered @ ${}", message::format_price(price)),
            (true, None) => "triggered".to_string(),
            (false, _) if !alert.is_active => "inactive".to_string(),
            _ => "pending".to_string(),
        };

        println!(
            "{:<38} {:<12} {:<10} {:<7} {:<14} {}",
            alert.id,
            alert.user_id,
            alert.token_symbol,
            alert.direction.to_string(),
            format!("${}", message::format_price(alert.target_price)),
            status
        );
    }

    if alerts.is_empty() {
        println!("No alerts.");
    }
    println!();
    Ok(())
}

pub async fn alert_remove(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if !store.delete_alert(id).await? {
        bail!("No alert with id {}", id);
    }
    println!("Removed alert {}", id);
    Ok(())
}

pub async fn token_watch(
    config: &Config,
    user_id: &str,
    mint: &str,
    fee_wallet: Option<String>,
) -> Result<()> {
    parse_pubkey(mint)?;
    if let Some(wallet) = &fee_wallet {
        parse_pubkey(wallet)?;
    }

    let store = open_store(config).await?;
    store
        .upsert_token_config(TokenConfig::new(user_id, mint, fee_wallet.clone()))
        .await?;

    match fee_wallet {
        Some(wallet) => println!("{} now watches {} (fee wallet {})", user_id, mint, wallet),
        None => println!("{} now watches {}", user_id, mint),
    }
    Ok(())
}

pub async fn token_unwatch(config: &Config, user_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if !store.remove_token_config(user_id).await? {
        bail!("{} is not watching a token", user_id);
    }
    println!("{} no longer watches a token", user_id);
    Ok(())
}

pub async fn token_list(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let tokens = store.token_configs().await?;

    println!("\n=== WATCHED TOKENS ===\n");
    println!("{:<12} {:<46} {}", "USER", "MINT", "FEE WALLET");
    println!("{}", "-".repeat(96));

    for token in &tokens {
        println!(
            "{:<12} {:<46} {}",
            token.user_id,
            token.mint,
            token.fee_wallet.as_deref().unwrap_or("-")
        );
    }

    if tokens.is_empty() {
        println!("No watched tokens.");
    }
    println!();
    Ok(())
}

/// Opt-outs for `channel set`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelOptOuts {
    pub disabled: bool,
    pub no_price_alerts: bool,
    pub no_large_buys: bool,
    pub no_fee_ready: bool,
}

pub async fn channel_set(
    config: &Config,
    user_id: &str,
    chat_id: &str,
    opt_outs: ChannelOptOuts,
) -> Result<()> {
    if chat_id.trim().is_empty() {
        bail!("chat id must not be empty");
    }

    let mut channel = ChannelConfig::new(user_id, chat_id.trim());
    channel.enabled = !opt_outs.disabled;
    channel.price_alerts = !opt_outs.no_price_alerts;
    channel.large_buys = !opt_outs.no_large_buys;
    channel.fee_ready = !opt_outs.no_fee_ready;

    let store = open_store(config).await?;
    store.upsert_channel(channel).await?;
    println!("Saved notification channel for {}", user_id);
    Ok(())
}

pub async fn channel_show(config: &Config, user_id: Option<&str>) -> Result<()> {
    let store = open_store(config).await?;
    let channels: Vec<ChannelConfig> = match user_id {
        Some(user) => store.channel(user).await?.into_iter().collect(),
        None => store.channels().await?,
    };

    println!("\n=== NOTIFICATION CHANNELS ===\n");
    println!(
        "{:<12} {:<16} {:<8} {:<8} {:<8} {}",
        "USER", "CHAT", "ENABLED", "PRICE", "BUYS", "FEES"
    );
    println!("{}", "-".repeat(64));

    for channel in &channels {
        println!(
            "{:<12} {:<16} {:<8} {:<8} {:<8} {}",
            channel.user_id,
            channel.chat_id,
            channel.enabled,
            channel.price_alerts,
            channel.large_buys,
            channel.fee_ready
        );
    }

    if channels.is_empty() {
        println!("No channels configured.");
    }
    println!();
    Ok(())
}

/// One-shot price lookup
pub async fn price(config: &Config, mint: &str) -> Result<()> {
    parse_pubkey(mint)?;
    let oracle = build_oracle(&config.price)?;

    match oracle.price(mint).await? {
        Some(price) => println!("{}: ${} (via {})", mint, message::format_price(price), oracle.name()),
        None => println!("{}: no price available", mint),
    }
    Ok(())
}

pub async fn risk(config: &Config, mint: &str) -> Result<()> {
    parse_pubkey(mint)?;
    let chain: Arc<dyn ChainSource> = Arc::new(solana_chain(config));
    let dexscreener =
        DexScreenerClient::with_timeout(Duration::from_millis(config.price.timeout_ms));
    let report = RiskChecker::new(chain, Some(dexscreener)).check(mint).await?;

    println!("\n=== RISK REPORT ===\n");
    println!("Mint:             {}", report.mint);
    println!("Supply:           {:.0} (decimals {})", report.supply, report.decimals);
    println!(
        "Mint authority:   {}",
        report.mint_authority.as_deref().unwrap_or("renounced")
    );
    println!(
        "Freeze authority: {}",
        report.freeze_authority.as_deref().unwrap_or("renounced")
    );
    println!("Top holder:       {:.2}%", report.top_holder_pct);
    println!("Top 10 holders:   {:.2}%", report.top10_pct);
    match report.liquidity_usd {
        Some(usd) => println!("Liquidity:        ${:.0}", usd),
        None => println!("Liquidity:        unknown"),
    }
    println!();
    println!("Score: {}/100 ({})", report.score, report.level);
    for flag in &report.flags {
        println!("  - {} (+{})", flag, flag.points());
    }
    println!();
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check RPC, price oracle and Telegram reachability
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;

    print!("RPC Endpoint... ");
    match check_rpc(config).await {
        Ok((slot, latency)) => println!("OK (slot {}, {}ms)", slot, latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Price oracle... ");
    match check_oracle(config).await {
        Ok(latency) => println!("OK ({}ms)", latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Telegram... ");
    if config.telegram.is_configured() {
        match check_telegram(config).await {
            Ok(username) => println!("OK (@{})", username),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    } else {
        println!("NOT CONFIGURED (notifications will be logged)");
    }

    print!("Store... ");
    match open_store(config).await {
        Ok(store) => {
            let alerts = store.active_alerts().await?.len();
            let tokens = store.token_configs().await?.len();
            println!("OK ({} pending alerts, {} watched tokens)", alerts, tokens);
        }
        Err(e) => {
            println!("FAILED: {:#}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}

async fn check_rpc(config: &Config) -> Result<(u64, u64)> {
    let chain = solana_chain(config);

    let start = Instant::now();
    let slot = chain.slot().await?;
    let latency = start.elapsed().as_millis() as u64;

    Ok((slot, latency))
}

async fn check_oracle(config: &Config) -> Result<u64> {
    // Wrapped SOL always has a price
    const WSOL: &str = "So11111111111111111111111111111111111111112";

    let oracle = build_oracle(&config.price)?;
    let start = Instant::now();
    match oracle.price(WSOL).await? {
        Some(_) => Ok(start.elapsed().as_millis() as u64),
        None => bail!("{} returned no price for SOL", oracle.name()),
    }
}

async fn check_telegram(config: &Config) -> Result<String> {
    let notifier = TelegramNotifier::new(
        config.telegram.bot_token.clone(),
        config.telegram.api_base.clone(),
    )?;
    Ok(notifier.get_me().await?)
}
