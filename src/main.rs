// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trail Keeper - attach and watch trailing stop-losses on open positions.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use trail_keeper::journal::OrderJournal;
use trail_keeper::rpc::{HttpTrailService, Identity, TrailService};
use trail_keeper::telegram::TelegramNotifier;
use trail_keeper::trail::{BatchResult, RegistryView};
use trail_keeper::{
    Config, CoordinatorConfig, Position, PositionBook, PositionKey, SelectionSet,
    TrailCoordinator,
};

#[derive(Debug, Parser)]
#[command(name = "trail-keeper", version, about = "Trailing stop-loss client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List open positions.
    Positions,
    /// Place protective stops and start trailing them.
    Trail {
        #[arg(long)]
        trail_points: Decimal,
        /// Positions as EXCHANGE:SYMBOL.
        #[arg(required = true)]
        keys: Vec<PositionKey>,
        /// Keep running and show trail updates.
        #[arg(long)]
        watch: bool,
    },
    /// Stop trailing a position.
    Stop { key: PositionKey },
    /// Follow every trail the service is running until none are left.
    Watch,
    /// Close a position at market.
    Exit { key: PositionKey },
    /// Flip a position at market.
    Reverse { key: PositionKey },
    /// Close every open position at market.
    ExitAll,
    /// Print one trail status snapshot.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::from_env().map_err(|e| anyhow!(e))?;

    info!("📡 Trail service: {}", config.api_url);
    let service: Arc<dyn TrailService> = Arc::new(HttpTrailService::new(&config.rpc_config())?);
    let identity = config.identity();
    if identity.is_none() {
        warn!("No TRAIL_USER_ID set, every request will be refused");
    }

    let journal = OrderJournal::load(&config.journal_file);
    let notifier = TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    );
    let coordinator = TrailCoordinator::new(
        Arc::clone(&service),
        identity.clone(),
        CoordinatorConfig::from_config(&config),
    )
    .with_journal(journal)
    .with_notifier(notifier);

    let result = run(cli.command, &coordinator, service.as_ref(), identity.as_ref()).await;

    coordinator.shutdown().await;
    coordinator.journal().lock().await.log_summary();
    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    result
}

async fn run(
    command: Command,
    coordinator: &TrailCoordinator,
    service: &dyn TrailService,
    identity: Option<&Identity>,
) -> anyhow::Result<()> {
    match command {
        Command::Positions => {
            let book = load_book(service, identity).await?;
            print_positions(&book);
        }
        Command::Trail {
            trail_points,
            keys,
            watch,
        } => {
            let book = load_book(service, identity).await?;
            let mut selection = SelectionSet::new();
            for key in &keys {
                if !selection.contains(key) {
                    selection.toggle(find(&book, key)?.clone());
                }
            }

            let batch = coordinator
                .start_trail_selected(&mut selection, trail_points)
                .await?;
            print_batch(&batch);
            if watch {
                watch_trails(coordinator).await?;
            }
            if batch.unprotected().next().is_some() {
                bail!("some protective orders are live without a trail");
            }
        }
        Command::Stop { key } => match coordinator.stop_trail(&key).await? {
            Some(entry) => println!(
                "⏹️ Stopped {} (trigger {}, {} updates)",
                key, entry.trigger_price, entry.update_count
            ),
            None => println!("⏹️ Stop sent for {}", key),
        },
        Command::Watch => {
            let report = coordinator.sync_now().await?;
            info!("Following {} running trail(s)", report.adopted.len());
            watch_trails(coordinator).await?;
        }
        Command::Exit { key } => {
            let book = load_book(service, identity).await?;
            let order_id = coordinator.exit_position(find(&book, &key)?).await?;
            println!("🚪 Exit order {} placed for {}", order_id, key);
        }
        Command::Reverse { key } => {
            let book = load_book(service, identity).await?;
            let order_id = coordinator.reverse_position(find(&book, &key)?).await?;
            println!("🔄 Reversal order {} placed for {}", order_id, key);
        }
        Command::ExitAll => {
            let summary = coordinator.exit_all_positions().await?;
            println!(
                "🚪 Exit all: {} total, {} successful, {} failed",
                summary.total, summary.successful, summary.failed
            );
            for result in &summary.results {
                match (&result.order_id, &result.error) {
                    (Some(id), _) if result.success => println!("   ✅ {} order {}", result.symbol, id),
                    (_, Some(err)) => println!("   ❌ {} {}", result.symbol, err),
                    _ => println!("   {} success={}", result.symbol, result.success),
                }
            }
        }
        Command::Status => {
            coordinator.sync_now().await?;
            print_view(&coordinator.view().await);
        }
    }
    Ok(())
}

async fn load_book(
    service: &dyn TrailService,
    identity: Option<&Identity>,
) -> anyhow::Result<PositionBook> {
    let identity = identity.context("TRAIL_USER_ID is required to read positions")?;
    let mut book = PositionBook::new();
    book.refresh(service, identity).await?;
    Ok(book)
}

fn find<'a>(book: &'a PositionBook, key: &PositionKey) -> anyhow::Result<&'a Position> {
    book.get(key)
        .ok_or_else(|| anyhow!("no open position for {}", key))
}

/// Render the registry until nothing is live or Ctrl-C.
async fn watch_trails(coordinator: &TrailCoordinator) -> anyhow::Result<()> {
    coordinator.ensure_reconciler().await;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                let view = coordinator.view().await;
                print_view(&view);
                if view.live_count() == 0 {
                    info!("No live trails left");
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_positions(book: &PositionBook) {
    println!("{:<20} {:>8} {:>12} {:>12} {:>12}", "POSITION", "QTY", "AVG", "LTP", "P&L");
    for p in book.all() {
        println!(
            "{:<20} {:>8} {:>12} {:>12} {:>12}",
            p.key().to_string(),
            p.quantity,
            p.average_price,
            p.last_price,
            p.pnl().round_dp(2)
        );
    }
    println!("Total P&L: {}", book.total_pnl().round_dp(2));
}

fn print_batch(batch: &BatchResult) {
    for outcome in batch.outcomes() {
        match &outcome.result {
            Ok(placed) => println!(
                "✅ {} {} x{} trigger {} limit {} (order {})",
                outcome.key,
                placed.transaction_type,
                placed.quantity,
                placed.prices.trigger,
                placed.prices.limit,
                placed.order_id
            ),
            Err(e) if outcome.is_unprotected() => println!("🚨 {}", e),
            Err(e) => println!("❌ {}: {}", outcome.key, e),
        }
    }
    println!("{} started, {} failed", batch.succeeded(), batch.failed());
}

fn print_view(view: &RegistryView) {
    println!(
        "Ticker: {}",
        if view.ticker_connected { "connected" } else { "disconnected" }
    );
    for t in &view.trails {
        println!(
            "{:<20} {:<9?} trigger {:>10} limit {:>10} ltp {:>10} pnl {:>10} updates {}",
            t.key.to_string(),
            t.status,
            t.trigger_price,
            t.limit_price,
            t.current_price.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            t.pnl.map(|p| p.round_dp(2).to_string()).unwrap_or_else(|| "-".into()),
            t.update_count
        );
    }
    for log in view.logs.iter().take(5) {
        println!("  [{}] {}", log.time, log.msg);
    }
}
