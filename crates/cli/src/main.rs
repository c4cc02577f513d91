//! Token price oracle
//!
//! Command-line entry point. This is the process boundary: "no price" is
//! rendered as `unavailable`, malformed input fails the command.

mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use oracle_core::{
    format_pnl, format_price, ChainId, OracleConfig, PositionPnLInput, TokenPriceData,
};
use oracle_feed::{PriceStreamManager, StreamEvent, TokenPriceService};

use crate::args::{Cli, Command, PnlArgs, PriceArgs};

const UNAVAILABLE: &str = "unavailable";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = OracleConfig::load().context("Failed to load configuration")?;
    info!("Starting price oracle v{} ({})", env!("CARGO_PKG_VERSION"), config.digest());

    let service = Arc::new(
        TokenPriceService::from_config(&config).context("Failed to build HTTP client")?,
    );

    match cli.cmd {
        Command::Price(args) => price(&service, args, cli.json).await,
        Command::Prices { ids } => {
            let prices = service.get_multiple_prices(&ids).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&prices)?);
            } else {
                for id in &ids {
                    println!("{}", render_line(&id.to_string(), prices.get(&id.to_string())));
                }
            }
            Ok(())
        }
        Command::Aggregate { symbol, chain } => aggregate(&service, &symbol, chain, cli.json).await,
        Command::Pnl(args) => pnl(&service, args, cli.json).await,
        Command::Stream { ids, interval_ms } => {
            let interval = interval_ms.map(Duration::from_millis);
            stream(Arc::clone(&service), &config, ids, interval, cli.json).await
        }
        Command::Health => health(&service, cli.json).await,
        Command::Chains => chains(&service, cli.json).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn render_line(label: &str, price: Option<&TokenPriceData>) -> String {
    match price {
        Some(p) => format!(
            "{label}: ${} via {} ({} confidence) on {}",
            format_price(p.price_usd),
            p.source,
            p.confidence,
            p.chain
        ),
        None => format!("{label}: {UNAVAILABLE}"),
    }
}

async fn price(service: &TokenPriceService, args: PriceArgs, json: bool) -> anyhow::Result<()> {
    let result = service
        .get_price(&args.symbol, args.pair.as_deref(), args.chain)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", render_line(&args.symbol, result.as_ref()));
    if let Some(p) = result {
        if let Some(liquidity) = p.liquidity_usd {
            println!("  liquidity: ${liquidity:.2}");
        }
        if let Some(volume) = p.volume_24h {
            println!("  volume 24h: ${volume:.2}");
        }
    }
    Ok(())
}

async fn aggregate(
    service: &TokenPriceService,
    symbol: &str,
    chain: Option<ChainId>,
    json: bool,
) -> anyhow::Result<()> {
    let Some(aggregated) = service.get_aggregated_price(symbol, chain).await? else {
        println!("{symbol}: {UNAVAILABLE}");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregated)?);
        return Ok(());
    }

    println!(
        "{} ({}) on {}",
        aggregated.token.symbol, aggregated.token.address, aggregated.token.chain
    );
    for quote in &aggregated.quotes {
        if quote.success {
            println!(
                "  {:<22} ${:<20} liquidity {}",
                quote.source,
                format_price(quote.effective_price()),
                quote
                    .liquidity
                    .map(|l| format!("${l:.0}"))
                    .unwrap_or_else(|| "-".to_string())
            );
        } else {
            println!(
                "  {:<22} failed: {}",
                quote.source,
                quote.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    match &aggregated.best {
        Some(best) => println!("best: {} ${}", best.source, format_price(best.effective_price())),
        None => println!("best: {UNAVAILABLE}"),
    }
    match aggregated.weighted_average {
        Some(avg) => println!("weighted average: ${}", format_price(avg)),
        None => println!("weighted average: {UNAVAILABLE}"),
    }

    let stats = &aggregated.statistics;
    println!(
        "stats: n={} min={} max={} median={} stddev={:.6} spread={:.3}%",
        stats.count,
        format_price(stats.min),
        format_price(stats.max),
        format_price(stats.median),
        stats.std_dev,
        stats.spread_percent()
    );
    for opp in &aggregated.arbitrage {
        println!(
            "arbitrage: buy {} @ {} -> sell {} @ {} ({:.3}%)",
            opp.buy_from,
            format_price(opp.buy_price),
            opp.sell_to,
            format_price(opp.sell_price),
            opp.profit_percent
        );
    }
    Ok(())
}

async fn pnl(service: &TokenPriceService, args: PnlArgs, json: bool) -> anyhow::Result<()> {
    let mut input = PositionPnLInput::new(&args.id, &args.entry, &args.margin, &args.leverage, !args.short);
    if let Some(liquidation) = &args.liquidation {
        input = input.with_liquidation_price(liquidation);
    }

    let Some(result) = service.calculate_position_pnl(&input).await? else {
        println!("{} PnL: {UNAVAILABLE}", args.id);
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let display = result.display();
    println!("{} {} x{}", args.id, result.side, result.leverage);
    println!("  entry:    ${}", display.entry_price);
    println!("  current:  ${}", display.current_price);
    println!("  exposure: ${:.2}", result.total_exposure);
    println!("  size:     {:.6}", result.token_amount);
    println!("  value:    ${}", format_pnl(result.current_value).trim_start_matches('+'));
    println!("  PnL:      {} ({})", display.unrealized_pnl, display.unrealized_pnl_percentage);
    if let Some(liquidation) = result.liquidation_price {
        println!("  liquidation: ${}", format_price(liquidation));
    }
    Ok(())
}

async fn stream(
    service: Arc<TokenPriceService>,
    config: &OracleConfig,
    ids: Vec<oracle_core::TokenIdentifier>,
    interval: Option<Duration>,
    json: bool,
) -> anyhow::Result<()> {
    let manager = PriceStreamManager::new(service, config.stream.clone());
    let (handle, mut events) = manager.start_stream(ids, interval);
    info!(stream = %handle, "Press Ctrl+C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    StreamEvent::Update { identifier, price } => {
                        if json {
                            println!("{}", serde_json::to_string(&price)?);
                        } else {
                            println!("{}", render_line(&identifier, Some(&price)));
                        }
                    }
                    StreamEvent::Error { identifier, message } => {
                        match identifier {
                            Some(id) => println!("{}", render_line(&id, None)),
                            None => warn!(error = %message, "Stream cycle failed"),
                        }
                    }
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    manager.stop_all();
    info!("Stream stopped");
    Ok(())
}

async fn health(service: &TokenPriceService, json: bool) -> anyhow::Result<()> {
    let stats = service.stats();
    let status = match service.internal_aggregator() {
        Some(internal) => match internal.health().await {
            Ok(health) => Some(health),
            Err(e) => {
                warn!(error = %e, "Internal aggregator health check failed");
                None
            }
        },
        None => None,
    };

    if json {
        let body = serde_json::json!({
            "internal_aggregator": status,
            "enabled_sources": stats.enabled_sources,
            "cached_prices": stats.cached_prices,
            "cached_tokens": stats.cached_tokens,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match status {
        Some(h) => println!(
            "internal aggregator: {} ({})",
            h.status,
            if h.is_healthy() { "healthy" } else { "degraded" }
        ),
        None => println!("internal aggregator: {UNAVAILABLE}"),
    }
    println!("enabled sources: {}", stats.enabled_sources.join(", "));
    println!("cached: {} prices, {} tokens", stats.cached_prices, stats.cached_tokens);
    Ok(())
}

async fn chains(service: &TokenPriceService, json: bool) -> anyhow::Result<()> {
    let chains = match service.internal_aggregator() {
        Some(internal) => match internal.supported_chains().await {
            Ok(chains) if !chains.is_empty() => chains,
            Ok(_) => ChainId::ALL.to_vec(),
            Err(e) => {
                warn!(error = %e, "Could not list aggregator chains, showing built-in registry");
                ChainId::ALL.to_vec()
            }
        },
        None => ChainId::ALL.to_vec(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&chains)?);
        return Ok(());
    }

    for chain in chains {
        println!("{:<10} id={:<6} network={}", chain.name(), chain.chain_id(), chain.market_data_network());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}
