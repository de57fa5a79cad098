// Command line entry point for the trade impact simulator

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use trade_impact_sim::bench::run_benchmark;
use trade_impact_sim::logging::init_logging;
use trade_impact_sim::progress::Spinner;
use trade_impact_sim::replay::replay_files;
use trade_impact_sim::runner::run_all;
use trade_impact_sim::sink::{EstimateSink, JsonLinesSink, LogSink, MultiSink};
use trade_impact_sim::{Config, Side, SimulatorError};

#[derive(Parser)]
#[command(name = "impact-sim")]
#[command(about = "Real-time trade cost estimator for L2 order book feeds")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Stream live order books and emit cost estimates
    Run {
        /// Symbols to track, overriding the config (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Order quantity in base units
        #[arg(short, long)]
        quantity: Option<f64>,
        /// buy or sell
        #[arg(long)]
        side: Option<Side>,
        #[arg(long)]
        fee_tier: Option<String>,
        /// Also append estimates to this JSON-lines file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Log every Nth estimate
        #[arg(long, default_value = "10")]
        log_every: u64,
    },
    /// Replay recorded JSON-lines order book files
    Replay {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        quantity: Option<f64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        no_progress: bool,
    },
    /// Time feature extraction, impact and the full pipeline cycle
    Bench {
        #[arg(short, long, default_value = "10000")]
        iterations: usize,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        error!("{}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), SimulatorError> {
    match cli.command {
        Commands::Init { force } => {
            if cli.config.exists() && !force {
                warn!("⚠️  {} already exists, use --force to overwrite", cli.config.display());
                return Ok(());
            }
            Config::default().to_file(&cli.config)?;
            info!("📁 Wrote default config to {}", cli.config.display());
        }
        Commands::Run {
            symbols,
            quantity,
            side,
            fee_tier,
            output,
            log_every,
        } => {
            let mut config = Config::load_or_create(&cli.config)?;
            if !symbols.is_empty() {
                config.feed.symbols = symbols;
            }
            if let Some(quantity) = quantity {
                config.order.quantity = quantity;
            }
            if let Some(side) = side {
                config.order.side = side;
            }
            if let Some(tier) = fee_tier {
                config.order.fee_tier = tier;
            }
            config.validate()?;

            let sink = build_sink(log_every, output)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("🛑 Ctrl-C received, shutting down");
                    let _ = shutdown_tx.send(true);
                }
            });

            let results = run_all(Arc::new(config), sink, shutdown_rx).await;
            for (symbol, result) in results {
                match result {
                    Ok(stats) => info!(
                        "✅ {}: {} estimates, {} refits, {} budget overruns",
                        symbol,
                        stats.estimates_emitted,
                        stats.slippage_refits + stats.classifier_refits,
                        stats.budget_overruns
                    ),
                    Err(e) => warn!("❌ {}: {}", symbol, e),
                }
            }
        }
        Commands::Replay {
            files,
            quantity,
            output,
            no_progress,
        } => {
            let mut config = Config::load_or_create(&cli.config)?;
            if let Some(quantity) = quantity {
                config.order.quantity = quantity;
            }
            config.validate()?;

            let sink = build_sink(u64::MAX, output)?;
            let reports = replay_files(&config, &files, sink.as_ref(), !no_progress);
            let failed = reports.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                warn!("⚠️  {} of {} replay(s) failed", failed, reports.len());
            }
        }
        Commands::Bench { iterations, seed } => {
            let config = Config::load_or_create(&cli.config)?;
            let spinner = Spinner::new(&format!("Benchmarking {} iterations...", iterations));
            let report = run_benchmark(&config, iterations, seed)?;
            spinner.finish("Benchmark complete");

            for (name, timing) in [
                ("volatility", &report.volatility),
                ("impact", &report.impact),
                ("pipeline cycle", &report.pipeline),
            ] {
                info!(
                    "⏱️  {:<15} mean {:>8.2}µs | median {:>8.2}µs | p99 {:>8.2}µs | max {:>8.2}µs",
                    name, timing.mean_us, timing.median_us, timing.p99_us, timing.max_us
                );
            }
            info!(
                "   {} of {} pipeline cycles over the {}µs budget",
                report.budget_overruns, report.iterations, config.pipeline.latency_budget_us
            );
        }
    }

    Ok(())
}

fn build_sink(log_every: u64, output: Option<PathBuf>) -> Result<Arc<dyn EstimateSink>, SimulatorError> {
    let mut sinks: Vec<Box<dyn EstimateSink>> = vec![Box::new(LogSink::new(log_every))];
    if let Some(path) = output {
        sinks.push(Box::new(JsonLinesSink::create(&path)?));
        info!("📝 Writing estimates to {}", path.display());
    }
    Ok(Arc::new(MultiSink::new(sinks)))
}
