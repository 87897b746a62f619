use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forecastbot::api::CoinMarketCapClient;
use forecastbot::backtest::{BacktestReport, BacktestRunner};
use forecastbot::execution::{AccountState, DecisionEngine, Driver, RunSummary, StopReason};
use forecastbot::forecast::Forecaster;
use forecastbot::history::PriceHistory;
use forecastbot::Settings;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Command-Line Interface
// ============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about = "Forecast-driven single-asset trading bot")]
struct Cli {
    /// Settings file (TOML); defaults to config/forecastbot.toml if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll live prices and trade until the goal, ruin, or Ctrl+C
    Run {
        /// Seconds between ticks
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Write the ledger report (JSON) here on exit
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Replay the held-out part of a daily price history
    Backtest {
        /// CSV path or URL; defaults to forecast.history_uri
        #[arg(short, long)]
        data: Option<String>,

        /// Write the ledger report (JSON) here
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Run {
            interval,
            max_ticks,
            report,
        } => {
            if let Some(interval) = interval {
                settings.driver.interval_secs = interval;
            }
            if max_ticks.is_some() {
                settings.driver.max_ticks = max_ticks;
            }
            if report.is_some() {
                settings.driver.report_path = report;
            }
            settings.validate()?;

            run_live(&settings).await
        }
        Commands::Backtest { data, report } => {
            if let Some(data) = data {
                settings.forecast.history_uri = data;
            }

            let report_path = report.or_else(|| settings.driver.report_path.clone());
            run_backtest(&settings, report_path.as_deref()).await
        }
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forecastbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============================================================================
// Live Trading
// ============================================================================

async fn run_live(settings: &Settings) -> Result<()> {
    tracing::info!("🚀 forecastbot starting");

    let history = PriceHistory::load(&settings.forecast.history_uri).await?;
    let (train, _) = history.split(settings.forecast.train_fraction)?;

    let mut forecaster = settings.forecast.forecaster();
    forecaster
        .fit(train)
        .context("Failed to train forecaster")?;
    tracing::info!(
        "🔮 Trained {} on {} days; next prediction ${:.2}",
        forecaster.name(),
        train.len(),
        forecaster.predict()?
    );

    let client = CoinMarketCapClient::new(&settings.price_source)?;
    let engine = DecisionEngine::new(settings.engine.clone())?;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {}", settings.price_source.symbol);
    tracing::info!("  Initial Balance: ${:.2}", settings.account.initial_balance);
    tracing::info!("  Goal: ${:.2}", settings.engine.goal);
    tracing::info!(
        "  Minimum Growth: {}% | Stop Loss: {}%",
        settings.engine.minimum_growth * 100.0,
        settings.engine.stop_loss_pct * 100.0
    );
    tracing::info!("  Interval: {}s", settings.driver.interval_secs);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut driver = Driver::new(
        client,
        forecaster,
        engine,
        settings.driver.driver_config(),
    );
    let summary = driver
        .run(AccountState::new(settings.account.initial_balance))
        .await?;

    summary.log();
    if let Some(path) = &settings.driver.report_path {
        write_report(&summary, path)?;
    }

    if let StopReason::ForecastFailed(error) = &summary.stop_reason {
        anyhow::bail!("Trading aborted: {}", error);
    }

    tracing::info!("👋 forecastbot stopped");
    Ok(())
}

// ============================================================================
// Backtest
// ============================================================================

async fn run_backtest(settings: &Settings, report_path: Option<&Path>) -> Result<()> {
    let history = PriceHistory::load(&settings.forecast.history_uri).await?;
    let engine = DecisionEngine::new(settings.engine.clone())?;

    let mut runner = BacktestRunner::new(
        engine,
        settings.forecast.forecaster(),
        settings.forecast.train_fraction,
        settings.account.initial_balance,
    );
    let BacktestReport {
        train_points,
        test_points,
        summary,
        ..
    } = runner.run_and_report(&history)?;

    println!(
        "Trained on {} days, replayed {} of {} test days ({:?})",
        train_points, summary.ticks, test_points, summary.stop_reason
    );
    summary.log();

    if let Some(path) = report_path {
        write_report(&summary, path)?;
    }
    Ok(())
}

fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    let report = summary.ledger.report();
    println!("\n📒 LEDGER ({} transactions)", summary.ledger.len());
    println!("{}", report.to_json()?);
    report.write_json(path)
}
