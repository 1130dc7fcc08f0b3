use anyhow::{Context, Result};
use chrono::NaiveDate;
use mlb_edge::config::{Config, MetricSchema};
use mlb_edge::feed::mlb_stats::MlbStatsApi;
use mlb_edge::feed::odds_api::TheOddsApi;
use mlb_edge::feed::stats_csv::CsvStatsFeed;
use mlb_edge::pipeline::{self, Orchestrator, OrchestratorConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

struct CliArgs {
    date: Option<NaiveDate>,
    bankroll: f64,
    config_path: PathBuf,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs {
        date: None,
        bankroll: 1000.0,
        config_path: PathBuf::from("config.toml"),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--date" | "-d" => {
                let value = iter.next().context("--date requires a YYYY-MM-DD value")?;
                args.date = Some(
                    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .with_context(|| format!("invalid date: {value}"))?,
                );
            }
            "--bankroll" | "-b" => {
                let value = iter.next().context("--bankroll requires a value")?;
                args.bankroll = value
                    .parse::<f64>()
                    .with_context(|| format!("invalid bankroll: {value}"))?;
                if args.bankroll <= 0.0 {
                    anyhow::bail!("bankroll must be positive");
                }
            }
            "--config" | "-c" => {
                args.config_path = PathBuf::from(iter.next().context("--config requires a path")?);
            }
            "--help" | "-h" => {
                println!(
                    "usage: mlb-edge [--date YYYY-MM-DD] [--bankroll DOLLARS] [--config PATH]"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Config::load_env_file();
    let args = parse_args()?;
    let config = Config::load(&args.config_path)?;

    // Game day defaults to today in Eastern time, where the slate lives.
    let eastern = chrono::FixedOffset::west_opt(5 * 3600).unwrap();
    let date = args
        .date
        .unwrap_or_else(|| chrono::Utc::now().with_timezone(&eastern).date_naive());

    let odds_api_key = Config::odds_api_key()?;

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::from(&config),
        MetricSchema::pitchers(config.stats_feed.min_ip),
        MetricSchema::hitters(config.stats_feed.min_pa),
        Box::new(MlbStatsApi::new(&config.games_feed.base_url)),
        Box::new(TheOddsApi::new(
            odds_api_key,
            &config.odds_feed.base_url,
            &config.odds_feed.bookmakers,
        )),
        Box::new(CsvStatsFeed::pitchers(&config.stats_feed.pitcher_dir)),
        Box::new(CsvStatsFeed::hitters(&config.stats_feed.hitter_dir)),
    )?;

    let run_id = orchestrator
        .run_blocking(date, args.bankroll)
        .await
        .context("failed to start pipeline run")?;

    let run = orchestrator
        .status(Some(run_id))
        .context("run vanished from history")?;

    println!("{}", serde_json::to_string_pretty(&run)?);

    match run.status {
        pipeline::RunStatus::Completed => Ok(()),
        other => anyhow::bail!("pipeline run {run_id} ended with status {other:?}"),
    }
}
