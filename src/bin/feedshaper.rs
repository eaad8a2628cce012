//! feedshaper CLI: run the engine, inspect history, try the matcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use feedshaper::adapter::PlatformRegistry;
use feedshaper::config::Config;
use feedshaper::engine::FeedEngine;
use feedshaper::history::{HistoryStore, JsonlHistory};
use feedshaper::jitter::SeededJitter;
use feedshaper::model::ContentItem;
use feedshaper::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "feedshaper", about = "Keyword-driven engagement simulator")]
struct Cli {
    /// TOML config file; FEEDSHAPER_* variables override it
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine until Ctrl-C
    Run {
        /// Override the configured platform
        #[arg(long)]
        platform: Option<String>,
        /// Override the configured keywords (comma-separated)
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        /// Override the worker count
        #[arg(long)]
        workers: Option<usize>,
        /// Override the speed factor
        #[arg(long)]
        speed: Option<f64>,
        /// Seed for reproducible jitter
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show aggregate history stats
    Stats {
        /// Also list per-run totals
        #[arg(long)]
        sessions: bool,
    },
    /// Check a title against the configured keywords
    Match {
        title: String,
        #[arg(long, default_value = "")]
        author: String,
        /// Tags, comma-separated
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            platform,
            keywords,
            workers,
            speed,
            seed,
        } => {
            let mut config = Config::read(cli.config.as_deref())?;
            if let Some(platform) = platform {
                config.platform = platform;
            }
            if !keywords.is_empty() {
                config.keywords = keywords;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(speed) = speed {
                config.speed_factor = speed;
            }
            if seed.is_some() {
                config.rng_seed = seed;
            }
            config.validate()?;
            cmd_run(config).await
        }
        Command::Stats { sessions } => {
            let config = Config::read(cli.config.as_deref())?;
            cmd_stats(&config.history_dir, sessions).await
        }
        Command::Match {
            title,
            author,
            tags,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_match(&config, title, author, tags)
        }
    }
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "feedshaper".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let platform = PlatformRegistry::builtin().build(&config)?;
    let history = JsonlHistory::open(&config.history_dir).await?;
    let jitter = SeededJitter::from_seed(config.rng_seed);

    let engine = FeedEngine::new(&config, platform, Arc::new(history), Arc::new(jitter));

    let ctrl = engine.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("interrupt received, shutting down");
        ctrl.shutdown();
    });

    let summary = engine.run().await;

    println!("Session:    {}", summary.session_id);
    println!("Cycles:     {}", summary.cycles);
    println!("Admitted:   {}", summary.admitted);
    println!(
        "Tasks:      {} completed, {} failed, {} skipped",
        summary.pool.completed, summary.pool.failed, summary.pool.skipped
    );
    println!(
        "Reported:   {:.0}s over {:.0}s real",
        summary.stats.reported_secs, summary.stats.real_secs
    );
    if summary.discarded > 0 {
        println!("Discarded:  {} queued task(s)", summary.discarded);
    }
    if summary.aborted_workers > 0 {
        println!("Aborted:    {} worker(s)", summary.aborted_workers);
    }
    Ok(())
}

async fn cmd_stats(history_dir: &Path, sessions: bool) -> anyhow::Result<()> {
    let history = JsonlHistory::open(history_dir).await?;
    let stats = history.aggregate_stats().await;

    if stats.total_sessions == 0 {
        println!("No sessions recorded in {}.", history_dir.display());
        return Ok(());
    }

    println!("Sessions:   {}", stats.total_sessions);
    println!("Completed:  {}", stats.completed);
    println!("Failed:     {}", stats.failed);
    println!("Reported:   {:.0}s", stats.total_reported_secs);
    println!("Real:       {:.0}s", stats.total_real_secs);

    for (title, counts) in [
        ("KEYWORD", &stats.by_keyword),
        ("SOURCE", &stats.by_source),
        ("DAY", &stats.by_day),
        ("AUTHOR", &stats.by_author),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!("\n{title:<30}  COUNT");
        println!("{}", "-".repeat(38));
        for (key, count) in counts {
            let key = if key.is_empty() { "-" } else { key.as_str() };
            println!("{key:<30}  {count}");
        }
    }

    if sessions {
        println!(
            "\n{:<8}  {:<9}  {:<6}  {:<9}  STARTED",
            "RUN", "SESSIONS", "FAILED", "REPORTED"
        );
        println!("{}", "-".repeat(60));
        for id in history.session_ids() {
            let run = history.session_stats(id).await;
            let started = run
                .first_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<8}  {:<9}  {:<6}  {:<9}  {}",
                &id.to_string()[..8],
                run.sessions,
                run.failed,
                format!("{:.0}s", run.reported_secs),
                started
            );
        }
    }

    Ok(())
}

fn cmd_match(
    config: &Config,
    title: String,
    author: String,
    tags: Vec<String>,
) -> anyhow::Result<()> {
    let matcher = config.matcher();
    let item = ContentItem::new("-", title).author(author).tags(tags);
    let matched = matcher.matches(&item);

    println!("Mode:       {:?}", matcher.mode());
    println!("Keywords:   {}", matcher.keywords().join(", "));
    if matched.is_empty() {
        println!("Result:     no match");
    } else {
        println!("Result:     match [{}]", matched.join(", "));
    }
    Ok(())
}
