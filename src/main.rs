use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use listing_watcher::core::TargetOrchestrator;
use listing_watcher::scheduler::{PollScheduler, SchedulerExit};
use listing_watcher::scraper::ChromeLauncher;
use listing_watcher::utils::logging;
use listing_watcher::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "listing-watcher", version, about = "Polls marketplace searches and notifies on new listings")]
struct Args {
    /// Directory holding default.toml and its overlays
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Run a single check cycle and exit
    #[arg(long)]
    once: bool,

    /// Validate configuration, print the target catalog and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _ = dotenvy::dotenv();

    let config = match AppConfig::load(&args.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal startup error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: AppConfig) -> Result<ExitCode> {
    if args.check_config {
        print_catalog(&config);
        return Ok(ExitCode::SUCCESS);
    }

    info!("Starting Listing Watcher...");

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()?;
        info!(port = config.metrics.port, "Prometheus exporter listening");
    }

    let targets = config.targets.clone();
    let launcher = ChromeLauncher::new(config.scraper.clone());
    let mut orchestrator = TargetOrchestrator::from_config(&config, launcher);

    for target in &targets {
        info!(
            target = %target.name,
            query = %target.query,
            keywords = ?target.required_keywords,
            channel = %target.channel,
            "Monitoring target"
        );
    }

    if args.once {
        let result = orchestrator.run_cycle(&targets).await;
        orchestrator.shutdown().await;
        return match result {
            Ok(new_listings) => {
                info!(new_listings, "Single check complete");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!("Check failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    orchestrator.announce_startup(&targets).await;

    let scheduler = PollScheduler::from_config(&config.monitor);
    let exit = scheduler.run(&mut orchestrator, &targets, shutdown_signal()).await;

    match exit {
        SchedulerExit::Shutdown => {
            let deadline = config.monitor.shutdown_timeout();
            if tokio::time::timeout(deadline, orchestrator.shutdown()).await.is_err() {
                warn!(timeout_secs = deadline.as_secs(), "Graceful shutdown timed out");
            }
            info!("Listing Watcher stopped");
            Ok(ExitCode::SUCCESS)
        }
        SchedulerExit::HardFault { failures } => {
            error!(failures, "Exiting after hard fault");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_catalog(config: &AppConfig) {
    println!("Configuration OK: {} target(s)", config.targets.len());
    for target in &config.targets {
        let keywords = if target.required_keywords.is_empty() {
            "-".to_string()
        } else {
            target.required_keywords.join(", ")
        };
        println!(
            "  {} | query: {} | keywords: {} | channel: {} | store: {}",
            target.name,
            target.query,
            keywords,
            target.channel,
            target.store_key()
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
