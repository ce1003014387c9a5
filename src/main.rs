use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warden::config::WardenConfig;
use warden::frontdoor::Limiters;
use warden::ratelimit::{Identity, SlidingWindowLimiter};

/// Per-identity admission control for the chat and HTTP front doors.
#[derive(Debug, Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum Door {
    Chat,
    Api,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run both limiters and report janitor activity until interrupted
    Serve {
        /// Seconds between status reports
        #[arg(long, default_value_t = 60)]
        report_interval: u64,
    },
    /// Issue a burst of admissions against one door and print each decision
    Probe {
        #[arg(long, value_enum, default_value_t = Door::Chat)]
        door: Door,

        /// Chat user id, or the client IPv4 address as an integer for the API door
        #[arg(long, default_value_t = 1)]
        identity: u64,

        /// Number of admissions to attempt
        #[arg(long, default_value_t = 12)]
        requests: u32,
    },
}

/// One line of `probe` output.
#[derive(Debug, Serialize)]
struct ProbeDecision {
    door: Door,
    identity: u64,
    attempt: u32,
    admitted: bool,
    remaining_minute: u64,
    remaining_hour: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = WardenConfig::load(cli.config.as_deref())?;
    info!(
        chat_per_minute = config.chat.requests_per_minute,
        api_per_minute = config.api.requests_per_minute,
        "Configuration loaded"
    );

    let limiters = Limiters::from_config(&config);

    match cli.command {
        Command::Serve { report_interval } => serve(&limiters, report_interval).await,
        Command::Probe {
            door,
            identity,
            requests,
        } => probe(&limiters, door, identity, requests)?,
    }

    limiters.shutdown_and_wait().await;
    info!("Warden stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve(limiters: &Limiters, report_interval: u64) {
    info!("Starting Warden admission control");

    let mut ticker = tokio::time::interval(Duration::from_secs(report_interval.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                report("chat", limiters.chat_limiter());
                report("api", limiters.api_limiter());
            }
        }
    }
}

fn report(door: &str, limiter: &SlidingWindowLimiter) {
    let last_sweep = limiter.last_sweep();
    info!(
        door,
        tracked = limiter.tracked_identities(),
        janitor_running = limiter.is_janitor_running(),
        last_sweep_at = ?last_sweep.as_ref().map(|r| r.swept_at),
        last_evicted = last_sweep.as_ref().map_or(0, |r| r.evicted),
        "Limiter status"
    );
}

fn probe(limiters: &Limiters, door: Door, raw: u64, requests: u32) -> anyhow::Result<()> {
    let (limiter, identity) = match door {
        Door::Chat => (limiters.chat_limiter(), Identity::new(raw)),
        Door::Api => {
            let addr = IpAddr::V4(Ipv4Addr::from(raw as u32));
            (limiters.api_limiter(), Identity::from_ip(addr))
        }
    };

    for attempt in 1..=requests {
        let admitted = limiter.allow(identity);
        let decision = ProbeDecision {
            door,
            identity: raw,
            attempt,
            admitted,
            remaining_minute: limiter.remaining_minute(identity),
            remaining_hour: limiter.remaining_hour(identity),
        };
        println!("{}", serde_json::to_string(&decision)?);
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
