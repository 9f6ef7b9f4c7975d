use anyhow::{anyhow, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{info, warn};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

mod config;
mod error;
mod monitors;
mod notifiers;
mod runner;
mod utils;

use config::{AppConfig, Credentials, Paths};
use monitors::{
    bandsintown::BandsintownFeed, ticketmaster::TicketmasterFeed, CountdownMonitor,
    EventListMonitor, Monitor,
};
use notifiers::twilio::TwilioNotifier;
use notifiers::Notifier;
use runner::{watch_shutdown, Runner};

/// Timeout applied to every outbound HTTP request
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Watches storefront countdowns and artist tour-date feeds, alerting by SMS
#[derive(Parser)]
#[command(name = "tour_monitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "/app/config/config.json")]
    config: PathBuf,

    /// Directory holding per-monitor state documents
    #[arg(long, value_name = "DIR", default_value = "/app/data")]
    data_dir: PathBuf,

    /// Directory holding per-monitor log files
    #[arg(long, value_name = "DIR", default_value = "/app/logs")]
    log_dir: PathBuf,

    /// Override the configured check interval (seconds)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment variables and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let cli = Cli::parse();

    let paths = Paths {
        data_dir: cli.data_dir,
        log_dir: cli.log_dir,
    };
    utils::ensure_dir(&paths.data_dir)?;
    utils::ensure_dir(&paths.log_dir)?;

    let config = AppConfig::load(&cli.config);
    let credentials = Credentials::from_env();

    let client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

    let notifier: Arc<dyn Notifier> = Arc::new(TwilioNotifier::new(credentials.twilio.clone(), client.clone()));
    if notifier.is_enabled() {
        info!("✅ Twilio SMS notifications enabled");
    } else {
        warn!("⚠️  Twilio not configured - SMS notifications disabled");
    }

    let monitors = build_monitors(&config, &credentials, &paths, &client)?;
    let interval = Duration::from_secs(cli.interval.unwrap_or(config.check_interval));
    let mut runner = Runner::new(monitors, notifier, interval);

    if cli.once {
        runner.initialize().await;
        let (_tx, rx) = watch::channel(false);
        let detected = runner.run_cycle(&rx).await;
        info!("Single check finished, {} monitor(s) reported new data", detected);
        return Ok(());
    }

    runner.run(watch_shutdown()).await
}

/// Enabled monitors, in the order they are checked each cycle
fn build_monitors(
    config: &AppConfig,
    credentials: &Credentials,
    paths: &Paths,
    client: &Client,
) -> Result<Vec<Box<dyn Monitor>>> {
    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();

    if config.taylor_swift_enabled {
        monitors.push(Box::new(CountdownMonitor::new(
            "taylor_swift",
            "Taylor Swift",
            &config.countdown_url,
            client.clone(),
            paths,
        )?));
    }

    if config.bandsintown_enabled && !config.bandsintown_artists.is_empty() {
        monitors.push(Box::new(EventListMonitor::new(
            Box::new(BandsintownFeed::new(client.clone())),
            config.bandsintown_artists.clone(),
            paths,
        )));
    }

    if config.ticketmaster_enabled {
        match &credentials.ticketmaster_api_key {
            Some(api_key) => monitors.push(Box::new(EventListMonitor::new(
                Box::new(TicketmasterFeed::new(client.clone(), api_key)),
                config.ticketmaster_artists.clone(),
                paths,
            ))),
            None => warn!("Ticketmaster enabled but SECRET_TICKETMASTER_API_KEY is not set"),
        }
    }

    Ok(monitors)
}
