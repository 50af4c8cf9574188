//! Modemprobe - cable modem detection and login client
//!
//! Thin wrapper over the detection engine: supplies a base URL and
//! credentials, prints what was found. All real logic lives in the library.

use anyhow::Result;
use clap::Parser;
use modemprobe::config::Config;
use modemprobe::detect::{BreakerConfig, Detector};
use modemprobe::models::Credentials;
use modemprobe::CatalogIndex;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modemprobe")]
#[command(about = "Detect and authenticate a cable modem management interface", long_about = None)]
struct Args {
    /// Base URL of the device, e.g. http://192.168.100.1
    base_url: String,

    /// Username for protected devices
    #[arg(short, long)]
    username: Option<String>,

    /// Password for protected devices
    #[arg(short, long)]
    password: Option<String>,

    /// Profile catalog directory (default: from config)
    #[arg(long)]
    catalog: Option<String>,

    /// Profile name from a previous successful detection, tried first
    #[arg(long)]
    hint: Option<String>,

    /// Config file path (default: config.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = Config::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    tracing::info!("Modemprobe v0.3.0 - Cable Modem Detection");
    tracing::info!("=========================================");

    let catalog_dir = args
        .catalog
        .as_deref()
        .unwrap_or(&cfg.detection.catalog_dir);
    let catalog = CatalogIndex::load(Path::new(catalog_dir));
    tracing::info!("Catalog: {} profiles from {}", catalog.len(), catalog_dir);

    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        (None, None) => None,
        _ => {
            anyhow::bail!("--username and --password must be given together");
        }
    };

    let detector = Detector::new(&catalog)
        .with_breaker(BreakerConfig {
            max_attempts: cfg.detection.max_attempts,
            max_elapsed: Duration::from_secs(cfg.detection.max_elapsed_secs),
        })
        .with_timeouts(
            Duration::from_secs(cfg.http.timeout),
            Duration::from_secs(cfg.http.connect_timeout),
            Duration::from_secs(cfg.http.probe_timeout),
        );

    match detector
        .detect(&args.base_url, credentials.as_ref(), args.hint.as_deref())
        .await
    {
        Ok(detection) => {
            let profile = &detection.profile;
            println!("Detected: {} ({})", profile.name, profile.manufacturer);
            println!("Model: {}", profile.model);
            println!("Auth: {}", detection.session.kind().name());
            if !profile.capabilities.is_empty() {
                let caps: Vec<&str> =
                    profile.capabilities.iter().map(String::as_str).collect();
                println!("Capabilities: {}", caps.join(", "));
            }
            println!(
                "Fetched resources: {}",
                detection
                    .session
                    .resources()
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            detection.session.close().await;
            Ok(())
        }
        Err(e) => {
            eprintln!("Detection failed: {}", e);
            for (i, step) in e.troubleshooting().iter().enumerate() {
                eprintln!("  {}. {}", i + 1, step);
            }
            Err(e.into())
        }
    }
}
