//! Development tool for checking Netatmo credentials and gauge discovery.
//!
//! Reads the same environment (and `.env`) as the bridge.
//!
//! Usage:
//!   cargo run --bin netatmo-probe -- stations
//!   cargo run --bin netatmo-probe -- measure --window-minutes 60 --min-speed 15

use chrono::Utc;
use clap::{Parser, Subcommand};
use netatmo_sensor_bridge::config::{self, Config, MeasurementKind};
use netatmo_sensor_bridge::input::netatmo::{NetatmoClient, WeatherApi, resolve};
use netatmo_sensor_bridge::poller::build_query;
use netatmo_sensor_bridge::sensors::aggregator::{aggregate, peak};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "netatmo-probe")]
#[command(about = "Inspect the Netatmo stations and measurements seen by the bridge")]
struct Cli {
    /// Gauge to resolve (defaults to MEASUREMENT_KIND)
    #[arg(long, global = true)]
    kind: Option<MeasurementKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stations and modules, and show which gauge would be bound
    Stations,
    /// Fetch the trailing window once and print the verdict
    Measure {
        /// Override SLIDING_WINDOW_MINUTES
        #[arg(long)]
        window_minutes: Option<u64>,

        /// Override MIN_SPEED
        #[arg(long)]
        min_speed: Option<f64>,
    },
}

fn main() {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let kind = cli.kind.unwrap_or(config.device.kind);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Stations => stations(&config, kind).await,
            Commands::Measure {
                window_minutes,
                min_speed,
            } => {
                let window = window_minutes.unwrap_or(config.polling.window_minutes);
                let threshold = min_speed.unwrap_or(config.polling.min_speed);
                measure(&config, kind, window, threshold).await
            }
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn stations(config: &Config, kind: MeasurementKind) -> netatmo_sensor_bridge::Result<()> {
    let client = NetatmoClient::new(&config.netatmo)?;
    let token = client.authenticate().await?;
    let payload = client.stations(&token).await?;

    if payload.devices.is_empty() {
        println!("No stations on this account");
    }
    for device in &payload.devices {
        println!(
            "Station {} ({})",
            device.id,
            device.station_name.as_deref().unwrap_or("unnamed")
        );
        for module in &device.modules {
            println!(
                "  {:<10} {} ({})",
                module.module_type,
                module.id,
                module.module_name.as_deref().unwrap_or("unnamed")
            );
        }
    }

    match resolve(&payload, kind) {
        Ok(device) => println!("\n{} gauge: {}", kind, device),
        Err(e) => println!("\n{}", e),
    }
    Ok(())
}

async fn measure(
    config: &Config,
    kind: MeasurementKind,
    window_minutes: u64,
    threshold: f64,
) -> netatmo_sensor_bridge::Result<()> {
    let client = NetatmoClient::new(&config.netatmo)?;
    let token = client.authenticate().await?;
    let device = resolve(&client.stations(&token).await?, kind)?;

    let query = build_query(
        device,
        kind,
        Utc::now(),
        Duration::from_secs(window_minutes.saturating_mul(60)),
    );
    println!(
        "Fetching {} for {} since {}",
        kind.measure_type(),
        query.device,
        query.date_begin
    );

    let batch = client.measurements(&token, &query).await?;
    if batch.is_empty() {
        println!("No samples in this window");
    }
    for (i, group) in batch.groups.iter().enumerate() {
        println!("  group {}: {:?}", i, group);
    }
    println!("Samples: {}", batch.sample_count());
    match peak(&batch) {
        Some(value) => println!("Peak: {}", value),
        None => println!("Peak: none"),
    }
    println!(
        "Verdict (> {}): {}",
        threshold,
        if aggregate(&batch, threshold) {
            "detected"
        } else {
            "not detected"
        }
    );
    Ok(())
}
