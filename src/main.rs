use log::{error, info, warn};
use tokio::time::sleep;

use airpods_status::acquisition::{Acquisition, RetryPolicy};
use airpods_status::beacon::AdvertisementWindow;
use airpods_status::bluetooth::BluetoothScanner;
use airpods_status::config::StatusConfig;
use airpods_status::error::ScanError;
use airpods_status::models::DecodedStatus;
use airpods_status::sink::Sink;
use airpods_status::utils::{format_datetime, now_local};

fn emit(sink: &Sink, status: &DecodedStatus) {
    if let Err(e) = sink.emit(status) {
        warn!("Failed to write status: {}", e);
    }
}

async fn main_loop(config: StatusConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting AirPods status service");

    let sink = config.sink();

    let scanner =
        match BluetoothScanner::new(config.adapter_name.as_deref(), config.scan_duration).await {
            Ok(scanner) => scanner,
            Err(e) => {
                error!("Failed to initialise Bluetooth: {}", e);
                emit(
                    &sink,
                    &DecodedStatus::AdapterError {
                        captured_at: now_local(),
                    },
                );
                return Err(e.into());
            }
        };
    info!(
        "Scanning for {} ms per attempt",
        scanner.scan_duration().as_millis()
    );

    let acquisition = Acquisition::new(
        scanner,
        AdvertisementWindow::new(config.window_horizon),
        config.validator(),
        RetryPolicy::from_config(&config),
    );

    loop {
        let status = acquisition.acquire().await;
        emit(&sink, &status);

        match &status {
            DecodedStatus::Found(report) => info!(
                "{} at {}: left {}%, right {}%, case {}%",
                report.model.name(),
                format_datetime(&report.captured_at),
                report.charge.left,
                report.charge.right,
                report.charge.case
            ),
            DecodedStatus::AdapterError { .. } => {
                return Err(ScanError::AdapterUnavailable(
                    "adapter lost while scanning".to_string(),
                )
                .into());
            }
            other => info!("No reading this cycle: {}", other.model_name()),
        }

        sleep(config.update_interval).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match StatusConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
                std::process::exit(1);
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
