/// Bluetooth Low Energy scanning for AirPods advertisements
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::time::Instant;
use tokio::time::{sleep, Duration};

use crate::error::ScanError;
use crate::models::RawAdvertisement;

/// Anything that can produce one batch of advertisements per call
///
/// The acquisition loop only talks to this trait, so it can be driven by a
/// scripted source in tests.
#[allow(async_fn_in_trait)]
pub trait AdvertisementSource {
    async fn scan(&self) -> Result<Vec<RawAdvertisement>, ScanError>;
}

/// bluer-backed scanner bound to one adapter for the life of the process
pub struct BluetoothScanner {
    _session: bluer::Session,
    adapter: bluer::Adapter,
    scan_duration: Duration,
}

impl BluetoothScanner {
    /// Open a session and select the named adapter, or the default one
    ///
    /// # Arguments
    /// * `adapter_name` - e.g. `hci0`; `None` picks the system default
    /// * `scan_duration` - How long each `scan` keeps discovery running
    pub async fn new(
        adapter_name: Option<&str>,
        scan_duration: Duration,
    ) -> Result<Self, ScanError> {
        let session = bluer::Session::new().await.map_err(|e| {
            ScanError::AdapterUnavailable(format!("cannot open Bluetooth session: {}", e))
        })?;

        let adapter = match adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|e| ScanError::AdapterUnavailable(format!("no usable adapter: {}", e)))?;

        info!("Using Bluetooth adapter {}", adapter.name());

        Ok(BluetoothScanner {
            _session: session,
            adapter,
            scan_duration,
        })
    }

    pub fn scan_duration(&self) -> Duration {
        self.scan_duration
    }
}

impl AdvertisementSource for BluetoothScanner {
    /// Run LE discovery for the configured duration and snapshot every device seen
    ///
    /// The adapter is never powered on here; a powered-off adapter is reported
    /// as `ScanError::AdapterUnavailable`.
    async fn scan(&self) -> Result<Vec<RawAdvertisement>, ScanError> {
        let powered = self.adapter.is_powered().await.map_err(|e| {
            ScanError::AdapterUnavailable(format!("cannot read adapter power state: {}", e))
        })?;
        if !powered {
            return Err(ScanError::AdapterUnavailable(format!(
                "adapter {} is powered off",
                self.adapter.name()
            )));
        }

        // LE only, and keep reporting repeated advertisements so RSSI stays fresh
        let filter = bluer::DiscoveryFilter {
            transport: bluer::DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        };

        // Apply the discovery filter (warn if it fails, but continue)
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        let discovery_stream = self.adapter.discover_devices_with_changes().await?;
        let discovery_handle = tokio::spawn(async move {
            let mut stream = discovery_stream;
            while let Some(event) = stream.next().await {
                debug!("Discovery event: {:?}", event);
            }
        });

        sleep(self.scan_duration).await;

        // Snapshot while discovery is still active; BlueZ drops RSSI once it stops
        let snapshot = self.snapshot().await;
        discovery_handle.abort();
        snapshot
    }
}

impl BluetoothScanner {
    async fn snapshot(&self) -> Result<Vec<RawAdvertisement>, ScanError> {
        let mut advertisements = Vec::new();

        for address in self.adapter.device_addresses().await? {
            let device = match self.adapter.device(address) {
                Ok(device) => device,
                Err(_) => continue,
            };

            let rssi = match device.rssi().await {
                Ok(Some(rssi)) => rssi,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Failed to read RSSI for {}: {}", address, e);
                    continue;
                }
            };

            let manufacturer_data = match device.manufacturer_data().await {
                Ok(Some(data)) => data,
                Ok(None) => Default::default(),
                Err(e) => {
                    debug!("Failed to get manufacturer data for {}: {}", address, e);
                    continue;
                }
            };

            advertisements.push(RawAdvertisement {
                address,
                rssi,
                manufacturer_data,
                observed_at: Instant::now(),
            });
        }

        debug!("Scan yielded {} advertisements", advertisements.len());
        Ok(advertisements)
    }
}
