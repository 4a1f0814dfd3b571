/// One scan → arbitrate → validate → decode cycle with bounded retry
use log::{debug, info, log};
use std::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::beacon::{decode, AdvertisementWindow, BeaconValidator};
use crate::bluetooth::AdvertisementSource;
use crate::config::StatusConfig;
use crate::error::{AcquireError, ScanError};
use crate::models::{DecodedStatus, HexPayload};
use crate::utils::{now_local, retry_with_backoff};

// Extra time a scan may take beyond its discovery duration before it is abandoned
const SCAN_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
    pub scan_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StatusConfig) -> Self {
        RetryPolicy {
            attempts: config.scan_attempts,
            delay: config.retry_delay,
            scan_timeout: config.scan_duration + SCAN_TIMEOUT_SLACK,
        }
    }
}

/// Owns the advertisement window and drives a source through one cycle at a time
pub struct Acquisition<S> {
    source: S,
    window: Mutex<AdvertisementWindow>,
    validator: BeaconValidator,
    policy: RetryPolicy,
}

impl<S: AdvertisementSource> Acquisition<S> {
    pub fn new(
        source: S,
        window: AdvertisementWindow,
        validator: BeaconValidator,
        policy: RetryPolicy,
    ) -> Self {
        Acquisition {
            source,
            window: Mutex::new(window),
            validator,
            policy,
        }
    }

    /// Run one cycle and report its outcome as data
    ///
    /// Retries up to the policy's attempt count when no beacon is found or the
    /// scan fails transiently. An unavailable adapter is not retried.
    pub async fn acquire(&self) -> DecodedStatus {
        let result = retry_with_backoff(
            self.policy.attempts,
            self.policy.delay,
            AcquireError::is_retryable,
            move |attempt| self.attempt(attempt),
        )
        .await;

        match result {
            Ok(hex) => {
                let status = decode(&hex);
                if let DecodedStatus::UnknownModel { raw, .. } = &status {
                    info!("Unrecognised model in beacon {}", raw);
                }
                status
            }
            Err(AcquireError::Scan(ScanError::AdapterUnavailable(_))) => {
                DecodedStatus::AdapterError {
                    captured_at: now_local(),
                }
            }
            Err(e) => {
                debug!("Giving up after {} attempts: {}", self.policy.attempts, e);
                DecodedStatus::NotFound {
                    captured_at: now_local(),
                }
            }
        }
    }

    async fn attempt(&self, attempt: usize) -> Result<HexPayload, AcquireError> {
        let result = self.scan_and_select(attempt).await;
        if let Err(e) = &result {
            log!(e.log_level(), "Attempt {} failed: {}", attempt, e);
        }
        result
    }

    async fn scan_and_select(&self, attempt: usize) -> Result<HexPayload, AcquireError> {
        let advertisements = match timeout(self.policy.scan_timeout, self.source.scan()).await {
            Ok(scanned) => scanned?,
            Err(_) => return Err(ScanError::Timeout(self.policy.scan_timeout.as_millis()).into()),
        };
        debug!(
            "Attempt {}: {} advertisements scanned",
            attempt,
            advertisements.len()
        );

        let mut window = self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for ad in advertisements {
            let best = window.observe(ad);
            if let Some(hex) = self.validator.candidate_payload(&best) {
                debug!("Selected beacon from {} at {} dBm", best.address, best.rssi);
                return Ok(hex);
            }
        }

        Err(AcquireError::NoCandidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Model, RawAdvertisement};
    use bluer::Address;
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::time::Instant;

    const POD: Address = Address([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
    const PHONE: Address = Address([0x70, 0x80, 0x90, 0xA0, 0xB0, 0xC0]);

    // AirPods Pro, left 95%, right 75%, case 75%
    const BEACON: &str = "0719010e202b79370004a1f2b3c4d5e6f7001122334455667788aa";

    /// Source that replays scripted scan results, one per call
    struct ScriptedSource {
        scans: RefCell<VecDeque<Result<Vec<RawAdvertisement>, ScanError>>>,
        calls: Cell<usize>,
    }

    impl ScriptedSource {
        fn new(scans: Vec<Result<Vec<RawAdvertisement>, ScanError>>) -> Self {
            ScriptedSource {
                scans: RefCell::new(scans.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl AdvertisementSource for ScriptedSource {
        async fn scan(&self) -> Result<Vec<RawAdvertisement>, ScanError> {
            self.calls.set(self.calls.get() + 1);
            self.scans.borrow_mut().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn bytes_of(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }

    fn ad(address: Address, rssi: i16, payload: Vec<u8>) -> RawAdvertisement {
        RawAdvertisement {
            address,
            rssi,
            manufacturer_data: HashMap::from([(76, payload)]),
            observed_at: Instant::now(),
        }
    }

    fn acquisition(source: ScriptedSource) -> Acquisition<ScriptedSource> {
        Acquisition::new(
            source,
            AdvertisementWindow::default(),
            BeaconValidator::default(),
            RetryPolicy {
                attempts: 5,
                delay: Duration::ZERO,
                scan_timeout: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test]
    async fn test_decodes_strongest_valid_beacon() {
        let source = ScriptedSource::new(vec![Ok(vec![
            ad(PHONE, -70, vec![0x10, 0x05]),
            ad(POD, -50, bytes_of(BEACON)),
        ])]);
        let acquisition = acquisition(source);

        match acquisition.acquire().await {
            DecodedStatus::Found(report) => {
                assert_eq!(report.model, Model::AirPodsPro);
                assert_eq!(report.charge.left, 95);
                assert_eq!(report.charge.right, 75);
                assert_eq!(report.raw.as_str(), BEACON);
            }
            other => panic!("expected Found, got {:?}", other),
        }
        assert_eq!(acquisition.source.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_beacon_appears() {
        let source = ScriptedSource::new(vec![
            Ok(vec![]),
            Ok(vec![ad(POD, -90, bytes_of(BEACON))]),
            Ok(vec![ad(POD, -55, bytes_of(BEACON))]),
        ]);
        let acquisition = acquisition(source);

        assert_eq!(acquisition.acquire().await.status_code(), 1);
        assert_eq!(acquisition.source.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_not_found_after_bounded_attempts() {
        let acquisition = acquisition(ScriptedSource::new(vec![]));

        let status = acquisition.acquire().await;
        assert!(matches!(status, DecodedStatus::NotFound { .. }));
        assert_eq!(acquisition.source.calls.get(), 5);
    }

    #[tokio::test]
    async fn test_transient_scan_errors_are_retried() {
        let source = ScriptedSource::new(vec![
            Err(ScanError::Timeout(10)),
            Ok(vec![ad(POD, -55, bytes_of(BEACON))]),
        ]);
        let acquisition = acquisition(source);

        assert_eq!(acquisition.acquire().await.status_code(), 1);
        assert_eq!(acquisition.source.calls.get(), 2);
    }

    /// Source whose first scan hangs well past any scan time box
    struct StallingSource {
        calls: Cell<usize>,
    }

    impl AdvertisementSource for StallingSource {
        async fn scan(&self) -> Result<Vec<RawAdvertisement>, ScanError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == 1 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(vec![ad(POD, -55, bytes_of(BEACON))])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_scan_is_abandoned_and_retried() {
        let acquisition = Acquisition::new(
            StallingSource {
                calls: Cell::new(0),
            },
            AdvertisementWindow::default(),
            BeaconValidator::default(),
            RetryPolicy {
                attempts: 5,
                delay: Duration::ZERO,
                scan_timeout: Duration::from_secs(1),
            },
        );

        let status = acquisition.acquire().await;
        assert!(matches!(status, DecodedStatus::Found(_)));
        assert_eq!(acquisition.source.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_adapter_loss_is_not_retried() {
        let source = ScriptedSource::new(vec![Err(ScanError::AdapterUnavailable(
            "powered off".into(),
        ))]);
        let acquisition = acquisition(source);

        let status = acquisition.acquire().await;
        assert!(matches!(status, DecodedStatus::AdapterError { .. }));
        assert_eq!(status.status_code(), -1);
        assert_eq!(acquisition.source.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_unknown_model_is_reported_without_retry() {
        let mut unknown = BEACON.as_bytes().to_vec();
        unknown[7] = b'b';
        let unknown = std::str::from_utf8(&unknown).unwrap().to_string();

        let source = ScriptedSource::new(vec![Ok(vec![ad(POD, -50, bytes_of(&unknown))])]);
        let acquisition = acquisition(source);

        let status = acquisition.acquire().await;
        assert!(matches!(status, DecodedStatus::UnknownModel { .. }));
        assert_eq!(status.status_code(), 0);
        assert_eq!(acquisition.source.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_stronger_non_beacon_blocks_weaker_pod_in_same_scan() {
        // The phone is strongest in the window, so the pod's beacon is not
        // returned by arbitration until the phone's entry no longer wins.
        let source = ScriptedSource::new(vec![Ok(vec![
            ad(PHONE, -30, bytes_of(BEACON)[..20].to_vec()),
            ad(POD, -50, bytes_of(BEACON)),
        ])]);
        let acquisition = acquisition(source);

        assert!(matches!(
            acquisition.acquire().await,
            DecodedStatus::NotFound { .. }
        ));
    }
}
