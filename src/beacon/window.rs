/// Arbitration between overlapping advertisements from nearby devices
use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::models::RawAdvertisement;

pub const DEFAULT_HORIZON: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct WindowEntry {
    observed_at: Instant,
    advertisement: RawAdvertisement,
}

/// Time-bounded history of recently observed advertisements
///
/// Entries older than the horizon are purged lazily on every `observe`,
/// measured against the timestamp of the advertisement being observed.
#[derive(Debug)]
pub struct AdvertisementWindow {
    horizon: Duration,
    entries: VecDeque<WindowEntry>,
}

impl Default for AdvertisementWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON)
    }
}

impl AdvertisementWindow {
    pub fn new(horizon: Duration) -> Self {
        AdvertisementWindow {
            horizon,
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `ad` and return the advertisement that should be validated next
    ///
    /// The winner is the strongest signal in the window, first seen wins ties.
    /// When the winner comes from the same device as `ad`, `ad` itself is
    /// returned so the freshest payload of that device is used.
    pub fn observe(&mut self, ad: RawAdvertisement) -> RawAdvertisement {
        let now = ad.observed_at;
        self.entries.push_back(WindowEntry {
            observed_at: now,
            advertisement: ad.clone(),
        });

        let horizon = self.horizon;
        let before = self.entries.len();
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.observed_at) <= horizon);
        if self.entries.len() != before {
            debug!("Expired {} advertisements", before - self.entries.len());
        }

        let mut strongest: Option<&RawAdvertisement> = None;
        for entry in &self.entries {
            match strongest {
                Some(best) if best.rssi >= entry.advertisement.rssi => {}
                _ => strongest = Some(&entry.advertisement),
            }
        }

        match strongest {
            Some(best) if best.address != ad.address => {
                debug!(
                    "Strongest beacon is {} ({} dBm), not {} ({} dBm)",
                    best.address, best.rssi, ad.address, ad.rssi
                );
                best.clone()
            }
            _ => ad,
        }
    }
}
