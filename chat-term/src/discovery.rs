//! Discovery adapter: wraps the device enumeration capability for scan-and-pick and connect-by-name.

use std::future::Future;
use std::io;

use chat_core::{find_by_name, DiscoveredDevice};

/// Device enumeration capability. One call = one scan; blocking until it completes.
pub trait Scanner: Send + Sync + 'static {
    fn scan(&self) -> impl Future<Output = io::Result<Vec<DiscoveredDevice>>> + Send;
}

/// Scanner over a fixed device table (from config). Stands in for radio/LAN enumeration.
#[derive(Debug, Clone, Default)]
pub struct StaticScanner {
    devices: Vec<DiscoveredDevice>,
}

impl StaticScanner {
    pub fn new(devices: Vec<DiscoveredDevice>) -> Self {
        Self { devices }
    }
}

impl Scanner for StaticScanner {
    async fn scan(&self) -> io::Result<Vec<DiscoveredDevice>> {
        Ok(self.devices.clone())
    }
}

pub struct Discovery<S> {
    scanner: S,
}

impl<S: Scanner> Discovery<S> {
    pub fn new(scanner: S) -> Self {
        Self { scanner }
    }

    /// Fresh scan every call; emission order, no caching, no dedup.
    pub async fn scan(&self) -> io::Result<Vec<DiscoveredDevice>> {
        let devices = self.scanner.scan().await?;
        tracing::debug!(count = devices.len(), "Scan finished");
        Ok(devices)
    }

    /// Fresh scan, then first case-insensitive name match. `Ok(None)` means not found.
    pub async fn find_by_name(&self, name: &str) -> io::Result<Option<DiscoveredDevice>> {
        let devices = self.scan().await?;
        Ok(find_by_name(&devices, name).cloned())
    }
}
