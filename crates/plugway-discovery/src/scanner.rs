//! Scan coordinator: LAN discovery merged into the location cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plugway_bridge::{BridgeError, BridgeTransport};
use plugway_core::{CatalogError, DeviceId, DiscoveredDevice};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::registry::{DeviceCatalog, LocationCache};

/// Extra time granted to a discovery run beyond its own timeout
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Bridge scan failed: {0}")]
    Bridge(#[from] BridgeError),
    #[error("Discovery failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("Discovery did not finish within {0}s")]
    TimedOut(u64),
    #[error("No device catalog available: {0}")]
    Catalog(#[from] CatalogError),
}

/// The LAN discovery primitive
///
/// Implementations are not expected to tolerate concurrent runs; the
/// coordinator guarantees there is never more than one.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Listen for `timeout` and return every device that responded
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError>;
}

#[async_trait]
impl Discovery for BridgeTransport {
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        Ok(BridgeTransport::scan(self, timeout).await?)
    }
}

/// What to do when a periodic scan fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the periodic loop and hand the error to the caller
    #[default]
    Exit,
    /// Log the failure and keep scanning
    Continue,
}

/// A managed device seen by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedDevice {
    pub name: Option<String>,
    pub ip: IpAddr,
    pub version: String,
}

/// Result of a completed scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Catalog devices that responded, with their new addresses
    pub devices: BTreeMap<DeviceId, ScannedDevice>,
    /// Responding devices that are not in the catalog
    pub unmanaged: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// Another scan was running; nothing was done
    AlreadyInProgress,
}

/// Holds the in-progress flag; releases it when dropped, even on panic
struct ScanGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ScanGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Coordinates discovery runs and merges their results
pub struct ScanCoordinator {
    discovery: Arc<dyn Discovery>,
    catalog: Arc<DeviceCatalog>,
    locations: Arc<LocationCache>,
    scanning: AtomicBool,
    grace: Duration,
}

impl ScanCoordinator {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        catalog: Arc<DeviceCatalog>,
        locations: Arc<LocationCache>,
    ) -> Self {
        Self {
            discovery,
            catalog,
            locations,
            scanning: AtomicBool::new(false),
            grace: DEFAULT_GRACE,
        }
    }

    /// Override the extra time a discovery run may take past its timeout
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Whether a scan is running right now
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Run one scan unless another is already in progress
    pub async fn trigger_scan(&self, timeout: Duration) -> Result<ScanOutcome, ScanError> {
        let Some(_guard) = ScanGuard::claim(&self.scanning) else {
            debug!("Scan already in progress, not starting another");
            return Ok(ScanOutcome::AlreadyInProgress);
        };

        info!(timeout_secs = timeout.as_secs(), "Starting discovery scan");

        let found = tokio::time::timeout(timeout + self.grace, self.discovery.scan(timeout))
            .await
            .map_err(|_| ScanError::TimedOut((timeout + self.grace).as_secs()))??;

        debug!("Discovery returned {} devices", found.len());

        let catalog = match self.catalog.load().await {
            Ok(catalog) => catalog,
            Err(e) => match self.catalog.current().await {
                Some(previous) => {
                    warn!(error = %e, "Merging scan against previously loaded catalog");
                    previous
                }
                None => return Err(e.into()),
            },
        };

        let mut devices = BTreeMap::new();
        let mut updates = Vec::new();
        let mut unmanaged = 0;

        for device in found {
            match catalog.get(device.id.as_str()) {
                Some(entry) => {
                    updates.push((device.id.clone(), device.ip));
                    devices.insert(
                        device.id,
                        ScannedDevice {
                            name: entry.name.clone(),
                            ip: device.ip,
                            version: entry.version.clone(),
                        },
                    );
                }
                None => {
                    debug!(device = %device.id, ip = %device.ip, "Ignoring device not in catalog");
                    unmanaged += 1;
                }
            }
        }

        self.locations.merge(updates).await;

        info!(
            "Scan complete: {} managed devices found, {} unmanaged",
            devices.len(),
            unmanaged
        );

        Ok(ScanOutcome::Completed(ScanReport {
            devices,
            unmanaged,
            completed_at: Utc::now(),
        }))
    }

    /// Scan every `every`, forever
    ///
    /// Ticks that land while a manual scan is running are skipped. With
    /// [`FailurePolicy::Exit`] the first failed scan ends the loop and its
    /// error is returned; the caller is expected to treat that as fatal.
    pub async fn run_periodic(
        &self,
        every: Duration,
        timeout: Duration,
        policy: FailurePolicy,
    ) -> Result<(), ScanError> {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = every.as_secs(), ?policy, "Periodic scanner started");

        loop {
            ticker.tick().await;

            match self.trigger_scan(timeout).await {
                Ok(ScanOutcome::Completed(_)) => {}
                Ok(ScanOutcome::AlreadyInProgress) => {
                    debug!("Skipping periodic scan, manual scan in progress");
                }
                Err(e) => match policy {
                    FailurePolicy::Exit => {
                        error!(error = %e, "Periodic scan failed");
                        return Err(e);
                    }
                    FailurePolicy::Continue => {
                        warn!(error = %e, "Periodic scan failed, will retry");
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ReloadPolicy;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn found(id: &str, last: u8) -> DiscoveredDevice {
        DiscoveredDevice {
            id: DeviceId::from(id),
            ip: ip(last),
        }
    }

    /// Scripted discovery that records how many runs overlap
    #[derive(Default)]
    struct FakeDiscovery {
        results: Mutex<Vec<Result<Vec<DiscoveredDevice>, String>>>,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Option<Duration>,
        started: Notify,
        gate: Option<Notify>,
    }

    impl FakeDiscovery {
        fn returning(results: Vec<Result<Vec<DiscoveredDevice>, String>>) -> Self {
            Self {
                results: Mutex::new(results),
                ..Default::default()
            }
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Notify::new());
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Discovery for FakeDiscovery {
        async fn scan(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            self.started.notify_one();

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            let next = if results.len() > 1 {
                results.remove(0)
            } else {
                results.first().cloned().unwrap_or_else(|| Ok(Vec::new()))
            };
            next.map_err(DiscoveryError::Failed)
        }
    }

    struct Fixture {
        _dir: TempDir,
        path: std::path::PathBuf,
        discovery: Arc<FakeDiscovery>,
        locations: Arc<LocationCache>,
        coordinator: Arc<ScanCoordinator>,
    }

    fn fixture(discovery: FakeDiscovery) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(
            &path,
            r#"{
                "A": {"name": "lamp", "local_key": "key-a"},
                "B": {"name": "fan", "local_key": "key-b", "version": "3.3"}
            }"#,
        )
        .unwrap();

        let discovery = Arc::new(discovery);
        let catalog = Arc::new(DeviceCatalog::new(&path, ReloadPolicy::Always));
        let locations = Arc::new(LocationCache::new());
        let coordinator = Arc::new(
            ScanCoordinator::new(discovery.clone(), catalog, locations.clone())
                .with_grace(Duration::from_secs(1)),
        );

        Fixture {
            _dir: dir,
            path,
            discovery,
            locations,
            coordinator,
        }
    }

    fn completed(outcome: ScanOutcome) -> ScanReport {
        match outcome {
            ScanOutcome::Completed(report) => report,
            ScanOutcome::AlreadyInProgress => panic!("expected a completed scan"),
        }
    }

    #[tokio::test]
    async fn test_merge_ignores_unknown_devices() {
        let fx = fixture(FakeDiscovery::returning(vec![Ok(vec![
            found("A", 5),
            found("Z", 99),
        ])]));

        let before = Utc::now();
        let report = completed(fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap());

        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.unmanaged, 1);
        assert!(report.completed_at >= before && report.completed_at <= Utc::now());
        let lamp = &report.devices[&DeviceId::from("A")];
        assert_eq!(lamp.name.as_deref(), Some("lamp"));
        assert_eq!(lamp.ip, ip(5));

        assert_eq!(fx.locations.get("A").await, Some(ip(5)));
        assert_eq!(fx.locations.get("Z").await, None);
    }

    #[tokio::test]
    async fn test_merge_overwrites_and_keeps_absent() {
        let fx = fixture(FakeDiscovery::returning(vec![
            Ok(vec![found("A", 5), found("B", 6)]),
            Ok(vec![found("A", 7)]),
        ]));

        fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap();
        fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap();

        assert_eq!(fx.locations.get("A").await, Some(ip(7)));
        // B did not respond the second time but keeps its address
        assert_eq!(fx.locations.get("B").await, Some(ip(6)));
    }

    #[tokio::test]
    async fn test_second_scan_while_first_running_is_busy() {
        let fx = fixture(FakeDiscovery::returning(vec![Ok(vec![found("A", 5)])]).gated());

        let coordinator = fx.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.trigger_scan(Duration::from_secs(60)).await });

        fx.discovery.started.notified().await;
        assert!(fx.coordinator.is_scanning());

        let second = fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(second, ScanOutcome::AlreadyInProgress));

        fx.discovery.gate.as_ref().unwrap().notify_one();
        let report = completed(first.await.unwrap().unwrap());
        assert_eq!(report.devices.len(), 1);

        assert_eq!(fx.discovery.calls(), 1);
        assert!(!fx.coordinator.is_scanning());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_never_overlap() {
        let fx = fixture(
            FakeDiscovery::returning(vec![Ok(vec![found("A", 5)])])
                .delayed(Duration::from_millis(20)),
        );

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coordinator = fx.coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.trigger_scan(Duration::from_secs(1)).await
            }));
        }

        let mut completed = 0;
        let mut busy = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ScanOutcome::Completed(_) => completed += 1,
                ScanOutcome::AlreadyInProgress => busy += 1,
            }
        }

        assert!(completed >= 1);
        assert_eq!(completed + busy, 16);
        assert_eq!(completed, fx.discovery.calls());
        assert_eq!(fx.discovery.max_active.load(Ordering::SeqCst), 1);
        assert!(!fx.coordinator.is_scanning());
    }

    #[tokio::test]
    async fn test_failure_releases_flag() {
        let fx = fixture(FakeDiscovery::returning(vec![
            Err("listener bind failed".to_string()),
            Ok(vec![found("A", 5)]),
        ]));

        let result = fx.coordinator.trigger_scan(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ScanError::Discovery(DiscoveryError::Failed(_)))));
        assert!(!fx.coordinator.is_scanning());

        completed(fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap());
        assert_eq!(fx.discovery.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_overrun_times_out() {
        let fx = fixture(FakeDiscovery::default().delayed(Duration::from_secs(3600)));

        let result = fx.coordinator.trigger_scan(Duration::from_secs(10)).await;
        assert!(matches!(result, Err(ScanError::TimedOut(11))));
        assert!(!fx.coordinator.is_scanning());
    }

    #[tokio::test]
    async fn test_bad_catalog_reload_uses_previous() {
        let fx = fixture(FakeDiscovery::returning(vec![
            Ok(vec![found("A", 5)]),
            Ok(vec![found("B", 6)]),
        ]));
        fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap();

        std::fs::write(&fx.path, "{ broken").unwrap();
        let report = completed(fx.coordinator.trigger_scan(Duration::from_secs(1)).await.unwrap());

        assert!(report.devices.contains_key("B"));
        assert_eq!(fx.locations.get("B").await, Some(ip(6)));
    }

    #[tokio::test]
    async fn test_missing_catalog_fails_scan() {
        let fx = fixture(FakeDiscovery::returning(vec![Ok(vec![found("A", 5)])]));
        std::fs::remove_file(&fx.path).unwrap();

        let result = fx.coordinator.trigger_scan(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ScanError::Catalog(_))));
        assert!(!fx.coordinator.is_scanning());
        assert!(fx.locations.snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_exit_policy_returns_error() {
        let fx = fixture(FakeDiscovery::returning(vec![Err("boom".to_string())]));

        let result = fx
            .coordinator
            .run_periodic(Duration::from_secs(300), Duration::from_secs(10), FailurePolicy::Exit)
            .await;

        assert!(matches!(result, Err(ScanError::Discovery(_))));
        assert_eq!(fx.discovery.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_continue_policy_keeps_scanning() {
        let fx = fixture(FakeDiscovery::returning(vec![Err("boom".to_string())]));

        let coordinator = fx.coordinator.clone();
        let task = tokio::spawn(async move {
            coordinator
                .run_periodic(Duration::from_secs(10), Duration::from_secs(1), FailurePolicy::Continue)
                .await
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(!task.is_finished());
        task.abort();

        // Ticks at 0, 10, 20 and 30 seconds
        assert_eq!(fx.discovery.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_skips_while_manual_scan_runs() {
        let fx = fixture(FakeDiscovery::returning(vec![Ok(vec![found("A", 5)])]).gated());

        let coordinator = fx.coordinator.clone();
        let manual =
            tokio::spawn(async move { coordinator.trigger_scan(Duration::from_secs(3600)).await });
        fx.discovery.started.notified().await;

        let coordinator = fx.coordinator.clone();
        let periodic = tokio::spawn(async move {
            coordinator
                .run_periodic(Duration::from_secs(10), Duration::from_secs(1), FailurePolicy::Exit)
                .await
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(fx.discovery.calls(), 1);

        fx.discovery.gate.as_ref().unwrap().notify_one();
        completed(manual.await.unwrap().unwrap());
        periodic.abort();
    }
}
