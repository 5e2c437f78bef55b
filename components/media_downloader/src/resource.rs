// components/media_downloader/src/resource.rs
//! Device resource sampling and the pause/throttle decision derived from it.
//!
//! Sampling runs on its own interval and only ever writes a cached
//! snapshot; [`ResourceGate::assess`] reads that cache and never blocks.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::Disks;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;
const TERMUX_BATTERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePolicy {
    Proceed,
    /// Keep going with smaller chunks and no new concurrent work
    Throttle,
    /// Stop moving bytes until conditions improve
    Pause,
}

pub trait ResourceGate: Send + Sync {
    fn assess(&self) -> ResourcePolicy;
}

/// Gate for environments without resource constraints
pub struct AlwaysProceed;

impl ResourceGate for AlwaysProceed {
    fn assess(&self) -> ResourcePolicy {
        ResourcePolicy::Proceed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceThresholds {
    pub memory_pause_floor_bytes: u64,
    pub memory_warning_bytes: u64,
    pub battery_pause_floor_percent: u8,
    pub battery_warning_percent: u8,
    pub disk_pause_floor_bytes: u64,
    pub disk_warning_bytes: u64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            memory_pause_floor_bytes: 100 * MIB,
            memory_warning_bytes: 256 * MIB,
            battery_pause_floor_percent: 15,
            battery_warning_percent: 30,
            disk_pause_floor_bytes: 200 * MIB,
            disk_warning_bytes: GIB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryState {
    pub percent: u8,
    pub charging: bool,
}

/// One sample of device state. `None` means the signal is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub available_memory_bytes: Option<u64>,
    pub battery: Option<BatteryState>,
    pub network_up: Option<bool>,
    /// Free space on the fullest filesystem downloads are written to
    pub available_disk_bytes: Option<u64>,
}

impl ResourceThresholds {
    /// Unavailable signals never pause or throttle
    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> ResourcePolicy {
        let discharging = snapshot.battery.filter(|b| !b.charging);

        if snapshot.network_up == Some(false) {
            return ResourcePolicy::Pause;
        }
        if snapshot
            .available_memory_bytes
            .is_some_and(|m| m < self.memory_pause_floor_bytes)
        {
            return ResourcePolicy::Pause;
        }
        if discharging.is_some_and(|b| b.percent < self.battery_pause_floor_percent) {
            return ResourcePolicy::Pause;
        }
        if snapshot
            .available_disk_bytes
            .is_some_and(|d| d < self.disk_pause_floor_bytes)
        {
            return ResourcePolicy::Pause;
        }

        let memory_low = snapshot
            .available_memory_bytes
            .is_some_and(|m| m < self.memory_warning_bytes);
        let battery_low = discharging.is_some_and(|b| b.percent < self.battery_warning_percent);
        let disk_low = snapshot
            .available_disk_bytes
            .is_some_and(|d| d < self.disk_warning_bytes);

        if memory_low || battery_low || disk_low {
            ResourcePolicy::Throttle
        } else {
            ResourcePolicy::Proceed
        }
    }
}

#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn sample(&self) -> ResourceSnapshot;
}

/// Caches the latest sample and answers [`ResourceGate::assess`] from it
pub struct ResourceMonitor {
    probe: Arc<dyn ResourceProbe>,
    thresholds: ResourceThresholds,
    snapshot: RwLock<Option<ResourceSnapshot>>,
    last_policy: Mutex<Option<ResourcePolicy>>,
}

impl ResourceMonitor {
    pub fn new(probe: Arc<dyn ResourceProbe>, thresholds: ResourceThresholds) -> Self {
        Self {
            probe,
            thresholds,
            snapshot: RwLock::new(None),
            last_policy: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Option<ResourceSnapshot> {
        *self.snapshot.read()
    }

    /// Take a fresh sample and cache it
    pub async fn refresh(&self) -> ResourcePolicy {
        let sample = self.probe.sample().await;
        *self.snapshot.write() = Some(sample);

        let policy = self.thresholds.evaluate(&sample);
        let previous = self.last_policy.lock().replace(policy);
        if previous != Some(policy) {
            match policy {
                ResourcePolicy::Proceed => info!(?sample, "resources ok"),
                ResourcePolicy::Throttle => warn!(?sample, "resources low, throttling downloads"),
                ResourcePolicy::Pause => warn!(?sample, "resources critical, pausing downloads"),
            }
        }
        policy
    }

    /// Sample every `interval` until `cancel` fires
    pub fn spawn_sampler(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                monitor.refresh().await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("resource sampler stopped");
        })
    }
}

impl ResourceGate for ResourceMonitor {
    fn assess(&self) -> ResourcePolicy {
        match *self.snapshot.read() {
            Some(snapshot) => self.thresholds.evaluate(&snapshot),
            None => ResourcePolicy::Proceed,
        }
    }
}

#[derive(Debug, Clone)]
enum BatterySource {
    Sysfs(PathBuf),
    Termux(PathBuf),
    Unavailable,
}

/// Reads memory, battery, network and storage state from the running system.
///
/// Memory comes from `/proc/meminfo`, network from `/sys/class/net`, and
/// battery from `/sys/class/power_supply` or, on Termux, from
/// `termux-battery-status`. The battery source is chosen once. Free space
/// is read for every directory registered with [`SystemProbe::watching`].
#[derive(Debug, Clone)]
pub struct SystemProbe {
    root: PathBuf,
    battery: BatterySource,
    storage: Vec<PathBuf>,
}

impl SystemProbe {
    pub fn detect() -> Self {
        Self::detect_in("/")
    }

    /// Probe a system tree mounted at `root`
    pub fn detect_in(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let battery = match find_sysfs_battery(&root.join("sys/class/power_supply")) {
            Some(dir) => BatterySource::Sysfs(dir),
            None => match which::which("termux-battery-status") {
                Ok(binary) => BatterySource::Termux(binary),
                Err(_) => BatterySource::Unavailable,
            },
        };
        debug!(?battery, "battery source selected");
        Self {
            root,
            battery,
            storage: Vec::new(),
        }
    }

    /// Also sample free space on the filesystems holding `dirs`
    pub fn watching(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.storage.extend(dirs);
        self
    }

    async fn available_disk(&self) -> Option<u64> {
        if self.storage.is_empty() {
            return None;
        }
        let dirs = self.storage.clone();
        tokio::task::spawn_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            let mounts: Vec<(PathBuf, u64)> = disks
                .list()
                .iter()
                .map(|disk| (disk.mount_point().to_path_buf(), disk.available_space()))
                .collect();
            dirs.iter()
                .filter_map(|dir| {
                    let dir = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
                    free_space_for(&dir, &mounts)
                })
                .min()
        })
        .await
        .ok()
        .flatten()
    }

    async fn available_memory(&self) -> Option<u64> {
        let meminfo = tokio::fs::read_to_string(self.root.join("proc/meminfo")).await.ok()?;
        parse_meminfo(&meminfo)
    }

    async fn battery(&self) -> Option<BatteryState> {
        match &self.battery {
            BatterySource::Sysfs(dir) => {
                let capacity = tokio::fs::read_to_string(dir.join("capacity")).await.ok()?;
                let status = tokio::fs::read_to_string(dir.join("status")).await.unwrap_or_default();
                let percent = capacity.trim().parse::<u8>().ok()?;
                let status = status.trim();
                Some(BatteryState {
                    percent: percent.min(100),
                    charging: status.eq_ignore_ascii_case("charging") || status.eq_ignore_ascii_case("full"),
                })
            }
            BatterySource::Termux(binary) => {
                let output = tokio::time::timeout(TERMUX_BATTERY_TIMEOUT, Command::new(binary).output())
                    .await
                    .ok()?
                    .ok()?;
                if !output.status.success() {
                    return None;
                }
                parse_termux_battery(&output.stdout)
            }
            BatterySource::Unavailable => None,
        }
    }

    async fn network_up(&self) -> Option<bool> {
        let mut entries = tokio::fs::read_dir(self.root.join("sys/class/net")).await.ok()?;
        let mut seen = false;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name() == "lo" {
                continue;
            }
            let Ok(state) = tokio::fs::read_to_string(entry.path().join("operstate")).await else {
                continue;
            };
            seen = true;
            // Tunnels and some mobile links report "unknown" while passing traffic
            if matches!(state.trim(), "up" | "unknown") {
                return Some(true);
            }
        }

        seen.then_some(false)
    }
}

#[async_trait]
impl ResourceProbe for SystemProbe {
    async fn sample(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            available_memory_bytes: self.available_memory().await,
            battery: self.battery().await,
            network_up: self.network_up().await,
            available_disk_bytes: self.available_disk().await,
        }
    }
}

fn find_sysfs_battery(power_supply: &Path) -> Option<PathBuf> {
    std::fs::read_dir(power_supply)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|dir| {
            std::fs::read_to_string(dir.join("type"))
                .map(|t| t.trim() == "Battery")
                .unwrap_or(false)
        })
}

/// Free space of the mount point that most closely contains `dir`
fn free_space_for(dir: &Path, mounts: &[(PathBuf, u64)]) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| dir.starts_with(mount))
        .max_by_key(|(mount, _)| mount.as_os_str().len())
        .map(|(_, available)| *available)
}

/// `MemAvailable` in bytes, falling back to `MemFree` on old kernels
fn parse_meminfo(meminfo: &str) -> Option<u64> {
    let field = |name: &str| {
        meminfo.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kib = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some(kib * 1024)
        })
    };
    field("MemAvailable").or_else(|| field("MemFree"))
}

#[derive(Debug, Deserialize)]
struct TermuxBattery {
    percentage: u8,
    #[serde(default)]
    status: String,
    #[serde(default)]
    plugged: String,
}

fn parse_termux_battery(stdout: &[u8]) -> Option<BatteryState> {
    let battery: TermuxBattery = serde_json::from_slice(stdout).ok()?;
    let status = battery.status.to_ascii_uppercase();
    let plugged = !battery.plugged.is_empty() && !battery.plugged.eq_ignore_ascii_case("UNPLUGGED");

    Some(BatteryState {
        percent: battery.percentage.min(100),
        charging: status == "CHARGING" || status == "FULL" || plugged,
    })
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with scripted policies, then with `fallback`
    pub struct GateStub {
        script: Mutex<VecDeque<ResourcePolicy>>,
        fallback: ResourcePolicy,
        calls: AtomicUsize,
    }

    impl GateStub {
        pub fn new(script: impl IntoIterator<Item = ResourcePolicy>, fallback: ResourcePolicy) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn always(policy: ResourcePolicy) -> Self {
            Self::new([], policy)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ResourceGate for GateStub {
        fn assess(&self) -> ResourcePolicy {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or(self.fallback)
        }
    }

    pub struct ProbeStub(pub Mutex<ResourceSnapshot>);

    #[async_trait]
    impl ResourceProbe for ProbeStub {
        async fn sample(&self) -> ResourceSnapshot {
            *self.0.lock()
        }
    }
}
