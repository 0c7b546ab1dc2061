use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Desired-state values for a Docker host. Everything the optimizer writes
/// and the diagnostics compare against comes from here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Profile {
    /// Kernel parameters, persisted to `sysctl_file` and applied live.
    pub sysctl: BTreeMap<String, String>,
    pub sysctl_file: PathBuf,
    /// Firmware settings written to `boot_config_file`.
    pub boot_config: BTreeMap<String, String>,
    pub boot_config_file: PathBuf,
    /// Kernel command line tokens that must be present.
    pub cmdline: Vec<String>,
    pub cmdline_file: PathBuf,
    pub journald: BTreeMap<String, String>,
    pub journald_file: PathBuf,
    /// Top-level keys merged into the Docker daemon configuration.
    pub docker_daemon: Map<String, Value>,
    pub docker_daemon_file: PathBuf,
    pub data_mount: Option<DataMount>,
    pub fstab_file: PathBuf,
    /// Units enabled at boot.
    pub services: Vec<String>,
    /// Where copy-before-write backups go. `None` keeps them beside the file.
    pub backup_dir: Option<PathBuf>,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataMount {
    pub mount_point: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub disk_warn_free_percent: f64,
    pub disk_fail_free_percent: f64,
    pub memory_warn_available_percent: f64,
    pub min_swap_bytes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disk_warn_free_percent: 20.0,
            disk_fail_free_percent: 10.0,
            memory_warn_available_percent: 10.0,
            min_swap_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        let sysctl = [
            ("vm.swappiness", "10"),
            ("vm.vfs_cache_pressure", "50"),
            ("vm.dirty_background_ratio", "5"),
            ("vm.dirty_ratio", "10"),
            ("net.ipv4.ip_forward", "1"),
        ];
        let boot_config = [("gpu_mem", "16"), ("dtoverlay", "disable-bt")];
        let journald = [("SystemMaxUse", "100M"), ("Storage", "persistent")];
        let docker_daemon = json!({
            "log-driver": "json-file",
            "log-opts": { "max-size": "10m", "max-file": "3" },
            "storage-driver": "overlay2",
            "live-restore": true
        });

        Self {
            sysctl: to_map(&sysctl),
            sysctl_file: PathBuf::from("/etc/sysctl.d/99-pitune.conf"),
            boot_config: to_map(&boot_config),
            boot_config_file: PathBuf::from("/boot/firmware/config.txt"),
            cmdline: vec![
                "cgroup_enable=memory".to_string(),
                "cgroup_memory=1".to_string(),
            ],
            cmdline_file: PathBuf::from("/boot/firmware/cmdline.txt"),
            journald: to_map(&journald),
            journald_file: PathBuf::from("/etc/systemd/journald.conf"),
            docker_daemon: docker_daemon.as_object().cloned().unwrap_or_default(),
            docker_daemon_file: PathBuf::from("/etc/docker/daemon.json"),
            data_mount: Some(DataMount {
                mount_point: "/mnt/usb".to_string(),
                options: vec!["noatime".to_string()],
            }),
            fstab_file: PathBuf::from("/etc/fstab"),
            services: vec!["docker".to_string()],
            backup_dir: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl Profile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let profile = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse profile {}", path.display()))?;
        Ok(profile)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize profile")
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
