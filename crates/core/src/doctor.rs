use std::env;
use std::fs;

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

use crate::host::Host;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub hostname: Option<String>,
    pub board_model: Option<String>,
    pub total_memory_bytes: u64,
    pub total_swap_bytes: u64,
    pub disks: Vec<DiskSummary>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSummary {
    pub name: String,
    pub mount_point: String,
    pub file_system: String,
    pub total_space_bytes: u64,
    pub free_space_bytes: u64,
    pub is_removable: bool,
}

pub fn collect_host_info(host: &Host) -> HostInfo {
    let mut system = System::new();
    system.refresh_memory();

    let board_model = read_board_model(host);
    let disks = enumerate_disks();
    let mut notes = Vec::new();
    if board_model.is_none() {
        notes.push("Board model not found in device tree; not a Raspberry Pi?".to_string());
    }
    if disks.is_empty() {
        notes.push("No disks detected by sysinfo.".to_string());
    }
    if !disks.iter().any(|disk| disk.is_removable) {
        notes.push("No removable drive detected; Docker data stays on the SD card.".to_string());
    }
    if !host.is_live() {
        notes.push(format!(
            "Memory and disk figures describe the running machine, not {}.",
            host.root().display()
        ));
    }

    HostInfo {
        os: env::consts::OS.to_string(),
        arch: env::consts::ARCH.to_string(),
        os_version: System::long_os_version(),
        kernel_version: System::kernel_version(),
        hostname: System::host_name(),
        board_model,
        total_memory_bytes: system.total_memory(),
        total_swap_bytes: system.total_swap(),
        disks,
        notes,
    }
}

/// The device-tree model string is NUL terminated.
fn read_board_model(host: &Host) -> Option<String> {
    let raw = fs::read_to_string(host.path("/proc/device-tree/model")).ok()?;
    let model = raw.trim_end_matches('\0').trim().to_string();
    if model.is_empty() {
        None
    } else {
        Some(model)
    }
}

fn enumerate_disks() -> Vec<DiskSummary> {
    let disks = Disks::new_with_refreshed_list();
    let mut summaries = disks
        .list()
        .iter()
        .map(|disk| DiskSummary {
            name: disk.name().to_string_lossy().to_string(),
            mount_point: disk.mount_point().to_string_lossy().to_string(),
            file_system: disk.file_system().to_string_lossy().to_string(),
            total_space_bytes: disk.total_space(),
            free_space_bytes: disk.available_space(),
            is_removable: disk.is_removable(),
        })
        .collect::<Vec<_>>();
    summaries.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    summaries
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{collect_host_info, read_board_model};
    use crate::host::Host;

    #[test]
    fn board_model_strips_trailing_nul() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("proc/device-tree");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("model"), "Raspberry Pi 4 Model B Rev 1.4\0").unwrap();

        let host = Host::with_root(temp.path());
        assert_eq!(
            read_board_model(&host).as_deref(),
            Some("Raspberry Pi 4 Model B Rev 1.4")
        );
    }

    #[test]
    fn offline_root_is_called_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let info = collect_host_info(&Host::with_root(temp.path()));
        assert!(info.board_model.is_none());
        assert!(info.notes.iter().any(|note| note.contains("running machine")));
    }

    #[test]
    fn board_model_absent_off_pi() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(read_board_model(&Host::with_root(temp.path())).is_none());
    }
}
