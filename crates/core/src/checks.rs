use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use sysinfo::{Disks, System};

use crate::collector::{DiagnosticCheck, Finding};
use crate::error::ProbeError;
use crate::formats::Fstab;
use crate::host::Host;
use crate::profile::{Profile, Thresholds};
use crate::targets::{normalize_sysctl, sysctl_path};

const OPTIMIZE_HINT: &str = "Run `pitune optimize` to apply the profile.";

/// Read-only health checks for a Docker host, grouped by category.
pub fn build_checks(profile: &Profile, host: &Host) -> Vec<DiagnosticCheck> {
    let mut checks = vec![docker_cli(host), docker_daemon(host)];
    if !profile.docker_daemon.is_empty() {
        checks.push(docker_daemon_config(profile, host));
    }

    for (key, value) in &profile.sysctl {
        checks.push(sysctl_value(host, key, value));
    }
    checks.push(memory_cgroup(host));

    checks.push(root_disk_space(host, profile.thresholds.clone()));
    if let Some(mount) = &profile.data_mount {
        checks.push(data_mount(host, &mount.mount_point, &mount.options));
        checks.push(data_disk_space(host, &mount.mount_point, profile.thresholds.clone()));
    }

    checks.push(memory_available(host, profile.thresholds.clone()));
    checks.push(swap(host, profile.thresholds.clone()));
    checks
}

fn docker_cli(host: &Host) -> DiagnosticCheck {
    let host = host.clone();
    DiagnosticCheck::new("docker-cli", "docker", move || {
        let path = host.require_tool("docker")?;
        Ok(Finding::pass(format!("docker found at {}", path.display())))
    })
    .required()
    .remediation("Install Docker: curl -fsSL https://get.docker.com | sh")
}

fn docker_daemon(host: &Host) -> DiagnosticCheck {
    let host = host.clone();
    DiagnosticCheck::new("docker-daemon", "docker", move || {
        let docker = host.require_tool("docker")?;
        let output = host
            .run(&docker, &["info", "--format", "{{.ServerVersion}}"])
            .map_err(|err| ProbeError::Command {
                command: "docker info".to_string(),
                detail: err.to_string(),
            })?;
        if output.success {
            Ok(Finding::pass(format!(
                "daemon responding (server {})",
                output.stdout
            )))
        } else {
            Ok(Finding::fail(format!(
                "daemon not responding: {}",
                output.stderr
            )))
        }
    })
    .required()
    .remediation("Start the daemon: sudo systemctl enable --now docker")
}

fn docker_daemon_config(profile: &Profile, host: &Host) -> DiagnosticCheck {
    let path = host.path(&profile.docker_daemon_file);
    let desired = profile.docker_daemon.clone();
    DiagnosticCheck::new("docker-daemon-config", "docker", move || {
        let text = read_required(&path)?;
        let current = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(object)) => object,
            Ok(_) => return Err(ProbeError::malformed(&path, "top-level value is not an object")),
            Err(err) => return Err(ProbeError::malformed(&path, err.to_string())),
        };
        let differing = desired
            .iter()
            .filter(|(key, value)| current.get(*key) != Some(*value))
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        if differing.is_empty() {
            Ok(Finding::pass("daemon.json matches profile"))
        } else {
            Ok(Finding::warn(format!(
                "daemon.json differs from profile: {}",
                differing.join(", ")
            )))
        }
    })
    .remediation(OPTIMIZE_HINT)
}

fn sysctl_value(host: &Host, key: &str, value: &str) -> DiagnosticCheck {
    let path = sysctl_path(host, key);
    let key_label = key.to_string();
    let expected = normalize_sysctl(value);
    DiagnosticCheck::new(format!("sysctl:{key}"), "kernel", move || {
        let current = match fs::read_to_string(&path) {
            Ok(text) => normalize_sysctl(&text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ProbeError::Unsupported {
                    what: format!("kernel parameter {key_label}"),
                })
            }
            Err(err) => return Err(ProbeError::read(&path, err)),
        };
        if current == expected {
            Ok(Finding::pass(format!("{key_label} = {current}")))
        } else {
            Ok(Finding::warn(format!(
                "{key_label} is {current}, expected {expected}"
            )))
        }
    })
    .remediation(OPTIMIZE_HINT)
}

fn memory_cgroup(host: &Host) -> DiagnosticCheck {
    let controllers = host.path("/sys/fs/cgroup/cgroup.controllers");
    let legacy = host.path("/proc/cgroups");
    DiagnosticCheck::new("memory-cgroup", "kernel", move || {
        if let Some(text) = read_optional(&controllers)? {
            return Ok(grade_cgroup_v2(&text));
        }
        match read_optional(&legacy)? {
            Some(text) => Ok(grade_cgroup_v1(&text)),
            None => Err(ProbeError::Missing {
                what: "cgroup hierarchy".to_string(),
            }),
        }
    })
    .remediation("Add `cgroup_enable=memory cgroup_memory=1` to cmdline.txt and reboot.")
}

fn grade_cgroup_v2(controllers: &str) -> Finding {
    if controllers.split_whitespace().any(|name| name == "memory") {
        Finding::pass("memory controller enabled (cgroup v2)")
    } else {
        Finding::warn("memory controller missing; container memory limits are ignored")
    }
}

fn grade_cgroup_v1(table: &str) -> Finding {
    let enabled = table
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .any(|fields| fields.first() == Some(&"memory") && fields.get(3) == Some(&"1"));
    if enabled {
        Finding::pass("memory controller enabled (cgroup v1)")
    } else {
        Finding::warn("memory controller disabled; container memory limits are ignored")
    }
}

fn data_mount(host: &Host, mount_point: &str, options: &[String]) -> DiagnosticCheck {
    let mounts = host.path("/proc/mounts");
    let mount_point = mount_point.to_string();
    let options = options.to_vec();
    DiagnosticCheck::new("data-mount", "storage", move || {
        let table = Fstab::parse(&read_required(&mounts)?);
        Ok(grade_mount(&table, &mount_point, &options))
    })
    .required()
    .remediation("Check the USB drive is attached and listed in /etc/fstab, then `sudo mount -a`.")
}

fn grade_mount(table: &Fstab, mount_point: &str, options: &[String]) -> Finding {
    let Some(entry) = table.entry(mount_point) else {
        return Finding::fail(format!("{mount_point} is not mounted"));
    };
    let missing = options
        .iter()
        .filter(|option| !entry.has_option(option))
        .map(String::as_str)
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Finding::pass(format!(
            "{} mounted on {mount_point} ({})",
            entry.device, entry.fs_type
        ))
    } else {
        Finding::warn(format!(
            "{mount_point} mounted without {}",
            missing.join(", ")
        ))
    }
}

fn root_disk_space(host: &Host, thresholds: Thresholds) -> DiagnosticCheck {
    let host = host.clone();
    DiagnosticCheck::new("root-disk-space", "storage", move || {
        require_live(&host, "disk usage of /")?;
        let (free, total) = disk_usage("/")?;
        Ok(grade_free_space("/", free, total, &thresholds))
    })
    .remediation("Free space with `docker system prune` or move data-root to the USB drive.")
}

fn data_disk_space(host: &Host, mount_point: &str, thresholds: Thresholds) -> DiagnosticCheck {
    let host = host.clone();
    let mount_point = mount_point.to_string();
    DiagnosticCheck::new("data-disk-space", "storage", move || {
        require_live(&host, &format!("disk usage of {mount_point}"))?;
        let (free, total) = disk_usage(&mount_point)?;
        Ok(grade_free_space(&mount_point, free, total, &thresholds))
    })
    .remediation("Prune unused images and volumes: `docker system prune --volumes`.")
}

fn memory_available(host: &Host, thresholds: Thresholds) -> DiagnosticCheck {
    let host = host.clone();
    DiagnosticCheck::new("memory-available", "system", move || {
        require_live(&host, "available memory")?;
        let mut system = System::new();
        system.refresh_memory();
        Ok(grade_memory(
            system.available_memory(),
            system.total_memory(),
            &thresholds,
        ))
    })
    .remediation("Reduce container memory limits or stop idle containers.")
}

fn swap(host: &Host, thresholds: Thresholds) -> DiagnosticCheck {
    let host = host.clone();
    DiagnosticCheck::new("swap", "system", move || {
        require_live(&host, "swap size")?;
        let mut system = System::new();
        system.refresh_memory();
        Ok(grade_swap(system.total_swap(), &thresholds))
    })
    .remediation("Enable swap (e.g. zram or dphys-swapfile) to avoid OOM kills.")
}

/// sysinfo only sees the running machine, never an offline root.
fn require_live(host: &Host, what: &str) -> Result<(), ProbeError> {
    if host.is_live() {
        Ok(())
    } else {
        Err(ProbeError::Unsupported {
            what: format!("{what} under {}", host.root().display()),
        })
    }
}

fn disk_usage(mount_point: &str) -> Result<(u64, u64), ProbeError> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == Path::new(mount_point))
        .map(|disk| (disk.available_space(), disk.total_space()))
        .ok_or_else(|| ProbeError::Missing {
            what: format!("filesystem mounted on {mount_point}"),
        })
}

pub fn grade_free_space(
    mount_point: &str,
    free: u64,
    total: u64,
    thresholds: &Thresholds,
) -> Finding {
    if total == 0 {
        return Finding::warn(format!("{mount_point} reports zero capacity"));
    }
    let percent = free as f64 * 100.0 / total as f64;
    let message = format!(
        "{mount_point}: {} free of {} ({percent:.1}%)",
        human_bytes(free),
        human_bytes(total)
    );
    if percent < thresholds.disk_fail_free_percent {
        Finding::fail(message)
    } else if percent < thresholds.disk_warn_free_percent {
        Finding::warn(message)
    } else {
        Finding::pass(message)
    }
}

pub fn grade_memory(available: u64, total: u64, thresholds: &Thresholds) -> Finding {
    if total == 0 {
        return Finding::warn("memory size unavailable");
    }
    let percent = available as f64 * 100.0 / total as f64;
    let message = format!(
        "{} available of {} ({percent:.1}%)",
        human_bytes(available),
        human_bytes(total)
    );
    if percent < thresholds.memory_warn_available_percent {
        Finding::warn(message)
    } else {
        Finding::pass(message)
    }
}

pub fn grade_swap(total_swap: u64, thresholds: &Thresholds) -> Finding {
    if total_swap == 0 {
        Finding::warn("no swap configured")
    } else if total_swap < thresholds.min_swap_bytes {
        Finding::warn(format!(
            "swap is {} (recommended at least {})",
            human_bytes(total_swap),
            human_bytes(thresholds.min_swap_bytes)
        ))
    } else {
        Finding::pass(format!("swap is {}", human_bytes(total_swap)))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ProbeError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ProbeError::read(path, err)),
    }
}

fn read_required(path: &Path) -> Result<String, ProbeError> {
    read_optional(path)?.ok_or_else(|| ProbeError::Missing {
        what: path.display().to_string(),
    })
}

pub fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{
        build_checks, grade_cgroup_v1, grade_cgroup_v2, grade_free_space, grade_mount, grade_swap,
        human_bytes,
    };
    use crate::collector::DiagnosticCollector;
    use crate::formats::Fstab;
    use crate::host::Host;
    use crate::model::Severity;
    use crate::profile::{Profile, Thresholds};

    #[test]
    fn free_space_thresholds() {
        let thresholds = Thresholds::default();
        assert_eq!(grade_free_space("/", 50, 100, &thresholds).severity, Severity::Pass);
        assert_eq!(grade_free_space("/", 15, 100, &thresholds).severity, Severity::Warn);
        assert_eq!(grade_free_space("/", 5, 100, &thresholds).severity, Severity::Fail);
        assert_eq!(grade_free_space("/", 0, 0, &thresholds).severity, Severity::Warn);
    }

    #[test]
    fn swap_grading() {
        let thresholds = Thresholds::default();
        assert_eq!(grade_swap(0, &thresholds).severity, Severity::Warn);
        assert_eq!(grade_swap(1024 * 1024 * 1024, &thresholds).severity, Severity::Pass);
    }

    #[test]
    fn cgroup_detection() {
        assert_eq!(grade_cgroup_v2("cpuset cpu io memory pids").severity, Severity::Pass);
        assert_eq!(grade_cgroup_v2("cpuset cpu io pids").severity, Severity::Warn);
        let v1 = "#subsys_name\thierarchy\tnum_cgroups\tenabled\ncpu\t2\t1\t1\nmemory\t0\t1\t0\n";
        assert_eq!(grade_cgroup_v1(v1).severity, Severity::Warn);
    }

    #[test]
    fn mount_grading_reports_missing_options() {
        let mounts = Fstab::parse("/dev/sda1 /mnt/usb ext4 rw,relatime 0 0\n");
        let options = vec!["noatime".to_string()];
        let finding = grade_mount(&mounts, "/mnt/usb", &options);
        assert_eq!(finding.severity, Severity::Warn);
        assert!(finding.message.contains("noatime"));
        assert_eq!(grade_mount(&mounts, "/srv", &options).severity, Severity::Fail);
    }

    #[test]
    fn human_bytes_formats_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1536), "1.5 KB");
    }

    #[test]
    fn fake_root_without_docker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sys = temp.path().join("proc/sys/vm");
        fs::create_dir_all(&sys).unwrap();
        fs::write(sys.join("swappiness"), "10\n").unwrap();
        fs::write(
            temp.path().join("proc/mounts"),
            "/dev/sda1 /mnt/usb ext4 rw,noatime 0 0\n",
        )
        .unwrap();

        let host = Host::with_root(temp.path()).with_search_path(Vec::new());
        let profile = Profile {
            sysctl: [("vm.swappiness".to_string(), "10".to_string())].into_iter().collect(),
            ..Profile::default()
        };
        let checks = build_checks(&profile, &host);
        let report = DiagnosticCollector::new().run(&checks);

        assert_eq!(report.total(), checks.len());
        let severity = |name: &str| {
            report
                .results
                .iter()
                .find(|result| result.check == name)
                .map(|result| result.severity)
        };
        assert_eq!(severity("docker-cli"), Some(Severity::Fail));
        assert_eq!(severity("docker-daemon"), Some(Severity::Fail));
        assert_eq!(severity("docker-daemon-config"), Some(Severity::Warn));
        assert_eq!(severity("sysctl:vm.swappiness"), Some(Severity::Pass));
        assert_eq!(severity("memory-cgroup"), Some(Severity::Warn));
        assert_eq!(severity("data-mount"), Some(Severity::Pass));
        assert!(report.has_critical_issues());

        for live_only in ["root-disk-space", "data-disk-space", "memory-available", "swap"] {
            let result = report
                .results
                .iter()
                .find(|result| result.check == live_only)
                .expect("check present");
            assert_eq!(result.severity, Severity::Warn, "{live_only}");
            assert!(result.message.contains("not supported"), "{live_only}");
            assert!(result.message.contains(&temp.path().display().to_string()));
        }
    }
}
