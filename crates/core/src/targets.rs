use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{ApplyError, ProbeError};
use crate::formats::{FirmwareConfig, Fstab, KeyValueFile, UnitFile};
use crate::host::Host;
use crate::reconcile::{BackupPolicy, CurrentState, DesiredState, ReconciliationTarget};

/// File must contain `line` exactly (ignoring surrounding whitespace).
pub fn file_line(
    name: impl Into<String>,
    path: PathBuf,
    line: impl Into<String>,
) -> ReconciliationTarget<Vec<String>> {
    let line = line.into();
    let probe_path = path.clone();
    let apply_path = path.clone();
    let wanted = line.clone();
    let appended = line.clone();

    ReconciliationTarget::new(
        name,
        move || {
            Ok(match read_optional(&probe_path)? {
                Some(text) => CurrentState::Present(text.lines().map(str::to_string).collect()),
                None => CurrentState::Absent,
            })
        },
        DesiredState::satisfies(format!("line `{line}` present"), move |lines: &Vec<String>| {
            lines.iter().any(|existing| existing.trim() == wanted.trim())
        }),
        move || {
            let mut text = read_for_apply(&apply_path)?.unwrap_or_default();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&appended);
            text.push('\n');
            write_text(&apply_path, &text)
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(path))
}

/// Space-separated token on the single-line kernel command line
/// (`cmdline.txt`). The firmware ignores anything after the first line.
pub fn cmdline_token(
    name: impl Into<String>,
    path: PathBuf,
    token: impl Into<String>,
) -> ReconciliationTarget<Vec<String>> {
    let token = token.into();
    let probe_path = path.clone();
    let apply_path = path.clone();
    let wanted = token.clone();
    let appended = token.clone();

    ReconciliationTarget::new(
        name,
        move || {
            let text = read_optional(&probe_path)?.ok_or_else(|| ProbeError::Missing {
                what: probe_path.display().to_string(),
            })?;
            let first = text.lines().next().unwrap_or_default();
            Ok(CurrentState::Present(
                first.split_whitespace().map(str::to_string).collect(),
            ))
        },
        DesiredState::satisfies(
            format!("`{token}` on kernel command line"),
            move |tokens: &Vec<String>| tokens.iter().any(|existing| *existing == wanted),
        ),
        move || {
            let text = read_for_apply(&apply_path)?.ok_or_else(|| {
                ApplyError::Precondition(format!("{} does not exist", apply_path.display()))
            })?;
            let mut lines = text.lines().map(str::to_string).collect::<Vec<_>>();
            match lines.first_mut() {
                Some(first) if !first.trim().is_empty() => {
                    *first = format!("{} {appended}", first.trim_end());
                }
                Some(first) => *first = appended.clone(),
                None => lines.push(appended.clone()),
            }
            let mut rendered = lines.join("\n");
            rendered.push('\n');
            write_text(&apply_path, &rendered)
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(path))
}

/// `key=value` assignment in a flat file (sysctl.d fragment).
pub fn key_value(
    name: impl Into<String>,
    path: PathBuf,
    key: impl Into<String>,
    value: impl Into<String>,
) -> ReconciliationTarget<KeyValueFile> {
    let key = key.into();
    let value = value.into();
    let probe_path = path.clone();
    let apply_path = path.clone();
    let (wanted_key, wanted_value) = (key.clone(), value.clone());
    let (set_key, set_value) = (key.clone(), value.clone());

    ReconciliationTarget::new(
        name,
        move || {
            Ok(match read_optional(&probe_path)? {
                Some(text) => CurrentState::Present(KeyValueFile::parse(&text)),
                None => CurrentState::Absent,
            })
        },
        DesiredState::satisfies(format!("{key}={value}"), move |file: &KeyValueFile| {
            file.get(&wanted_key) == Some(wanted_value.as_str())
        }),
        move || {
            let mut file = read_for_apply(&apply_path)?
                .map(|text| KeyValueFile::parse(&text))
                .unwrap_or_default();
            file.set(&set_key, &set_value);
            write_text(&apply_path, &file.render())
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(path))
}

/// Firmware `config.txt` setting that applies to every board. Overlays and
/// other repeatable keys are added alongside existing lines.
pub fn boot_setting(
    name: impl Into<String>,
    path: PathBuf,
    key: impl Into<String>,
    value: impl Into<String>,
) -> ReconciliationTarget<FirmwareConfig> {
    let key = key.into();
    let value = value.into();
    let probe_path = path.clone();
    let apply_path = path.clone();
    let (wanted_key, wanted_value) = (key.clone(), value.clone());
    let (set_key, set_value) = (key.clone(), value.clone());

    ReconciliationTarget::new(
        name,
        move || {
            Ok(match read_optional(&probe_path)? {
                Some(text) => CurrentState::Present(FirmwareConfig::parse(&text)),
                None => CurrentState::Absent,
            })
        },
        DesiredState::satisfies(
            format!("{key}={value} for all boards"),
            move |config: &FirmwareConfig| config.contains(&wanted_key, &wanted_value),
        ),
        move || {
            let mut config = read_for_apply(&apply_path)?
                .map(|text| FirmwareConfig::parse(&text))
                .unwrap_or_default();
            config.set(&set_key, &set_value);
            write_text(&apply_path, &config.render())
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(path))
}

/// Live kernel parameter under `/proc/sys`. A parameter this kernel does not
/// expose is skipped rather than failed.
pub fn sysctl_runtime(
    host: &Host,
    key: impl Into<String>,
    value: impl Into<String>,
) -> ReconciliationTarget<String> {
    let key = key.into();
    let value = normalize_sysctl(&value.into());
    let path = sysctl_path(host, &key);
    let probe_path = path.clone();
    let probe_key = key.clone();
    let written = value.clone();

    ReconciliationTarget::new(
        format!("sysctl {key} (runtime)"),
        move || match fs::read_to_string(&probe_path) {
            Ok(text) => Ok(CurrentState::Present(normalize_sysctl(&text))),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ProbeError::Unsupported {
                what: format!("kernel parameter {probe_key}"),
            }),
            Err(err) => Err(ProbeError::read(&probe_path, err)),
        },
        DesiredState::Value(value),
        move || fs::write(&path, &written).map_err(|err| ApplyError::write(&path, err)),
    )
}

pub fn sysctl_path(host: &Host, key: &str) -> PathBuf {
    host.path("/proc/sys").join(key.replace('.', "/"))
}

/// Kernel values may be tab separated (e.g. `net.ipv4.tcp_rmem`).
pub fn normalize_sysctl(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `Key=Value` inside a `[Section]` of a systemd-style file.
pub fn unit_setting(
    name: impl Into<String>,
    path: PathBuf,
    section: impl Into<String>,
    key: impl Into<String>,
    value: impl Into<String>,
) -> ReconciliationTarget<UnitFile> {
    let section = section.into();
    let key = key.into();
    let value = value.into();
    let probe_path = path.clone();
    let apply_path = path.clone();
    let (want_section, want_key, want_value) = (section.clone(), key.clone(), value.clone());
    let (set_section, set_key, set_value) = (section.clone(), key.clone(), value.clone());

    ReconciliationTarget::new(
        name,
        move || {
            Ok(match read_optional(&probe_path)? {
                Some(text) => CurrentState::Present(UnitFile::parse(&text)),
                None => CurrentState::Absent,
            })
        },
        DesiredState::satisfies(format!("[{section}] {key}={value}"), move |file: &UnitFile| {
            file.get(&want_section, &want_key) == Some(want_value.as_str())
        }),
        move || {
            let mut file = read_for_apply(&apply_path)?
                .map(|text| UnitFile::parse(&text))
                .unwrap_or_default();
            file.set(&set_section, &set_key, &set_value);
            write_text(&apply_path, &file.render())
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(path))
}

/// Top-level keys of a JSON object file (Docker `daemon.json`). Keys not
/// named in `desired` are left alone. When `required_tool` is missing from
/// the host the target is skipped.
pub fn json_settings(
    name: impl Into<String>,
    host: &Host,
    path: PathBuf,
    desired: Map<String, Value>,
    required_tool: Option<String>,
) -> ReconciliationTarget<Map<String, Value>> {
    let description = format!(
        "keys {} set",
        desired.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    let probe_host = host.clone();
    let probe_path = path.clone();
    let apply_path = path.clone();
    let wanted = desired.clone();

    ReconciliationTarget::new(
        name,
        move || {
            if let Some(tool) = &required_tool {
                probe_host.require_tool(tool)?;
            }
            match read_optional(&probe_path)? {
                Some(text) => parse_json_object(&probe_path, &text).map(CurrentState::Present),
                None => Ok(CurrentState::Absent),
            }
        },
        DesiredState::satisfies(description, move |current: &Map<String, Value>| {
            wanted
                .iter()
                .all(|(key, value)| current.get(key) == Some(value))
        }),
        move || {
            let mut object = match read_for_apply(&apply_path)? {
                Some(text) => parse_json_object(&apply_path, &text)
                    .map_err(|err| ApplyError::Precondition(err.to_string()))?,
                None => Map::new(),
            };
            for (key, value) in &desired {
                object.insert(key.clone(), value.clone());
            }
            let mut payload = serde_json::to_string_pretty(&Value::Object(object))
                .map_err(|err| ApplyError::Precondition(err.to_string()))?;
            payload.push('\n');
            write_text(&apply_path, &payload)
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(path))
}

/// Mount option on an existing fstab row. Adding or formatting mounts is out
/// of scope, so a missing row leaves the file untouched with a warning.
pub fn mount_option(
    name: impl Into<String>,
    fstab_path: PathBuf,
    mount_point: impl Into<String>,
    option: impl Into<String>,
) -> ReconciliationTarget<Vec<String>> {
    let mount_point = mount_point.into();
    let option = option.into();
    let probe_path = fstab_path.clone();
    let apply_path = fstab_path.clone();
    let probe_mount = mount_point.clone();
    let apply_mount = mount_point.clone();
    let wanted = option.clone();
    let added = option.clone();

    ReconciliationTarget::new(
        name,
        move || {
            let text = read_optional(&probe_path)?.ok_or_else(|| ProbeError::Missing {
                what: probe_path.display().to_string(),
            })?;
            let fstab = Fstab::parse(&text);
            let entry = fstab.entry(&probe_mount).ok_or_else(|| ProbeError::Missing {
                what: format!("fstab entry for {probe_mount}"),
            })?;
            Ok(CurrentState::Present(entry.options.clone()))
        },
        DesiredState::satisfies(
            format!("{option} on {mount_point}"),
            move |options: &Vec<String>| options.iter().any(|existing| *existing == wanted),
        ),
        move || {
            let text = read_for_apply(&apply_path)?.unwrap_or_default();
            let mut fstab = Fstab::parse(&text);
            let entry = fstab.entry_mut(&apply_mount).ok_or_else(|| {
                ApplyError::Precondition(format!("no fstab entry for {apply_mount}"))
            })?;
            entry.add_option(&added);
            write_text(&apply_path, &fstab.render())
        },
    )
    .with_backup(BackupPolicy::CopyBeforeWrite(fstab_path))
}

/// systemd unit enabled at boot. Skipped when systemctl or the unit is not
/// installed.
pub fn service_enabled(host: &Host, unit: impl Into<String>) -> ReconciliationTarget<String> {
    let unit = unit.into();
    let probe_host = host.clone();
    let apply_host = host.clone();
    let probe_unit = unit.clone();
    let apply_unit = unit.clone();

    ReconciliationTarget::new(
        format!("service {unit} enabled"),
        move || {
            let systemctl = probe_host.require_tool("systemctl")?;
            let output = probe_host
                .run(&systemctl, &["is-enabled", probe_unit.as_str()])
                .map_err(|err| ProbeError::Command {
                    command: format!("systemctl is-enabled {probe_unit}"),
                    detail: err.to_string(),
                })?;
            if output.stdout.is_empty() {
                return Err(ProbeError::Unsupported {
                    what: format!("unit {probe_unit}"),
                });
            }
            Ok(CurrentState::Present(output.stdout))
        },
        DesiredState::satisfies("enabled", |state: &String| {
            matches!(state.as_str(), "enabled" | "static" | "alias")
        }),
        move || {
            let command = format!("systemctl enable {apply_unit}");
            let systemctl = apply_host
                .find_tool("systemctl")
                .ok_or_else(|| ApplyError::Precondition("systemctl not available".to_string()))?;
            let output = apply_host
                .run(&systemctl, &["enable", apply_unit.as_str()])
                .map_err(|err| ApplyError::Command {
                    command: command.clone(),
                    detail: err.to_string(),
                })?;
            if output.success {
                Ok(())
            } else {
                Err(ApplyError::Command {
                    command,
                    detail: output.stderr,
                })
            }
        },
    )
}

fn parse_json_object(path: &Path, text: &str) -> Result<Map<String, Value>, ProbeError> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ProbeError::malformed(path, "top-level value is not an object")),
        Err(err) => Err(ProbeError::malformed(path, err.to_string())),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ProbeError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ProbeError::read(path, err)),
    }
}

fn read_for_apply(path: &Path) -> Result<Option<String>, ApplyError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ApplyError::Precondition(format!(
            "cannot read {}: {err}",
            path.display()
        ))),
    }
}

fn write_text(path: &Path, text: &str) -> Result<(), ApplyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ApplyError::write(parent, err))?;
    }
    fs::write(path, text).map_err(|err| ApplyError::write(path, err))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::{
        cmdline_token, file_line, json_settings, key_value, mount_option, service_enabled,
        sysctl_runtime, unit_setting,
    };
    use crate::backup::{NoBackup, TimestampedCopy};
    use crate::host::Host;
    use crate::model::Outcome;
    use crate::reconcile::{CurrentState, Reconciler, Target};

    fn reconciler() -> Reconciler {
        Reconciler::new(Box::new(NoBackup))
    }

    #[test]
    fn file_line_appends_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cmdline.txt");
        fs::write(&path, "console=tty1").unwrap();
        let target = file_line("cgroup memory", path.clone(), "cgroup_enable=memory");

        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Applied);
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "console=tty1\ncgroup_enable=memory\n"
        );
    }

    #[test]
    fn cmdline_token_extends_first_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cmdline.txt");
        fs::write(&path, "console=serial0,115200 root=PARTUUID=1234 rootwait\n").unwrap();
        let target = cmdline_token("memory cgroup", path.clone(), "cgroup_memory=1");

        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Applied);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "console=serial0,115200 root=PARTUUID=1234 rootwait cgroup_memory=1\n"
        );
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);
    }

    #[test]
    fn key_value_creates_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("etc/sysctl.d/99-pitune.conf");
        let target = key_value("swappiness", path.clone(), "vm.swappiness", "10");

        let result = reconciler().reconcile(&target);
        assert_eq!(result.outcome, Outcome::Applied);
        assert!(result.message.starts_with("created"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "vm.swappiness=10\n");
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);
    }

    #[test]
    fn one_pass_over_a_shared_file_keeps_every_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("99-pitune.conf");
        let original = "# managed\nvm.swappiness=60\n";
        fs::write(&path, original).unwrap();

        let targets: Vec<Box<dyn Target>> = [
            ("vm.swappiness", "10"),
            ("vm.vfs_cache_pressure", "50"),
            ("vm.dirty_ratio", "10"),
            ("vm.dirty_background_ratio", "5"),
        ]
        .into_iter()
        .map(|(key, value)| Box::new(key_value(key, path.clone(), key, value)) as Box<dyn Target>)
        .collect();
        let backups = temp.path().join("backups");
        let reconciler = Reconciler::new(Box::new(TimestampedCopy::new(Some(backups.clone()))));
        let summary = reconciler.run_pass(&targets);

        assert_eq!(summary.applied, 4);
        let mut written = summary
            .results
            .iter()
            .filter_map(|result| result.backup.clone())
            .collect::<Vec<_>>();
        assert_eq!(written.len(), 4);
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            original,
            "first backup must hold the untouched file"
        );
        written.sort();
        written.dedup();
        assert_eq!(written.len(), 4);
        assert_eq!(fs::read_dir(&backups).unwrap().count(), 4);
    }

    #[test]
    fn sysctl_runtime_skips_unknown_parameters() {
        let temp = tempfile::tempdir().expect("tempdir");
        let host = Host::with_root(temp.path());
        let swappiness = temp.path().join("proc/sys/vm/swappiness");
        fs::create_dir_all(swappiness.parent().unwrap()).unwrap();
        fs::write(&swappiness, "60\n").unwrap();

        let target = sysctl_runtime(&host, "vm.swappiness", "10");
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Applied);
        assert_eq!(fs::read_to_string(&swappiness).unwrap(), "10");
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);

        let unknown = sysctl_runtime(&host, "vm.not_a_knob", "1");
        let result = reconciler().reconcile(&unknown);
        assert_eq!(result.outcome, Outcome::Skipped);
        assert!(result.message.contains("not supported"));
    }

    #[test]
    fn unit_setting_updates_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("journald.conf");
        fs::write(&path, "[Journal]\n#SystemMaxUse=\n").unwrap();
        let target = unit_setting(
            "journald max use",
            path.clone(),
            "Journal",
            "SystemMaxUse",
            "100M",
        );

        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Applied);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[Journal]\n#SystemMaxUse=\nSystemMaxUse=100M\n"
        );
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);
    }

    #[test]
    fn json_settings_merge_and_warn_on_garbage() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("docker"), "").unwrap();
        let host = Host::with_root(temp.path()).with_search_path(vec![temp.path().to_path_buf()]);
        let path = temp.path().join("daemon.json");
        fs::write(&path, r#"{"data-root": "/mnt/usb/docker"}"#).unwrap();

        let desired = json!({"log-driver": "json-file"}).as_object().cloned().unwrap();
        let target = json_settings(
            "docker daemon",
            &host,
            path.clone(),
            desired.clone(),
            Some("docker".to_string()),
        );
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Applied);
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["data-root"], "/mnt/usb/docker");
        assert_eq!(written["log-driver"], "json-file");
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Warned);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn json_settings_skip_without_tool() {
        let temp = tempfile::tempdir().expect("tempdir");
        let host = Host::with_root(temp.path()).with_search_path(Vec::new());
        let desired = json!({"log-driver": "json-file"}).as_object().cloned().unwrap();
        let target = json_settings(
            "docker daemon",
            &host,
            temp.path().join("daemon.json"),
            desired,
            Some("docker".to_string()),
        );
        let result = reconciler().reconcile(&target);
        assert_eq!(result.outcome, Outcome::Skipped);
        assert!(result.message.contains("tool not available"));
        assert!(!temp.path().join("daemon.json").exists());
    }

    #[test]
    fn noatime_is_added_then_observed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("fstab");
        fs::write(&path, "UUID=abcd /mnt/usb ext4 defaults,nofail 0 2\n").unwrap();
        let target = mount_option("usb noatime", path.clone(), "/mnt/usb", "noatime");

        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Applied);
        match target.probe().expect("probe") {
            CurrentState::Present(options) => assert!(options.contains(&"noatime".to_string())),
            CurrentState::Absent => panic!("fstab entry vanished"),
        }
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap().matches("noatime").count(), 1);
    }

    #[test]
    fn missing_fstab_row_warns_without_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("fstab");
        fs::write(&path, "proc /proc proc defaults 0 0\n").unwrap();
        let target = mount_option("usb noatime", path.clone(), "/mnt/usb", "noatime");

        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Warned);
        assert_eq!(fs::read_to_string(&path).unwrap(), "proc /proc proc defaults 0 0\n");
    }

    #[test]
    fn service_skips_without_systemctl() {
        let temp = tempfile::tempdir().expect("tempdir");
        let host = Host::with_root(temp.path()).with_search_path(Vec::new());
        let target = service_enabled(&host, "docker");
        assert_eq!(reconciler().reconcile(&target).outcome, Outcome::Skipped);
    }
}
