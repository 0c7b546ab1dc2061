use crate::host::Host;
use crate::profile::Profile;
use crate::reconcile::Target;
use crate::targets::{
    boot_setting, cmdline_token, json_settings, key_value, mount_option, service_enabled,
    sysctl_runtime, unit_setting,
};

/// Builds the optimization targets for a profile. Order matters: the
/// persisted sysctl fragment comes before the live values, and Docker's
/// daemon config is written before the service is enabled.
pub fn build_targets(profile: &Profile, host: &Host) -> Vec<Box<dyn Target>> {
    let mut targets: Vec<Box<dyn Target>> = Vec::new();

    let sysctl_file = host.path(&profile.sysctl_file);
    for (key, value) in &profile.sysctl {
        targets.push(Box::new(key_value(
            format!("sysctl {key} (persisted)"),
            sysctl_file.clone(),
            key,
            value,
        )));
    }
    for (key, value) in &profile.sysctl {
        targets.push(Box::new(sysctl_runtime(host, key, value)));
    }

    let boot_config = host.path(&profile.boot_config_file);
    for (key, value) in &profile.boot_config {
        targets.push(Box::new(boot_setting(
            format!("boot config {key}"),
            boot_config.clone(),
            key,
            value,
        )));
    }

    let cmdline = host.path(&profile.cmdline_file);
    for token in &profile.cmdline {
        targets.push(Box::new(cmdline_token(
            format!("kernel cmdline {token}"),
            cmdline.clone(),
            token,
        )));
    }

    if let Some(mount) = &profile.data_mount {
        let fstab = host.path(&profile.fstab_file);
        for option in &mount.options {
            targets.push(Box::new(mount_option(
                format!("mount {} {option}", mount.mount_point),
                fstab.clone(),
                mount.mount_point.clone(),
                option,
            )));
        }
    }

    let journald = host.path(&profile.journald_file);
    for (key, value) in &profile.journald {
        targets.push(Box::new(unit_setting(
            format!("journald {key}"),
            journald.clone(),
            "Journal",
            key,
            value,
        )));
    }

    if !profile.docker_daemon.is_empty() {
        targets.push(Box::new(json_settings(
            "docker daemon config",
            host,
            host.path(&profile.docker_daemon_file),
            profile.docker_daemon.clone(),
            Some("docker".to_string()),
        )));
    }

    for unit in &profile.services {
        targets.push(Box::new(service_enabled(host, unit)));
    }

    targets
}
