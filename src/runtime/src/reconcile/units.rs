//! Installation of service units, drop-ins and device rules.

use std::path::{Path, PathBuf};

use platconf_core::config::UpdateConfig;
use platconf_core::error::ReconcileError;

use super::fs::{copy_file, require_absolute, sorted_entries, CONFIG_MODE};

/// udev rules shipped by the configure image.
pub const UDEV_RULES: &str = "80-protonet.rules";

/// Container runtime logging drop-in.
pub const DOCKER_DROPIN: &str = "50-log-warn.conf";

/// journald drop-in.
pub const JOURNALD_DROPIN: &str = "journald_protonet.conf";

/// Kernel log level sysctl drop-in.
pub const SYSCTL_DROPIN: &str = "sysctl-klog.conf";

/// Unit enabled ahead of everything else.
pub const WAIT_ONLINE_UNIT: &str = "systemd-networkd-wait-online.service";

/// Copy the udev rules from `config_dir` into `rules_dir`.
pub fn install_udev_rules(config_dir: &Path, rules_dir: &Path) -> Result<PathBuf, ReconcileError> {
    require_absolute(config_dir)?;
    require_absolute(rules_dir)?;

    let target = rules_dir.join(UDEV_RULES);
    copy_file(&target, &config_dir.join(UDEV_RULES), CONFIG_MODE)?;
    tracing::info!(path = %target.display(), "Installed udev rules");
    Ok(target)
}

/// Copy every service definition and configuration drop-in into the root.
///
/// `services_dir` and `config_dir` are the directories of the extracted
/// configure image. Returns the number of files installed.
pub fn install_unit_files(
    services_dir: &Path,
    config_dir: &Path,
    config: &UpdateConfig,
) -> Result<usize, ReconcileError> {
    require_absolute(services_dir)?;
    require_absolute(config_dir)?;
    let system_dir = config.system_unit_dir();
    require_absolute(&system_dir)?;

    let mut installed = 0;
    for entry in sorted_entries(services_dir)? {
        let target = system_dir.join(entry.file_name());
        copy_file(&target, &entry.path(), CONFIG_MODE)?;
        installed += 1;
    }

    let dropins = [
        (DOCKER_DROPIN, config.docker_dropin_dir()),
        (JOURNALD_DROPIN, config.journald_dropin_dir()),
        (SYSCTL_DROPIN, config.sysctl_dir()),
    ];
    for (name, dir) in dropins {
        copy_file(&dir.join(name), &config_dir.join(name), CONFIG_MODE)?;
        installed += 1;
    }

    let network_dir = config.network_unit_dir();
    for entry in sorted_entries(config_dir)? {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(".network") {
            continue;
        }
        copy_file(&network_dir.join(&name), &entry.path(), CONFIG_MODE)?;
        installed += 1;
    }

    tracing::info!(files = installed, "Installed unit files");
    Ok(installed)
}

/// Names of the units in `system_dir` to enable: regular files not ending in `.sh`.
pub fn enableable_units(system_dir: &Path) -> Result<Vec<String>, ReconcileError> {
    require_absolute(system_dir)?;

    let mut units = Vec::new();
    for entry in sorted_entries(system_dir)? {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| ReconcileError::io("stat", &path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_file() && !name.ends_with(".sh") {
            units.push(name);
        }
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn staged(tmp: &TempDir) -> (PathBuf, PathBuf) {
        let services = tmp.path().join("staging/services");
        let config_dir = tmp.path().join("staging/config");
        fs::create_dir_all(&services).unwrap();
        fs::create_dir_all(&config_dir).unwrap();

        fs::write(services.join("app.service"), "[Unit]\n").unwrap();
        fs::write(services.join("app.timer"), "[Timer]\n").unwrap();
        for name in [UDEV_RULES, DOCKER_DROPIN, JOURNALD_DROPIN, SYSCTL_DROPIN] {
            fs::write(config_dir.join(name), name).unwrap();
        }
        fs::write(config_dir.join("10-lan.network"), "[Match]\n").unwrap();
        fs::write(config_dir.join("README"), "docs").unwrap();
        (services, config_dir)
    }

    fn root_config(tmp: &TempDir) -> UpdateConfig {
        let config = UpdateConfig {
            root_dir: tmp.path().join("root"),
            ..Default::default()
        };
        for dir in config.required_dirs() {
            fs::create_dir_all(dir).unwrap();
        }
        config
    }

    #[test]
    fn test_install_unit_files() {
        let tmp = TempDir::new().unwrap();
        let (services, config_dir) = staged(&tmp);
        let config = root_config(&tmp);

        let installed = install_unit_files(&services, &config_dir, &config).unwrap();

        assert_eq!(installed, 6);
        assert!(config.system_unit_dir().join("app.service").exists());
        assert!(config.system_unit_dir().join("app.timer").exists());
        assert!(config.docker_dropin_dir().join(DOCKER_DROPIN).exists());
        assert!(config.journald_dropin_dir().join(JOURNALD_DROPIN).exists());
        assert!(config.sysctl_dir().join(SYSCTL_DROPIN).exists());
        assert!(config.network_unit_dir().join("10-lan.network").exists());
        assert!(!config.network_unit_dir().join("README").exists());
    }

    #[test]
    fn test_install_unit_files_missing_dropin() {
        let tmp = TempDir::new().unwrap();
        let (services, config_dir) = staged(&tmp);
        fs::remove_file(config_dir.join(SYSCTL_DROPIN)).unwrap();
        let config = root_config(&tmp);

        let err = install_unit_files(&services, &config_dir, &config).unwrap_err();
        assert!(matches!(err, ReconcileError::Io { .. }));
    }

    #[test]
    fn test_install_udev_rules() {
        let tmp = TempDir::new().unwrap();
        let (_, config_dir) = staged(&tmp);
        let config = root_config(&tmp);

        let target = install_udev_rules(&config_dir, &config.udev_rules_dir()).unwrap();
        assert_eq!(fs::read_to_string(target).unwrap(), UDEV_RULES);
    }

    #[test]
    fn test_enableable_units() {
        let tmp = TempDir::new().unwrap();
        let system = tmp.path();
        fs::write(system.join("b.service"), "").unwrap();
        fs::write(system.join("a.path"), "").unwrap();
        fs::write(system.join("helper.sh"), "").unwrap();
        fs::create_dir(system.join("scripts")).unwrap();
        std::os::unix::fs::symlink("b.service", system.join("alias.service")).unwrap();

        assert_eq!(enableable_units(system).unwrap(), vec!["a.path", "b.service"]);
    }

    #[test]
    fn test_relative_paths_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = root_config(&tmp);
        assert!(matches!(
            install_unit_files(Path::new("services"), tmp.path(), &config),
            Err(ReconcileError::RelativePath(_))
        ));
        assert!(matches!(
            install_udev_rules(tmp.path(), Path::new("rules.d")),
            Err(ReconcileError::RelativePath(_))
        ));
        assert!(matches!(
            enableable_units(Path::new("system")),
            Err(ReconcileError::RelativePath(_))
        ));
    }
}
