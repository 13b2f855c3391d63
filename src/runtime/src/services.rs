//! System service control.
//!
//! The update only needs a handful of init-system operations. They sit
//! behind [`ServiceManager`] so the orchestrator can run against a
//! scratch root in tests.

use async_trait::async_trait;
use tokio::process::Command;

use platconf_core::error::ServiceError;

/// Init system and device manager operations used by the update.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Reload unit files from disk.
    async fn reload_daemon(&self) -> Result<(), ServiceError>;

    /// Enable units so they start on boot.
    async fn enable_units(&self, units: &[String]) -> Result<(), ServiceError>;

    /// Stop a unit.
    async fn stop_unit(&self, unit: &str) -> Result<(), ServiceError>;

    /// Restart a unit.
    async fn restart_unit(&self, unit: &str) -> Result<(), ServiceError>;

    /// Make the device manager pick up changed rules.
    async fn reload_udev_rules(&self) -> Result<(), ServiceError>;

    /// Schedule a reboot.
    async fn reboot(&self) -> Result<(), ServiceError>;
}

/// [`ServiceManager`] backed by `systemctl`, `udevadm` and `shutdown`.
#[derive(Debug, Clone)]
pub struct Systemctl {
    systemctl: String,
    udevadm: String,
    shutdown: String,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
            udevadm: "udevadm".to_string(),
            shutdown: "/usr/sbin/shutdown".to_string(),
        }
    }
}

impl Systemctl {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<(), ServiceError> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command = %command, "Running service command");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ServiceError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            return Err(ServiceError::Failed { command, message });
        }

        Ok(())
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn reload_daemon(&self) -> Result<(), ServiceError> {
        self.run(&self.systemctl, &["daemon-reload"]).await
    }

    async fn enable_units(&self, units: &[String]) -> Result<(), ServiceError> {
        if units.is_empty() {
            return Ok(());
        }
        let mut args = vec!["enable"];
        args.extend(units.iter().map(String::as_str));
        self.run(&self.systemctl, &args).await
    }

    async fn stop_unit(&self, unit: &str) -> Result<(), ServiceError> {
        self.run(&self.systemctl, &["stop", unit]).await
    }

    async fn restart_unit(&self, unit: &str) -> Result<(), ServiceError> {
        self.run(&self.systemctl, &["restart", unit]).await
    }

    async fn reload_udev_rules(&self) -> Result<(), ServiceError> {
        self.run(&self.udevadm, &["control", "--reload-rules"]).await
    }

    async fn reboot(&self) -> Result<(), ServiceError> {
        self.run(&self.shutdown, &["--reboot", "1"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_programs(program: &str) -> Systemctl {
        Systemctl {
            systemctl: program.to_string(),
            udevadm: program.to_string(),
            shutdown: program.to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_command() {
        let services = with_programs("true");
        services.reload_daemon().await.unwrap();
        services
            .enable_units(&["a.service".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_command() {
        let services = with_programs("false");
        let err = services.stop_unit("a.service").await.unwrap_err();
        match err {
            ServiceError::Failed { command, .. } => assert_eq!(command, "false stop a.service"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let services = with_programs("/nonexistent/platconf-test-binary");
        let err = services.reload_udev_rules().await.unwrap_err();
        assert!(matches!(err, ServiceError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_enable_nothing_is_noop() {
        let services = with_programs("/nonexistent/platconf-test-binary");
        services.enable_units(&[]).await.unwrap();
    }
}
