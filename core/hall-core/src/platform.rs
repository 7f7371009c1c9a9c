//! Screen and display primitives owned by the host platform.

use std::process::Command;
use std::time::Duration;

use crate::config::PlatformCommands;
use crate::error::{HallError, Result};
use crate::privileged::{run_with_timeout, OutputMode};

pub trait Platform: Send + Sync {
    fn lock_screen(&self) -> Result<()>;
    fn wake_screen(&self) -> Result<()>;
    /// Raise the cover display over whatever is in front, lock screen included.
    fn show_cover_display(&self) -> Result<()>;
    /// Send the cover display and the configuration screen to the back.
    fn dismiss_displays(&self) -> Result<()>;
    fn relinquish_admin(&self) -> Result<()>;
}

/// Maps each primitive to a configured `sh -c` command line.
#[derive(Debug, Clone)]
pub struct CommandPlatform {
    commands: PlatformCommands,
    timeout: Duration,
}

impl CommandPlatform {
    pub fn new(commands: PlatformCommands, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    fn run(&self, action: &str, command_line: Option<&str>) -> Result<()> {
        let Some(command_line) = command_line else {
            tracing::debug!(action, "No platform command configured; skipping");
            return Ok(());
        };

        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        let outcome = run_with_timeout(command, action, None, OutputMode::Collect, self.timeout)?;
        if outcome.success() {
            Ok(())
        } else {
            Err(HallError::PlatformFailed {
                action: action.to_string(),
                details: format!(
                    "exit status {:?}: {}",
                    outcome.status,
                    outcome.stderr.trim()
                ),
            })
        }
    }
}

impl Platform for CommandPlatform {
    fn lock_screen(&self) -> Result<()> {
        self.run("lock_screen", self.commands.lock_screen.as_deref())
    }

    fn wake_screen(&self) -> Result<()> {
        self.run("wake_screen", self.commands.wake_screen.as_deref())
    }

    fn show_cover_display(&self) -> Result<()> {
        self.run(
            "show_cover_display",
            self.commands.show_cover_display.as_deref(),
        )
    }

    fn dismiss_displays(&self) -> Result<()> {
        self.run("dismiss_displays", self.commands.dismiss_displays.as_deref())
    }

    fn relinquish_admin(&self) -> Result<()> {
        self.run("relinquish_admin", self.commands.relinquish_admin.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn platform(commands: PlatformCommands) -> CommandPlatform {
        CommandPlatform::new(commands, Duration::from_secs(5))
    }

    #[test]
    fn unconfigured_primitives_are_noops() {
        let platform = platform(PlatformCommands::default());
        assert!(platform.lock_screen().is_ok());
        assert!(platform.wake_screen().is_ok());
        assert!(platform.relinquish_admin().is_ok());
    }

    #[test]
    fn configured_command_runs_through_shell() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("locked");
        let platform = platform(PlatformCommands {
            lock_screen: Some(format!("touch {}", marker.display())),
            ..PlatformCommands::default()
        });

        platform.lock_screen().unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn failing_command_reports_platform_error() {
        let platform = platform(PlatformCommands {
            wake_screen: Some("echo nope >&2; exit 3".to_string()),
            ..PlatformCommands::default()
        });

        let err = platform.wake_screen().unwrap_err();
        match err {
            HallError::PlatformFailed { action, details } => {
                assert_eq!(action, "wake_screen");
                assert!(details.contains("nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
