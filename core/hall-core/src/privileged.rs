//! Privileged command channel.
//!
//! Commands are fed line by line to the stdin of a root shell (`su`),
//! followed by `exit`. Every call is bounded by a timeout and returns an
//! explicit [`CommandOutcome`]; callers decide how loudly to log it.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{HallError, Result};

/// Raises touchscreen sensitivity so the screen works through the cover window.
pub const SENSITIVITY_BOOST: &[&str] = &["cd /sys/class/sec/tsp", "echo clear_cover_mode,1 > cmd"];
pub const SENSITIVITY_REVERT: &[&str] = &["cd /sys/class/sec/tsp", "echo clear_cover_mode,0 > cmd"];
/// KEYCODE_CALL
pub const ANSWER_CALL: &[&str] = &["input keyevent 5"];
/// KEYCODE_ENDCALL
pub const HANGUP_CALL: &[&str] = &["input keyevent 6"];

const POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture stdout/stderr so the caller can log them.
    Collect,
    /// Fire-and-forget; output goes to /dev/null.
    Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait CommandChannel: Send + Sync {
    fn run(&self, commands: &[String], output: OutputMode) -> Result<CommandOutcome>;
}

pub fn command_sequence(commands: &[&str]) -> Vec<String> {
    commands.iter().map(|command| command.to_string()).collect()
}

/// Root shell reached through an `su` binary.
#[derive(Debug, Clone)]
pub struct SuShell {
    program: String,
    timeout: Duration,
}

impl SuShell {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl CommandChannel for SuShell {
    fn run(&self, commands: &[String], output: OutputMode) -> Result<CommandOutcome> {
        let mut script = String::new();
        for command in commands {
            tracing::debug!(command = %command, "Running privileged command");
            script.push_str(command);
            script.push('\n');
        }
        script.push_str("exit\n");

        run_with_timeout(
            Command::new(&self.program),
            &self.program,
            Some(script),
            output,
            self.timeout,
        )
    }
}

/// Spawns `command`, optionally writes `stdin`, and waits at most `timeout`
/// for it to exit. The child is killed when the budget runs out.
pub(crate) fn run_with_timeout(
    mut command: Command,
    label: &str,
    stdin: Option<String>,
    output: OutputMode,
    timeout: Duration,
) -> Result<CommandOutcome> {
    let failed = |details: String| HallError::CommandFailed {
        command: label.to_string(),
        details,
    };

    let capture = || match output {
        OutputMode::Collect => Stdio::piped(),
        OutputMode::Discard => Stdio::null(),
    };
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(capture())
        .stderr(capture());

    let mut child = command
        .spawn()
        .map_err(|err| failed(format!("spawn failed: {}", err)))?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    if let (Some(script), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A shell that exits early closes its end; the wait below reports it.
        if let Err(err) = pipe.write_all(script.as_bytes()).and_then(|_| pipe.flush()) {
            tracing::debug!(error = %err, command = label, "Failed to write command stdin");
        }
    }

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(HallError::CommandTimedOut {
                command: label.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Err(err) => return Err(failed(format!("wait failed: {}", err))),
    };

    Ok(CommandOutcome {
        status: status.code(),
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_fixed() {
        assert_eq!(
            command_sequence(SENSITIVITY_BOOST),
            vec![
                "cd /sys/class/sec/tsp".to_string(),
                "echo clear_cover_mode,1 > cmd".to_string()
            ]
        );
        assert_eq!(SENSITIVITY_REVERT[1], "echo clear_cover_mode,0 > cmd");
    }

    #[test]
    fn shell_collects_output_from_stdin_script() {
        let shell = SuShell::new("sh", Duration::from_secs(5));
        let outcome = shell
            .run(
                &command_sequence(&["echo hello", "echo oops >&2"]),
                OutputMode::Collect,
            )
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr, "oops\n");
    }

    #[test]
    fn discard_mode_drops_output() {
        let shell = SuShell::new("sh", Duration::from_secs(5));
        let outcome = shell
            .run(&command_sequence(&["echo hello"]), OutputMode::Discard)
            .unwrap();

        assert!(outcome.success());
        assert!(outcome.stdout.is_empty());
    }

    #[test]
    fn missing_program_is_a_command_failure() {
        let shell = SuShell::new("/nonexistent/su", Duration::from_secs(1));
        let err = shell
            .run(&command_sequence(&["true"]), OutputMode::Collect)
            .unwrap_err();
        assert!(matches!(err, HallError::CommandFailed { .. }));
    }

    #[test]
    fn hung_shell_is_killed_at_the_deadline() {
        let shell = SuShell::new("sh", Duration::from_millis(100));
        let started = Instant::now();
        let err = shell
            .run(&command_sequence(&["sleep 5"]), OutputMode::Discard)
            .unwrap_err();

        assert!(matches!(err, HallError::CommandTimedOut { timeout_ms: 100, .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
