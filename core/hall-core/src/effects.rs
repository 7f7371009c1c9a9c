//! Side effects requested by the monitor and the executors that carry them out.
//!
//! Effects are decided while the monitor lock is held but always run after it
//! is released. Every effect is best-effort: a failure is logged and the rest
//! of the batch still runs.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::platform::Platform;
use crate::privileged::{CommandChannel, OutputMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowCoverDisplay,
    DismissDisplays,
    WakeScreen,
    LockScreen,
    RelinquishAdmin,
    Privileged {
        commands: Vec<String>,
        output: OutputMode,
    },
}

/// Accepts batches of effects for execution.
pub trait EffectSink: Send + Sync {
    fn submit(&self, effects: Vec<Effect>);
}

/// Runs effects on the calling thread.
pub struct Executor {
    platform: Arc<dyn Platform>,
    channel: Arc<dyn CommandChannel>,
}

impl Executor {
    pub fn new(platform: Arc<dyn Platform>, channel: Arc<dyn CommandChannel>) -> Self {
        Self { platform, channel }
    }

    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.run_one(effect);
        }
    }

    fn run_one(&self, effect: Effect) {
        let (action, result) = match effect {
            Effect::ShowCoverDisplay => ("show_cover_display", self.platform.show_cover_display()),
            Effect::DismissDisplays => ("dismiss_displays", self.platform.dismiss_displays()),
            Effect::WakeScreen => ("wake_screen", self.platform.wake_screen()),
            Effect::LockScreen => {
                tracing::info!("Locking screen now");
                ("lock_screen", self.platform.lock_screen())
            }
            Effect::RelinquishAdmin => ("relinquish_admin", self.platform.relinquish_admin()),
            Effect::Privileged { commands, output } => {
                self.run_privileged(&commands, output);
                return;
            }
        };

        if let Err(err) = result {
            tracing::warn!(error = %err, action, "Platform action failed; continuing");
        }
    }

    fn run_privileged(&self, commands: &[String], output: OutputMode) {
        match self.channel.run(commands, output) {
            Ok(outcome) => {
                if output == OutputMode::Collect {
                    tracing::debug!(
                        status = ?outcome.status,
                        stdout = %outcome.stdout,
                        stderr = %outcome.stderr,
                        "Privileged commands finished"
                    );
                }
                if !outcome.success() {
                    tracing::warn!(
                        status = ?outcome.status,
                        commands = ?commands,
                        "Privileged commands exited unsuccessfully"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    commands = ?commands,
                    "Privileged command channel failed; continuing"
                );
            }
        }
    }
}

impl EffectSink for Executor {
    fn submit(&self, effects: Vec<Effect>) {
        self.run(effects);
    }
}

/// Runs effects in submission order on a dedicated worker thread, so slow
/// subprocesses never stall event delivery.
pub struct BackgroundExecutor {
    tx: mpsc::Sender<Vec<Effect>>,
}

impl BackgroundExecutor {
    pub fn spawn(executor: Executor) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Vec<Effect>>();
        thread::Builder::new()
            .name("hall-effects".to_string())
            .spawn(move || {
                for effects in rx {
                    executor.run(effects);
                }
                tracing::debug!("Effect worker stopped");
            })?;
        Ok(Self { tx })
    }
}

impl EffectSink for BackgroundExecutor {
    fn submit(&self, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        if let Err(err) = self.tx.send(effects) {
            tracing::error!(dropped = err.0.len(), "Effect worker is gone; dropping effects");
        }
    }
}
