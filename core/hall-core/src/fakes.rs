//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cover::CoverState;
use crate::error::{HallError, Result};
use crate::platform::Platform;
use crate::privileged::{CommandChannel, CommandOutcome, OutputMode};
use crate::status::StatusSource;

pub struct FakeStatus {
    state: Mutex<Option<CoverState>>,
    reads: AtomicUsize,
}

impl FakeStatus {
    pub fn new(state: CoverState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn unreadable() -> Self {
        Self {
            state: Mutex::new(None),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, state: CoverState) {
        *self.state.lock().unwrap() = Some(state);
    }

    pub fn set_unreadable(&self) {
        *self.state.lock().unwrap() = None;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl StatusSource for FakeStatus {
    fn read_status(&self) -> Result<CoverState> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = *self.state.lock().unwrap();
        state.ok_or_else(|| HallError::StatusUnreadable {
            path: "fake".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }
}

#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<bool>,
}

impl FakePlatform {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_all(&self) {
        *self.failing.lock().unwrap() = true;
    }

    fn record(&self, action: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(action);
        if *self.failing.lock().unwrap() {
            Err(HallError::PlatformFailed {
                action: action.to_string(),
                details: "simulated".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl Platform for FakePlatform {
    fn lock_screen(&self) -> Result<()> {
        self.record("lock_screen")
    }

    fn wake_screen(&self) -> Result<()> {
        self.record("wake_screen")
    }

    fn show_cover_display(&self) -> Result<()> {
        self.record("show_cover_display")
    }

    fn dismiss_displays(&self) -> Result<()> {
        self.record("dismiss_displays")
    }

    fn relinquish_admin(&self) -> Result<()> {
        self.record("relinquish_admin")
    }
}

#[derive(Default)]
pub struct FakeChannel {
    runs: Mutex<Vec<Vec<String>>>,
    failing: bool,
}

impl FakeChannel {
    pub fn failing() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().unwrap().clone()
    }
}

impl CommandChannel for FakeChannel {
    fn run(&self, commands: &[String], _output: OutputMode) -> Result<CommandOutcome> {
        self.runs.lock().unwrap().push(commands.to_vec());
        if self.failing {
            return Err(HallError::CommandFailed {
                command: "su".to_string(),
                details: "simulated".to_string(),
            });
        }
        Ok(CommandOutcome {
            status: Some(0),
            ..CommandOutcome::default()
        })
    }
}
