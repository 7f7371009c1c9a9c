//! # hall-core
//!
//! Cover-state logic for hall-effect flip covers: reconciles noisy proximity
//! readings against the hall sensor's status file, then runs the close/open
//! sequences (cover display, delayed screen lock, wake, touch sensitivity).
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency; timers run on plain threads.
//! - **One owned context**: [`HallMonitor`] keeps every piece of mutable state
//!   behind a single lock. Effects run after the lock is released.
//! - **Best effort**: Sensor, command and platform failures are logged and
//!   never abort a sequence.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hall_core::{BackgroundExecutor, CommandPlatform, Executor, HallFile, HallMonitor, SuShell};
//!
//! let executor = Executor::new(Arc::new(platform), Arc::new(shell));
//! let monitor = HallMonitor::new(config, Arc::new(HallFile::new(path)), Arc::new(executor));
//! monitor.boot();
//! monitor.on_reading(-1.0);
//! ```

pub mod calls;
pub mod config;
pub mod cover;
pub mod dispatcher;
pub mod effects;
pub mod error;
pub mod monitor;
pub mod platform;
pub mod privileged;
pub mod reconciler;
pub mod status;
pub mod timer;
pub mod widgets;

#[cfg(test)]
mod fakes;

pub use calls::CallState;
pub use config::{HallConfig, PlatformCommands};
pub use cover::{CoverState, Transition};
pub use effects::{BackgroundExecutor, Effect, EffectSink, Executor};
pub use error::{HallError, Result};
pub use monitor::{HallMonitor, MonitorSnapshot, ServiceStart};
pub use platform::{CommandPlatform, Platform};
pub use privileged::{CommandChannel, CommandOutcome, OutputMode, SuShell};
pub use status::{HallFile, StatusSource};
pub use timer::DelayTimer;
pub use widgets::{WidgetError, WidgetRegistry};
