//! Close and open sequences.
//!
//! The dispatcher is pure: it marks the cover state and returns the effects
//! and lock-timer change a transition calls for. The monitor applies the
//! timer change under its lock and hands the effects to an executor.

use std::time::Duration;

use crate::cover::{CoverState, Transition};
use crate::effects::Effect;
use crate::privileged::{command_sequence, OutputMode, SENSITIVITY_BOOST, SENSITIVITY_REVERT};

/// Facts about the device the sequences depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    pub root_enabled: bool,
    /// Whether the lock primitive is permitted.
    pub admin_active: bool,
    pub display_on_screen: bool,
    pub lock_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Schedule(Duration),
    Cancel,
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub effects: Vec<Effect>,
    pub lock_timer: TimerCommand,
}

pub fn on_transition(
    cover: &mut CoverState,
    transition: Transition,
    context: &DispatchContext,
) -> Dispatch {
    match transition {
        Transition::Closed => close_cover(cover, context),
        Transition::Opened => open_cover(cover, context),
    }
}

fn close_cover(cover: &mut CoverState, context: &DispatchContext) -> Dispatch {
    tracing::debug!("Close cover sequence");
    *cover = CoverState::Closed;

    let mut effects = Vec::new();
    if !context.display_on_screen {
        effects.push(Effect::ShowCoverDisplay);
    }
    if context.root_enabled {
        tracing::debug!("Root enabled; boosting touch sensitivity");
        effects.push(Effect::Privileged {
            commands: command_sequence(SENSITIVITY_BOOST),
            output: OutputMode::Collect,
        });
    }

    let lock_timer = if context.admin_active {
        tracing::debug!(delay_ms = context.lock_delay.as_millis() as u64, "Scheduling screen lock");
        TimerCommand::Schedule(context.lock_delay)
    } else {
        tracing::debug!("Device admin not active; cannot schedule screen lock");
        TimerCommand::Keep
    };

    Dispatch {
        effects,
        lock_timer,
    }
}

fn open_cover(cover: &mut CoverState, context: &DispatchContext) -> Dispatch {
    tracing::debug!("Open cover sequence");

    let mut effects = vec![Effect::DismissDisplays, Effect::WakeScreen];
    if context.root_enabled {
        tracing::debug!("Root enabled; reverting touch sensitivity");
        effects.push(Effect::Privileged {
            commands: command_sequence(SENSITIVITY_REVERT),
            output: OutputMode::Collect,
        });
    }
    *cover = CoverState::Open;

    Dispatch {
        effects,
        lock_timer: TimerCommand::Cancel,
    }
}
