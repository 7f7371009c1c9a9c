//! The cover monitor: one owned context for cover state, the lock timer,
//! call screening, service flags and widget slots.
//!
//! All state lives behind a single mutex. Every entry point (sensor readings,
//! lifecycle callbacks, timer firings) takes that lock, decides what to do,
//! releases it, and only then hands effects to the [`EffectSink`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::calls::CallState;
use crate::config::{save_config, HallConfig};
use crate::cover::{CoverState, Transition};
use crate::dispatcher::{self, DispatchContext, TimerCommand};
use crate::effects::{Effect, EffectSink};
use crate::privileged::{command_sequence, OutputMode, ANSWER_CALL, HANGUP_CALL};
use crate::reconciler;
use crate::status::{cover_closed, StatusSource};
use crate::timer::DelayTimer;
use crate::widgets::{WidgetError, WidgetRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStart {
    Started,
    /// The lock primitive is not permitted yet; an admin request is pending.
    AdminRequired,
}

/// Point-in-time view of the monitor, for health and state queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub cover: CoverState,
    pub service_running: bool,
    pub pref_enabled: bool,
    pub pref_delay: u64,
    pub root_enabled: bool,
    pub admin_active: bool,
    pub admin_request_pending: bool,
    pub display_on_screen: bool,
    pub lock_pending: bool,
    pub call: CallState,
    pub widgets: BTreeMap<String, u32>,
}

struct MonitorState {
    config: HallConfig,
    cover: CoverState,
    lock_timer: DelayTimer,
    call_timer: DelayTimer,
    service_running: bool,
    admin_request_pending: bool,
    display_on_screen: bool,
    call: CallState,
    widgets: WidgetRegistry,
}

impl MonitorState {
    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            root_enabled: self.config.root_enabled,
            admin_active: self.config.admin_active,
            display_on_screen: self.display_on_screen,
            lock_delay: self.config.lock_delay(),
        }
    }

    /// Keeps the display flag in step with display effects about to run.
    fn track_displays(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::ShowCoverDisplay => self.display_on_screen = true,
                Effect::DismissDisplays => self.display_on_screen = false,
                _ => {}
            }
        }
    }
}

struct Shared {
    state: Mutex<MonitorState>,
    status: Arc<dyn StatusSource>,
    sink: Arc<dyn EffectSink>,
    config_path: Option<PathBuf>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, config: &HallConfig) {
        let Some(path) = self.config_path.as_ref() else {
            return;
        };
        if let Err(err) = save_config(path, config) {
            tracing::warn!(error = %err, "Failed to persist preferences");
        }
    }
}

/// Cloneable handle to the shared monitor context.
#[derive(Clone)]
pub struct HallMonitor {
    shared: Arc<Shared>,
}

impl HallMonitor {
    pub fn new(
        config: HallConfig,
        status: Arc<dyn StatusSource>,
        sink: Arc<dyn EffectSink>,
    ) -> Self {
        Self::build(config, status, sink, None)
    }

    /// Like [`HallMonitor::new`], writing preference changes back to `path`.
    pub fn with_config_path(
        config: HallConfig,
        status: Arc<dyn StatusSource>,
        sink: Arc<dyn EffectSink>,
        path: PathBuf,
    ) -> Self {
        Self::build(config, status, sink, Some(path))
    }

    fn build(
        config: HallConfig,
        status: Arc<dyn StatusSource>,
        sink: Arc<dyn EffectSink>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState {
                    config,
                    cover: CoverState::default(),
                    lock_timer: DelayTimer::new(),
                    call_timer: DelayTimer::new(),
                    service_running: false,
                    admin_request_pending: false,
                    display_on_screen: false,
                    call: CallState::default(),
                    widgets: WidgetRegistry::new(),
                }),
                status,
                sink,
                config_path,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cover events
    // ─────────────────────────────────────────────────────────────────────

    /// Reconciles one proximity reading and runs the resulting sequence.
    pub fn on_reading(&self, value: f32) -> Option<Transition> {
        let (transition, effects) = {
            let mut state = self.shared.lock();
            if !state.service_running {
                tracing::trace!(value, "Service not running; ignoring proximity reading");
                return None;
            }
            let transition = reconciler::reconcile(&mut state.cover, value, &*self.shared.status);
            let effects = match transition {
                Some(transition) => self.apply_transition(&mut state, transition),
                None => Vec::new(),
            };
            (transition, effects)
        };
        self.shared.sink.submit(effects);
        transition
    }

    /// Runs the close or open sequence for an already decided transition.
    pub fn on_transition(&self, transition: Transition) {
        let effects = {
            let mut state = self.shared.lock();
            self.apply_transition(&mut state, transition)
        };
        self.shared.sink.submit(effects);
    }

    /// The screen came on while the cover may be closed (power button).
    /// Re-runs the close sequence so the cover display shows and the lock
    /// is rescheduled.
    pub fn screen_on(&self) {
        let effects = {
            let mut state = self.shared.lock();
            if !state.service_running || !state.cover.is_closed() {
                return;
            }
            tracing::debug!("Screen on while cover closed");
            self.apply_transition(&mut state, Transition::Closed)
        };
        self.shared.sink.submit(effects);
    }

    fn apply_transition(&self, state: &mut MonitorState, transition: Transition) -> Vec<Effect> {
        let context = state.dispatch_context();
        let dispatch = dispatcher::on_transition(&mut state.cover, transition, &context);

        match dispatch.lock_timer {
            TimerCommand::Schedule(delay) => {
                let weak = Arc::downgrade(&self.shared);
                state
                    .lock_timer
                    .schedule(delay, move |generation| fire_lock(&weak, generation));
            }
            TimerCommand::Cancel => {
                if state.lock_timer.cancel() {
                    tracing::debug!("Pending screen lock cancelled");
                }
            }
            TimerCommand::Keep => {}
        }

        state.track_displays(&dispatch.effects);
        dispatch.effects
    }

    // ─────────────────────────────────────────────────────────────────────
    // Service lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Starts the service at boot if the user left it enabled.
    pub fn boot(&self) -> bool {
        let mut state = self.shared.lock();
        if state.config.pref_enabled {
            tracing::info!("Starting service at boot");
            state.service_running = true;
        } else {
            tracing::debug!("Service disabled; not starting at boot");
        }
        state.service_running
    }

    /// Enables the service, unless admin rights must be requested first.
    pub fn start_service(&self) -> ServiceStart {
        let (outcome, config) = {
            let mut state = self.shared.lock();
            state.config.pref_enabled = true;
            let outcome = if state.config.admin_active {
                state.service_running = true;
                tracing::info!("Service started");
                ServiceStart::Started
            } else {
                state.admin_request_pending = true;
                tracing::info!("Device admin required before the service can start");
                ServiceStart::AdminRequired
            };
            (outcome, state.config.clone())
        };
        self.shared.persist(&config);
        outcome
    }

    /// Stops the service and gives up admin rights.
    pub fn stop_service(&self) {
        let config = {
            let mut state = self.shared.lock();
            state.service_running = false;
            state.config.pref_enabled = false;
            state.config.admin_active = false;
            state.lock_timer.cancel();
            state.call_timer.cancel();
            tracing::info!("Service stopped");
            state.config.clone()
        };
        self.shared.persist(&config);
        self.shared.sink.submit(vec![Effect::RelinquishAdmin]);
    }

    /// Result of an admin rights request started by [`HallMonitor::start_service`].
    pub fn admin_request_result(&self, granted: bool) {
        let config = {
            let mut state = self.shared.lock();
            state.admin_request_pending = false;
            if granted {
                state.config.admin_active = true;
                state.service_running = true;
                tracing::info!("Device admin granted; service started");
            } else {
                state.config.pref_enabled = false;
                tracing::warn!("Device admin refused; disabling service");
            }
            state.config.clone()
        };
        self.shared.persist(&config);
    }

    /// Admin rights changed outside our control. Recorded and persisted
    /// only: losing rights does not stop the service.
    pub fn device_admin_status(&self, active: bool) {
        let config = {
            let mut state = self.shared.lock();
            state.config.admin_active = active;
            tracing::info!(admin_active = active, "Device admin status changed");
            state.config.clone()
        };
        self.shared.persist(&config);
    }

    pub fn service_running(&self) -> bool {
        self.shared.lock().service_running
    }

    // ─────────────────────────────────────────────────────────────────────
    // Call screening
    // ─────────────────────────────────────────────────────────────────────

    /// Screens an incoming call when the hall sensor reports the cover closed.
    /// The cover display is raised after a short delay so it lands over the
    /// dialer. Returns whether the call is being screened.
    pub fn incoming_call(&self, number: &str) -> bool {
        tracing::debug!(number, "Incoming call");
        if !cover_closed(&*self.shared.status) {
            return false;
        }

        let mut state = self.shared.lock();
        tracing::info!("Cover closed; screening call");
        state.call.ring(number);
        let delay = state.config.call_display_delay();
        let weak = Arc::downgrade(&self.shared);
        state
            .call_timer
            .schedule(delay, move |generation| fire_call_display(&weak, generation));
        true
    }

    pub fn call_finished(&self) {
        let mut state = self.shared.lock();
        tracing::debug!("Call finished; cleaning up");
        state.call_timer.cancel();
        state.call.finish();
    }

    pub fn answer_call(&self) {
        tracing::debug!("Answering call");
        self.shared.sink.submit(vec![Effect::Privileged {
            commands: command_sequence(ANSWER_CALL),
            output: OutputMode::Discard,
        }]);
    }

    pub fn hangup_call(&self) {
        tracing::debug!("Hanging up call");
        self.shared.lock().call.hang_up();
        self.shared.sink.submit(vec![Effect::Privileged {
            commands: command_sequence(HANGUP_CALL),
            output: OutputMode::Discard,
        }]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Widgets
    // ─────────────────────────────────────────────────────────────────────

    pub fn register_widget(&self, kind: &str) -> u32 {
        let id = self.shared.lock().widgets.register(kind);
        tracing::debug!(kind, id, "Widget registration started");
        id
    }

    pub fn unregister_widget(&self, kind: &str) -> Option<u32> {
        let removed = self.shared.lock().widgets.unregister(kind);
        tracing::debug!(kind, removed = ?removed, "Widget unregistered");
        removed
    }

    pub fn widget_picked(&self, id: u32, ok: bool) -> Result<(), WidgetError> {
        self.shared.lock().widgets.picked(id, ok)
    }

    pub fn widget_configured(&self, id: u32, ok: bool) -> Result<(), WidgetError> {
        self.shared.lock().widgets.configured(id, ok)
    }

    pub fn widget_enabled(&self, kind: &str) -> bool {
        self.shared.lock().widgets.is_enabled(kind)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn cover_state(&self) -> CoverState {
        self.shared.lock().cover
    }

    pub fn lock_pending(&self) -> bool {
        self.shared.lock().lock_timer.is_pending()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.shared.lock();
        MonitorSnapshot {
            cover: state.cover,
            service_running: state.service_running,
            pref_enabled: state.config.pref_enabled,
            pref_delay: state.config.pref_delay,
            root_enabled: state.config.root_enabled,
            admin_active: state.config.admin_active,
            admin_request_pending: state.admin_request_pending,
            display_on_screen: state.display_on_screen,
            lock_pending: state.lock_timer.is_pending(),
            call: state.call.clone(),
            widgets: state.widgets.bindings(),
        }
    }
}

fn fire_lock(weak: &Weak<Shared>, generation: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let fire = {
        let mut state = shared.lock();
        let fire = state.lock_timer.complete(generation) && state.cover.is_closed();
        if fire {
            // The cover display goes away with the screen.
            state.display_on_screen = false;
        }
        fire
    };
    if fire {
        shared.sink.submit(vec![Effect::LockScreen]);
    }
}

fn fire_call_display(weak: &Weak<Shared>, generation: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let fire = {
        let mut state = shared.lock();
        let fire = state.call_timer.complete(generation) && state.call.ringing;
        if fire {
            state.display_on_screen = true;
        }
        fire
    };
    if fire {
        shared.sink.submit(vec![Effect::ShowCoverDisplay]);
    }
}
