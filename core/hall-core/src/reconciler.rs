//! Proximity reading reconciliation.
//!
//! Proximity sensors are noisy, so a reading that disagrees with the tracked
//! cover state only counts once the hall sensor's own status agrees.

use crate::cover::{CoverState, Transition};
use crate::status::StatusSource;

/// Folds one proximity reading into `cover`.
///
/// Emits a transition (and updates `cover`) only when the reading implies a
/// different state and the status source confirms it. Same-state readings
/// are no-ops. An unreadable source counts as open: it confirms an opening
/// but never a close.
pub fn reconcile(
    cover: &mut CoverState,
    value: f32,
    source: &dyn StatusSource,
) -> Option<Transition> {
    let implied = CoverState::from_reading(value);
    tracing::debug!(
        value,
        cover = cover.as_str(),
        implied = implied.as_str(),
        "Proximity reading received"
    );

    if implied == *cover {
        return None;
    }

    match source.read_status() {
        Ok(actual) if actual == implied => {
            *cover = implied;
            let transition = Transition::from(implied);
            tracing::info!(transition = ?transition, "Cover transition confirmed");
            Some(transition)
        }
        Ok(actual) => {
            tracing::debug!(
                implied = implied.as_str(),
                actual = actual.as_str(),
                "Hall sensor disagrees with proximity reading; ignoring"
            );
            None
        }
        Err(err) if implied == CoverState::Open => {
            tracing::warn!(error = %err, "Hall sensor status unreadable; assuming open");
            *cover = CoverState::Open;
            Some(Transition::Opened)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Hall sensor status unreadable; close not confirmed");
            None
        }
    }
}
