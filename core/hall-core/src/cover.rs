use serde::Serialize;

/// Physical state of the flip cover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverState {
    #[default]
    Open,
    Closed,
}

impl CoverState {
    /// Proximity readings above zero mean nothing is near the sensor.
    pub fn from_reading(value: f32) -> Self {
        if value > 0.0 {
            CoverState::Open
        } else {
            CoverState::Closed
        }
    }

    pub fn is_closed(self) -> bool {
        self == CoverState::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoverState::Open => "open",
            CoverState::Closed => "closed",
        }
    }
}

/// A confirmed change of cover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Opened,
    Closed,
}

impl From<CoverState> for Transition {
    /// The transition that ends in `state`.
    fn from(state: CoverState) -> Self {
        match state {
            CoverState::Open => Transition::Opened,
            CoverState::Closed => Transition::Closed,
        }
    }
}

impl Transition {
    pub fn target(self) -> CoverState {
        match self {
            Transition::Opened => CoverState::Open,
            Transition::Closed => CoverState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_readings_mean_closed() {
        assert_eq!(CoverState::from_reading(0.0), CoverState::Closed);
        assert_eq!(CoverState::from_reading(-1.0), CoverState::Closed);
        assert_eq!(CoverState::from_reading(5.0), CoverState::Open);
    }

    #[test]
    fn transition_targets_round_trip() {
        for state in [CoverState::Open, CoverState::Closed] {
            assert_eq!(Transition::from(state).target(), state);
        }
    }

    #[test]
    fn default_state_is_open() {
        assert_eq!(CoverState::default(), CoverState::Open);
    }
}
