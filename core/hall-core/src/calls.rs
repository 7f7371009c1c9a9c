use serde::Serialize;

/// Incoming call being screened while the cover is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallState {
    pub ringing: bool,
    pub caller: Option<String>,
}

impl CallState {
    pub fn ring(&mut self, number: &str) {
        self.ringing = true;
        self.caller = Some(number.to_string());
    }

    pub fn hang_up(&mut self) {
        self.ringing = false;
    }

    pub fn finish(&mut self) {
        self.ringing = false;
        self.caller = None;
    }
}
