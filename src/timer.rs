use serde::Serialize;

/// Remaining time below this many seconds is shown as a warning state.
pub const LOW_TIME_SECONDS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownState {
    Running,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; carries the seconds left after this tick.
    Running(u32),
    /// Reached zero on this tick. Reported once.
    Expired,
    /// Already expired or cancelled; nothing happens.
    Stopped,
}

/// One-second countdown driven by an external scheduler calling `tick`.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u32,
    state: CountdownState,
}

impl Countdown {
    pub fn new(seconds: u32) -> Self {
        Self {
            remaining: seconds,
            state: CountdownState::Running,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    pub fn tick(&mut self) -> Tick {
        if !self.is_running() {
            return Tick::Stopped;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = CountdownState::Expired;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn cancel(&mut self) {
        if self.is_running() {
            self.state = CountdownState::Cancelled;
        }
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn is_low_time(seconds: u32) -> bool {
    seconds < LOW_TIME_SECONDS
}
