/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u64),
    /// Reported exactly once, on the tick that reaches zero.
    Expired,
    /// Already expired or stopped.
    Idle,
}

/// Whole-second countdown that the server can correct at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownController {
    remaining: u64,
    expired: bool,
    stopped: bool,
}

impl CountdownController {
    #[must_use]
    pub fn new(remaining_seconds: u64) -> Self {
        Self {
            remaining: remaining_seconds,
            expired: false,
            stopped: false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Replace the local estimate with the server's value. Ignored once the
    /// countdown has expired or been stopped.
    pub fn resync(&mut self, server_seconds: u64) {
        if self.expired || self.stopped {
            return;
        }
        self.remaining = server_seconds;
    }

    pub fn tick(&mut self) -> Tick {
        if self.expired || self.stopped {
            return Tick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.expired = true;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }
}
