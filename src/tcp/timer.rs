use std::time::{Duration, Instant};

/// A scheduled retransmission of the unacked entry keyed by `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub key: u32,
}

/// One retransmission timer slot per connection. Scheduling replaces whatever
/// was pending, so at most one deadline is ever outstanding.
#[derive(Debug, Default)]
pub struct RetransmitTimer {
    slot: Option<Deadline>,
}

impl RetransmitTimer {
    pub fn schedule(&mut self, now: Instant, after: Duration, key: u32) {
        self.slot = Some(Deadline { at: now + after, key });
    }

    pub fn cancel(&mut self) {
        self.slot = None;
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.slot
    }

    /// Take the pending deadline if it has expired at `now`.
    pub fn expired(&mut self, now: Instant) -> Option<Deadline> {
        match self.slot {
            Some(d) if d.at <= now => self.slot.take(),
            _ => None,
        }
    }
}
