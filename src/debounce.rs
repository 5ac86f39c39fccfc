use std::time::{Duration, Instant};

/// Coalesces bursts of changes into one write.
///
/// Each `touch` restarts the quiet window; the write is due once no change
/// has arrived for the whole window.
///
/// # Functional Core
/// Time is passed in, never read, so the debouncer is deterministic.
#[derive(Debug, Clone)]
pub struct WriteDebouncer {
    window: Duration,
    last_change: Option<Instant>,
}

impl WriteDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_change: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a change at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    pub fn is_dirty(&self) -> bool {
        self.last_change.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last_change
            .is_some_and(|changed| now.saturating_duration_since(changed) >= self.window)
    }

    /// Consume the pending change if its window has elapsed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.last_change = None;
            true
        } else {
            false
        }
    }

    /// Consume the pending change regardless of the window (forced flush).
    pub fn take(&mut self) -> bool {
        self.last_change.take().is_some()
    }
}
