/// Delay before a loss of signal clears the display.
pub const NO_DETECTION_TIMEOUT_MS: u64 = 200;

/// Single-shot delayed clear for loss of signal.
///
/// Holds at most one pending deadline. The owner polls it from its own loop,
/// so cancelling and firing never race: once `cancel` returns, `poll` cannot
/// report the old deadline.
#[derive(Debug, Clone)]
pub struct DetectionDebouncer {
    delay_ms: u64,
    deadline_ms: Option<u64>,
}

impl DetectionDebouncer {
    pub fn new() -> Self {
        Self::with_delay(NO_DETECTION_TIMEOUT_MS)
    }

    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline_ms: None,
        }
    }

    /// A note arrived: drop any pending clear.
    pub fn on_detection_present(&mut self) {
        self.cancel();
    }

    /// Nothing detected at `now_ms`. Arms the timer unless one is already
    /// running; a pending timer keeps its original deadline.
    pub fn on_detection_absent(&mut self, now_ms: u64) {
        if self.deadline_ms.is_none() {
            self.deadline_ms = Some(now_ms + self.delay_ms);
        }
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    /// True exactly once when the pending deadline has been reached.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for DetectionDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
