/// Milliseconds between two samples of a wrapping `u32` clock. A sample
/// smaller than `since` is taken as a single rollover.
pub(crate) const fn elapsed(since: u32, now: u32) -> u32 {
    if since <= now {
        now - since
    } else {
        u32::MAX - since + now
    }
}

/// One-shot millisecond countdown, advanced by the elapsed time between
/// ticks. Used both for the CONNACK deadline and the keep-alive interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Countdown {
    remaining: u32,
}

impl Countdown {
    pub(crate) fn arm(&mut self, ms: u32) {
        self.remaining = ms;
    }

    pub(crate) fn cancel(&mut self) {
        self.remaining = 0;
    }

    /// Returns `true` once `elapsed` reaches the remaining time. The caller
    /// re-arms or cancels.
    pub(crate) fn advance(&mut self, elapsed: u32) -> bool {
        if elapsed >= self.remaining {
            return true;
        }

        self.remaining -= elapsed;
        false
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }
}
