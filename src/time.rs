use embedded_time::{Clock, Instant, duration::Milliseconds, rate::Fraction};

/// Millisecond clock on top of `embassy_time`, counting from its creation.
/// Wraps after about 49 days, which the session tolerates.
pub struct EmbassyClock {
    start: embassy_time::Instant,
}

impl Default for EmbassyClock {
    fn default() -> Self {
        Self {
            start: embassy_time::Instant::now(),
        }
    }
}

impl EmbassyClock {
    /// Value to feed into `Client::start` and `Client::continue_tick`.
    pub fn now(&self) -> Milliseconds<u32> {
        Milliseconds(self.elapsed_ms())
    }

    fn elapsed_ms(&self) -> u32 {
        let elapsed = embassy_time::Instant::now().duration_since(self.start);
        // truncation is the wraparound
        elapsed.as_millis() as u32
    }
}

impl Clock for EmbassyClock {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
        Ok(Instant::new(self.elapsed_ms()))
    }
}
