use std::time::Duration;
use tokio::time::Instant;

/// Elapsed-time tracker for the clip that is currently playing.
///
/// The clock only reports time; deciding what to do at the end of a clip is
/// left to the session.
#[derive(Debug, Clone, Default)]
pub struct ClipClock {
    reference: Option<Instant>,
    carry: Duration,
}

impl ClipClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts measuring from `now`, counting `carry` as already elapsed.
    pub fn start(&mut self, now: Instant, carry: Duration) {
        self.reference = Some(now);
        self.carry = carry;
    }

    /// Elapsed clip time at `now`, or `None` once the clock is stopped.
    pub fn tick(&self, now: Instant) -> Option<Duration> {
        self.reference
            .map(|reference| now.saturating_duration_since(reference) + self.carry)
    }

    /// Stops the clock. Returns whether it was running; stopping twice is fine.
    pub fn stop(&mut self) -> bool {
        self.reference.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.reference.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::ClipClock;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn reports_elapsed_plus_carry() {
        let mut clock = ClipClock::new();
        let t0 = Instant::now();
        clock.start(t0, Duration::from_millis(2_500));

        assert_eq!(clock.tick(t0), Some(Duration::from_millis(2_500)));
        assert_eq!(
            clock.tick(t0 + Duration::from_millis(100)),
            Some(Duration::from_millis(2_600))
        );
    }

    #[test]
    fn stop_is_idempotent() {
        let mut clock = ClipClock::new();
        assert!(!clock.stop());

        clock.start(Instant::now(), Duration::ZERO);
        assert!(clock.is_running());
        assert!(clock.stop());
        assert!(!clock.stop());
        assert_eq!(clock.tick(Instant::now()), None);
    }

    #[test]
    fn earlier_sample_does_not_go_negative() {
        let mut clock = ClipClock::new();
        let t0 = Instant::now() + Duration::from_secs(1);
        clock.start(t0, Duration::ZERO);
        assert_eq!(clock.tick(t0 - Duration::from_millis(10)), Some(Duration::ZERO));
    }
}
