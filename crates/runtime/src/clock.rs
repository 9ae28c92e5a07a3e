use foundation::time::Time;

/// Fixed-cadence gate for work driven by an external render loop.
///
/// The loop may call in at any rate; `poll` only reports a tick once at least
/// `cadence_ms` has elapsed since the previous accepted one. The first poll
/// always ticks.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TickClock {
    cadence_ms: f64,
    last: Option<Time>,
    ticks: u64,
}

impl TickClock {
    pub fn new(cadence_ms: f64) -> Self {
        Self {
            cadence_ms: cadence_ms.max(0.0),
            last: None,
            ticks: 0,
        }
    }

    pub fn cadence_ms(&self) -> f64 {
        self.cadence_ms
    }

    /// Number of accepted ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_due(&self, now: Time) -> bool {
        match self.last {
            None => true,
            Some(last) => now.since(last) >= self.cadence_ms,
        }
    }

    /// Returns `true` (and records the tick) if a tick is due at `now`.
    pub fn poll(&mut self, now: Time) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last = Some(now);
        self.ticks += 1;
        true
    }

    /// Forgets the last tick so the next poll fires immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::TickClock;
    use foundation::time::Time;

    #[test]
    fn first_poll_ticks() {
        let mut c = TickClock::new(50.0);
        assert!(c.poll(Time(0.0)));
        assert_eq!(c.ticks(), 1);
    }

    #[test]
    fn respects_cadence() {
        let mut c = TickClock::new(50.0);
        assert!(c.poll(Time(0.0)));
        assert!(!c.poll(Time(16.0)));
        assert!(!c.poll(Time(49.9)));
        assert!(c.poll(Time(50.0)));
        assert!(!c.poll(Time(60.0)));
        assert!(c.poll(Time(200.0)));
        assert_eq!(c.ticks(), 3);
    }

    #[test]
    fn reset_allows_immediate_tick() {
        let mut c = TickClock::new(50.0);
        assert!(c.poll(Time(0.0)));
        c.reset();
        assert!(c.poll(Time(1.0)));
    }
}
