/// Time primitives.
///
/// The engine never reads a wall clock: callers pass `Time` in from their
/// render loop, so everything driven by it stays replayable in tests.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64); // milliseconds

impl Time {
    pub fn from_millis(ms: f64) -> Self {
        Time(ms)
    }

    pub fn millis(self) -> f64 {
        self.0
    }

    pub fn after(self, ms: f64) -> Self {
        Time(self.0 + ms)
    }

    /// Milliseconds elapsed since `earlier` (negative if `earlier` is in the future).
    pub fn since(self, earlier: Time) -> f64 {
        self.0 - earlier.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeSpan {
    pub start: Time,
    pub end: Time,
}

impl TimeSpan {
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: Time, duration_ms: f64) -> Self {
        Self {
            start,
            end: start.after(duration_ms.max(0.0)),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end.0 - self.start.0).max(0.0)
    }

    /// Elapsed fraction of the span at `t`, clamped to `[0, 1]`.
    ///
    /// A zero-length span is complete as soon as it starts.
    pub fn fraction_at(&self, t: Time) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return if t.0 >= self.start.0 { 1.0 } else { 0.0 };
        }
        (t.since(self.start) / duration).clamp(0.0, 1.0)
    }
}
