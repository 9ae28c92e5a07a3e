//! Timed camera transitions.
//!
//! The animator never owns the camera. Each `tick` returns the center and
//! field of view the view should adopt, plus any completion callbacks that
//! became due, and the caller applies them in one step.

use foundation::math::{SkyCoord, Vec3};
use foundation::time::{Time, TimeSpan};
use runtime::TickClock;
use serde::{Deserialize, Serialize};

/// Runs once when an animation reaches its end.
pub type OnComplete = Box<dyn FnOnce()>;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Minimum time between intermediate frames.
    pub cadence_ms: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self { cadence_ms: 50.0 }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AnimationKind {
    Pan,
    Zoom,
}

// Each slot keeps its own cadence clock.
struct Slot<T> {
    start: T,
    end: T,
    span: TimeSpan,
    clock: TickClock,
    on_complete: Option<OnComplete>,
}

impl<T> Slot<T> {
    fn new(start: T, end: T, span: TimeSpan, cadence_ms: f64, on_complete: Option<OnComplete>) -> Self {
        Self {
            start,
            end,
            span,
            clock: TickClock::new(cadence_ms),
            on_complete,
        }
    }

    /// Fraction reached at `now` if a frame is due, finishing frames always being due.
    fn due(&mut self, now: Time) -> Option<f64> {
        let t = self.span.fraction_at(now);
        if self.clock.poll(now) || t >= 1.0 {
            Some(t)
        } else {
            None
        }
    }
}

/// What a tick asks the view to change.
#[derive(Default)]
pub struct CameraUpdate {
    pub center: Option<SkyCoord>,
    pub fov_deg: Option<f64>,
    /// Animations that finished on this tick.
    pub finished: Vec<AnimationKind>,
    callbacks: Vec<OnComplete>,
}

impl std::fmt::Debug for CameraUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraUpdate")
            .field("center", &self.center)
            .field("fov_deg", &self.fov_deg)
            .field("finished", &self.finished)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl CameraUpdate {
    pub fn is_empty(&self) -> bool {
        self.center.is_none() && self.fov_deg.is_none() && self.callbacks.is_empty()
    }

    /// Runs the completion callbacks. Call after the new camera is applied.
    pub fn run_callbacks(&mut self) {
        for callback in self.callbacks.drain(..) {
            callback();
        }
    }
}

/// Pan and zoom animations, one slot each.
///
/// Starting an animation of a kind that is already running replaces it; the
/// replaced animation's callback is dropped without running.
pub struct CameraAnimator {
    cadence_ms: f64,
    pan: Option<Slot<SkyCoord>>,
    zoom: Option<Slot<f64>>,
}

impl std::fmt::Debug for CameraAnimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraAnimator")
            .field("cadence_ms", &self.cadence_ms)
            .field("pan", &self.pan.as_ref().map(|s| (s.start, s.end, s.span)))
            .field("zoom", &self.zoom.as_ref().map(|s| (s.start, s.end, s.span)))
            .finish()
    }
}

impl Default for CameraAnimator {
    fn default() -> Self {
        Self::new(AnimationConfig::default())
    }
}

impl CameraAnimator {
    pub fn new(config: AnimationConfig) -> Self {
        Self {
            cadence_ms: config.cadence_ms,
            pan: None,
            zoom: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.pan.is_some() || self.zoom.is_some()
    }

    pub fn is_animating(&self, kind: AnimationKind) -> bool {
        match kind {
            AnimationKind::Pan => self.pan.is_some(),
            AnimationKind::Zoom => self.zoom.is_some(),
        }
    }

    /// Pans along the great circle from `from` to `to`, in `from`'s frame.
    pub fn pan(
        &mut self,
        from: SkyCoord,
        to: SkyCoord,
        duration_ms: f64,
        now: Time,
        on_complete: Option<OnComplete>,
    ) {
        self.pan = Some(Slot::new(
            from,
            to.to_frame(from.frame()),
            TimeSpan::starting_at(now, duration_ms),
            self.cadence_ms,
            on_complete,
        ));
    }

    pub fn zoom(
        &mut self,
        from_deg: f64,
        to_deg: f64,
        duration_ms: f64,
        now: Time,
        on_complete: Option<OnComplete>,
    ) {
        self.zoom = Some(Slot::new(
            from_deg,
            to_deg,
            TimeSpan::starting_at(now, duration_ms),
            self.cadence_ms,
            on_complete,
        ));
    }

    /// Cancels one kind; its callback never runs.
    pub fn cancel(&mut self, kind: AnimationKind) -> bool {
        match kind {
            AnimationKind::Pan => self.pan.take().is_some(),
            AnimationKind::Zoom => self.zoom.take().is_some(),
        }
    }

    /// Cancels everything; no callbacks run.
    pub fn stop(&mut self) {
        self.pan = None;
        self.zoom = None;
    }

    /// Advances running animations.
    ///
    /// Each animation produces intermediate frames at most once per cadence
    /// period of its own; an animation reaching its end is always reported on
    /// the tick it ends.
    pub fn tick(&mut self, now: Time) -> CameraUpdate {
        let mut update = CameraUpdate::default();

        if let Some((slot, t)) = self.pan.as_mut().and_then(|s| s.due(now).map(|t| (s, t))) {
            if t >= 1.0 {
                update.center = Some(slot.end);
                update.finished.push(AnimationKind::Pan);
                update.callbacks.extend(slot.on_complete.take());
                self.pan = None;
            } else {
                update.center = Some(great_circle_point(&slot.start, &slot.end, t));
            }
        }

        if let Some((slot, t)) = self.zoom.as_mut().and_then(|s| s.due(now).map(|t| (s, t))) {
            if t >= 1.0 {
                update.fov_deg = Some(slot.end);
                update.finished.push(AnimationKind::Zoom);
                update.callbacks.extend(slot.on_complete.take());
                self.zoom = None;
            } else {
                update.fov_deg = Some(eased_fov(slot.start, slot.end, t));
            }
        }

        update
    }
}

/// Zoom easing: fast at first, settling toward the end.
pub fn eased_fov(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t.clamp(0.0, 1.0).sqrt()
}

/// Point a fraction `t` of the way along the great circle from `a` to `b`.
///
/// Coincident endpoints return `a`. Antipodal endpoints have no unique great
/// circle; the path then goes through a fixed axis perpendicular to `a`.
pub fn great_circle_point(a: &SkyCoord, b: &SkyCoord, t: f64) -> SkyCoord {
    let frame = a.frame();
    let d = a.angular_distance(b).to_radians();
    let va = a.to_unit_vector();
    let vb = b.to_frame(frame).to_unit_vector();
    let sin_d = d.sin();

    if sin_d.abs() < 1e-12 {
        if d < std::f64::consts::FRAC_PI_2 {
            return *a;
        }
        let axis = perpendicular(va);
        let angle = t * std::f64::consts::PI;
        let v = va.scale(angle.cos()) + axis.scale(angle.sin());
        return SkyCoord::from_vector(v, frame);
    }

    let wa = ((1.0 - t) * d).sin() / sin_d;
    let wb = (t * d).sin() / sin_d;
    SkyCoord::from_vector(va.scale(wa) + vb.scale(wb), frame)
}

fn perpendicular(v: Vec3) -> Vec3 {
    let helper = if v.z.abs() < 0.9 { Vec3::Z } else { Vec3::X };
    v.cross(helper).normalized().unwrap_or(Vec3::X)
}
