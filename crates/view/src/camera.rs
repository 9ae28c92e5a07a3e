use foundation::math::{Frame, Projection, ProjectionKind, SkyCoord, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest field of view accepted when no range is configured (one arcsecond).
pub const MIN_FOV_DEG: f64 = 1.0 / 3600.0;

/// Allowed field-of-view interval, in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FovRange {
    pub min: f64,
    pub max: f64,
}

impl Default for FovRange {
    fn default() -> Self {
        Self {
            min: MIN_FOV_DEG,
            max: 360.0,
        }
    }
}

impl FovRange {
    /// Bounds given in the wrong order are swapped.
    pub fn new(a: f64, b: f64) -> Self {
        if a > b {
            Self { min: b, max: a }
        } else {
            Self { min: a, max: b }
        }
    }

    pub fn clamp(&self, fov_deg: f64) -> f64 {
        fov_deg.clamp(self.min, self.max)
    }
}

/// Complete description of what the view shows.
///
/// `center` is always expressed in `frame`. `fov_deg` spans the screen width.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraState {
    pub center: SkyCoord,
    pub fov_deg: f64,
    pub frame: Frame,
    pub projection: ProjectionKind,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl CameraState {
    pub fn new(center: SkyCoord, fov_deg: f64, projection: ProjectionKind, width: u32, height: u32) -> Self {
        Self {
            center,
            fov_deg,
            frame: center.frame(),
            projection,
            screen_width: width.max(1),
            screen_height: height.max(1),
        }
    }

    pub fn projection(&self) -> Projection {
        Projection::new(self.projection, self.center)
    }

    /// Same camera with its center re-expressed in `frame`.
    pub fn in_frame(mut self, frame: Frame) -> Self {
        self.center = self.center.to_frame(frame);
        self.frame = frame;
        self
    }

    /// Field of view as `[horizontal, vertical]`, each capped at 180°.
    pub fn fov_xy(&self) -> [f64; 2] {
        let aspect = f64::from(self.screen_height) / f64::from(self.screen_width);
        [self.fov_deg.min(180.0), (self.fov_deg * aspect).min(180.0)]
    }

    /// Angle covered by one screen pixel, in degrees.
    pub fn pixel_angle_deg(&self) -> f64 {
        self.fov_deg.min(180.0) / f64::from(self.screen_width)
    }

    /// Screen pixels per plane unit.
    pub fn pixel_scale(&self) -> f64 {
        let half = self.projection.half_extent(self.fov_deg / 2.0);
        f64::from(self.screen_width) / 2.0 / half.max(f64::EPSILON)
    }

    /// Plane point under a screen pixel (origin top-left, `y` down).
    pub fn pixel_to_plane(&self, x: f64, y: f64) -> Vec2 {
        let scale = self.pixel_scale();
        Vec2::new(
            (x - f64::from(self.screen_width) / 2.0) / scale,
            (f64::from(self.screen_height) / 2.0 - y) / scale,
        )
    }

    pub fn plane_to_pixel(&self, p: Vec2) -> (f64, f64) {
        let scale = self.pixel_scale();
        (
            f64::from(self.screen_width) / 2.0 + p.x * scale,
            f64::from(self.screen_height) / 2.0 - p.y * scale,
        )
    }

    pub fn world_to_pixel(&self, coord: &SkyCoord) -> Option<(f64, f64)> {
        let p = self.projection().project(coord)?;
        Some(self.plane_to_pixel(p))
    }

    /// Sky position under a pixel, in the camera frame.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> Option<SkyCoord> {
        self.projection().unproject(self.pixel_to_plane(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraState, FovRange};
    use foundation::math::{Frame, ProjectionKind, SkyCoord};

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "expected {a} ≈ {b} (eps={eps})");
    }

    fn camera() -> CameraState {
        CameraState::new(SkyCoord::equatorial(83.6, 22.0), 10.0, ProjectionKind::Sin, 800, 600)
    }

    #[test]
    fn fov_range_swaps_and_clamps() {
        let r = FovRange::new(30.0, 2.0);
        assert_eq!(r.min, 2.0);
        assert_eq!(r.max, 30.0);
        assert_eq!(r.clamp(60.0), 30.0);
        assert_eq!(r.clamp(1.0), 2.0);
        assert_eq!(r.clamp(10.0), 10.0);
    }

    #[test]
    fn fov_xy_caps_at_180() {
        let mut cam = camera();
        assert_eq!(cam.fov_xy(), [10.0, 7.5]);
        cam.fov_deg = 300.0;
        cam.projection = ProjectionKind::Aitoff;
        assert_eq!(cam.fov_xy(), [180.0, 180.0]);
    }

    #[test]
    fn screen_center_is_view_center() {
        let cam = camera();
        let c = cam.pixel_to_world(400.0, 300.0).unwrap();
        assert_close(c.lon(), 83.6, 1e-9);
        assert_close(c.lat(), 22.0, 1e-9);
    }

    #[test]
    fn pixel_world_round_trip() {
        let cam = camera();
        for (x, y) in [(0.0, 0.0), (799.0, 10.0), (123.0, 456.0), (400.0, 599.0)] {
            let world = cam.pixel_to_world(x, y).unwrap();
            let (px, py) = cam.world_to_pixel(&world).unwrap();
            assert_close(px, x, 1e-6);
            assert_close(py, y, 1e-6);
        }
    }

    #[test]
    fn screen_edge_spans_half_fov() {
        let cam = CameraState::new(SkyCoord::equatorial(0.0, 0.0), 20.0, ProjectionKind::Sin, 800, 600);
        let left = cam.pixel_to_world(0.0, 300.0).unwrap();
        let right = cam.pixel_to_world(800.0, 300.0).unwrap();
        // East is to the left.
        assert_close(left.lon(), 10.0, 1e-9);
        assert_close(right.lon(), 350.0, 1e-9);
    }

    #[test]
    fn in_frame_converts_center() {
        let cam = camera().in_frame(Frame::Galactic);
        assert_eq!(cam.frame, Frame::Galactic);
        assert_eq!(cam.center.frame(), Frame::Galactic);
        let back = cam.center.to_frame(Frame::Equatorial);
        assert_close(back.lon(), 83.6, 1e-6);
    }
}
