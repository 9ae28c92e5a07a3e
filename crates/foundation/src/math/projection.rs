//! Sky-to-plane projections.
//!
//! A [`Projection`] is centered on a sky position: the sphere is first rotated
//! so the center sits at local `(0, 0)`, then the chosen [`ProjectionKind`]
//! maps local longitude/latitude onto the plane. Plane axes follow the sky
//! convention of looking out from inside the sphere: north is `+y` and east
//! is `-x`.
//!
//! Points outside a projection's domain come back as `None`. That is the
//! normal "not visible from here" answer, not an error.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Frame, SkyCoord, Vec2, Vec3};

/// Tolerance used when testing plane points against a domain boundary.
const DOMAIN_EPS: f64 = 1e-12;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    /// Orthographic (`SIN`): one hemisphere, plane domain is the unit disc.
    #[default]
    Sin,
    /// Hammer–Aitoff (`AIT`): the whole sphere inside a 2√2 × √2 ellipse.
    Aitoff,
}

impl ProjectionKind {
    pub fn label(self) -> &'static str {
        match self {
            ProjectionKind::Sin => "SIN",
            ProjectionKind::Aitoff => "AIT",
        }
    }

    /// Lenient name lookup: unknown names fall back to `Sin`.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Widest field of view that still maps into the plane domain.
    pub fn max_fov_deg(self) -> f64 {
        match self {
            ProjectionKind::Sin => 180.0,
            ProjectionKind::Aitoff => 360.0,
        }
    }

    /// Projects local spherical coordinates (radians, `lon ∈ (-π, π]`).
    ///
    /// Returned `x` grows toward local east; [`Projection`] flips it.
    pub fn project_local(self, lon: f64, lat: f64) -> Option<Vec2> {
        let (sin_lat, cos_lat) = lat.sin_cos();
        match self {
            ProjectionKind::Sin => {
                let (sin_lon, cos_lon) = lon.sin_cos();
                if cos_lat * cos_lon < 0.0 {
                    return None;
                }
                Some(Vec2::new(cos_lat * sin_lon, sin_lat))
            }
            ProjectionKind::Aitoff => {
                let (sin_half, cos_half) = (lon / 2.0).sin_cos();
                let gamma = 1.0 / ((1.0 + cos_lat * cos_half) / 2.0).sqrt();
                Some(Vec2::new(2.0 * gamma * cos_lat * sin_half, gamma * sin_lat))
            }
        }
    }

    /// Inverse of [`ProjectionKind::project_local`]; returns `(lon, lat)` in radians.
    pub fn unproject_local(self, p: Vec2) -> Option<(f64, f64)> {
        if !self.contains(p) {
            return None;
        }
        match self {
            ProjectionKind::Sin => {
                let depth = (1.0 - p.x * p.x - p.y * p.y).max(0.0).sqrt();
                let lon = p.x.atan2(depth);
                let lat = p.y.atan2(p.x.hypot(depth));
                Some((lon, lat))
            }
            ProjectionKind::Aitoff => {
                let z2 = (1.0 - (p.x / 4.0).powi(2) - (p.y / 2.0).powi(2)).max(0.5);
                let z = z2.sqrt();
                let lon = 2.0 * (z * p.x / 2.0).atan2(2.0 * z2 - 1.0);
                let lat = (p.y * z).clamp(-1.0, 1.0).asin();
                Some((lon, lat))
            }
        }
    }

    /// Normalized radius of `p` relative to the domain boundary (`1` on the edge).
    fn domain_radius(self, p: Vec2) -> f64 {
        match self {
            ProjectionKind::Sin => p.length(),
            ProjectionKind::Aitoff => {
                let a = 2.0 * std::f64::consts::SQRT_2;
                let b = std::f64::consts::SQRT_2;
                ((p.x / a).powi(2) + (p.y / b).powi(2)).sqrt()
            }
        }
    }

    pub fn contains(self, p: Vec2) -> bool {
        self.domain_radius(p) <= 1.0 + DOMAIN_EPS
    }

    /// Pulls an out-of-domain point radially back onto the domain boundary.
    pub fn clamp_to_domain(self, p: Vec2) -> Vec2 {
        let r = self.domain_radius(p);
        if r <= 1.0 {
            return p;
        }
        p.scale(1.0 / r)
    }

    /// Plane distance from the center to a point `half_fov_deg` away along local east.
    ///
    /// Angles past the domain edge are clamped to it.
    pub fn half_extent(self, half_fov_deg: f64) -> f64 {
        let max_half = self.max_fov_deg() / 2.0;
        let angle = half_fov_deg.clamp(0.0, max_half).to_radians();
        match self {
            ProjectionKind::Sin => angle.sin(),
            ProjectionKind::Aitoff => {
                let (sin_half, cos_half) = (angle / 2.0).sin_cos();
                2.0 * sin_half / ((1.0 + cos_half) / 2.0).sqrt()
            }
        }
    }
}

impl FromStr for ProjectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sin" | "sinus" | "orthographic" => Ok(ProjectionKind::Sin),
            "ait" | "aitoff" => Ok(ProjectionKind::Aitoff),
            other => Err(format!("unknown projection: {other:?}")),
        }
    }
}

/// A projection kind bound to a view center.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Projection {
    kind: ProjectionKind,
    center: SkyCoord,
    // Local basis: toward the center, local east, local north.
    axis_center: Vec3,
    axis_east: Vec3,
    axis_north: Vec3,
}

impl Projection {
    pub fn new(kind: ProjectionKind, center: SkyCoord) -> Self {
        let (sin_lon, cos_lon) = center.lon().to_radians().sin_cos();
        let (sin_lat, cos_lat) = center.lat().to_radians().sin_cos();
        Self {
            kind,
            center,
            axis_center: center.to_unit_vector(),
            axis_east: Vec3::new(-sin_lon, cos_lon, 0.0),
            axis_north: Vec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
        }
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn center(&self) -> SkyCoord {
        self.center
    }

    pub fn frame(&self) -> Frame {
        self.center.frame()
    }

    /// Sky to plane. `coord` may be in any frame; it is converted to the center's frame.
    pub fn project(&self, coord: &SkyCoord) -> Option<Vec2> {
        let v = coord.to_frame(self.center.frame()).to_unit_vector();
        self.project_vector(v)
    }

    /// Sky to plane for a unit vector already expressed in the center's frame.
    pub fn project_vector(&self, v: Vec3) -> Option<Vec2> {
        let x = v.dot(self.axis_center);
        let y = v.dot(self.axis_east);
        let z = v.dot(self.axis_north);
        let lon = y.atan2(x);
        let lat = z.atan2(x.hypot(y));
        let p = self.kind.project_local(lon, lat)?;
        Some(Vec2::new(-p.x, p.y))
    }

    /// Plane to sky, in the center's frame.
    pub fn unproject(&self, p: Vec2) -> Option<SkyCoord> {
        let v = self.unproject_vector(p)?;
        Some(SkyCoord::from_vector(v, self.center.frame()))
    }

    pub fn unproject_vector(&self, p: Vec2) -> Option<Vec3> {
        let (lon, lat) = self.kind.unproject_local(Vec2::new(-p.x, p.y))?;
        let (sin_lon, cos_lon) = lon.sin_cos();
        let (sin_lat, cos_lat) = lat.sin_cos();
        Some(
            self.axis_center.scale(cos_lat * cos_lon)
                + self.axis_east.scale(cos_lat * sin_lon)
                + self.axis_north.scale(sin_lat),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Projection, ProjectionKind};
    use crate::math::{Frame, SkyCoord, Vec2};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn assert_round_trip(proj: &Projection, c: SkyCoord) {
        let p = proj
            .project(&c)
            .unwrap_or_else(|| panic!("{c:?} should be visible from {:?}", proj.center()));
        let back = proj.unproject(p).expect("projected point must unproject");
        let d = c.angular_distance(&back);
        assert!(d <= 1e-9, "round trip of {c:?} drifted {d} deg");
    }

    #[test]
    fn center_maps_to_origin() {
        for kind in [ProjectionKind::Sin, ProjectionKind::Aitoff] {
            let center = SkyCoord::equatorial(83.6, 22.0);
            let p = Projection::new(kind, center).project(&center).unwrap();
            assert_close(p.x, 0.0, 1e-12);
            assert_close(p.y, 0.0, 1e-12);
        }
    }

    #[test]
    fn east_is_left_north_is_up() {
        let proj = Projection::new(ProjectionKind::Sin, SkyCoord::equatorial(10.0, 0.0));
        let east = proj.project(&SkyCoord::equatorial(20.0, 0.0)).unwrap();
        let north = proj.project(&SkyCoord::equatorial(10.0, 10.0)).unwrap();
        assert!(east.x < 0.0);
        assert!(north.y > 0.0);
    }

    #[test]
    fn sin_round_trip_within_hemisphere() {
        for center in [
            SkyCoord::equatorial(0.0, 0.0),
            SkyCoord::equatorial(250.0, -60.0),
            SkyCoord::galactic(0.0, 90.0),
        ] {
            let proj = Projection::new(ProjectionKind::Sin, center);
            let mut y = -0.9;
            while y <= 0.9 {
                let mut x = -0.9;
                while x <= 0.9 {
                    if x * x + y * y < 0.9 {
                        let sample = proj.unproject(Vec2::new(x, y)).unwrap();
                        assert_round_trip(&proj, sample);
                    }
                    x += 0.15;
                }
                y += 0.15;
            }
        }
    }

    #[test]
    fn aitoff_round_trip_whole_sky() {
        let proj = Projection::new(ProjectionKind::Aitoff, SkyCoord::galactic(0.0, 0.0));
        let mut lat = -85.0;
        while lat <= 85.0 {
            let mut lon: f64 = 0.0;
            while lon < 360.0 {
                // Skip the anti-center seam where longitude is two-valued.
                if (lon - 180.0).abs() > 1.0 {
                    assert_round_trip(&proj, SkyCoord::galactic(lon, lat));
                }
                lon += 12.5;
            }
            lat += 8.5;
        }
    }

    #[test]
    fn sin_back_hemisphere_is_undefined() {
        let proj = Projection::new(ProjectionKind::Sin, SkyCoord::equatorial(0.0, 0.0));
        assert!(proj.project(&SkyCoord::equatorial(180.0, 0.0)).is_none());
        assert!(proj.project(&SkyCoord::equatorial(120.0, 10.0)).is_none());
        assert!(proj.unproject(Vec2::new(0.9, 0.9)).is_none());
    }

    #[test]
    fn aitoff_outside_ellipse_is_undefined() {
        let proj = Projection::new(ProjectionKind::Aitoff, SkyCoord::equatorial(0.0, 0.0));
        assert!(proj.unproject(Vec2::new(2.9, 0.0)).is_none());
        assert!(proj.unproject(Vec2::new(0.0, 1.5)).is_none());
        assert!(proj.unproject(Vec2::new(2.8, 0.0)).is_some());
    }

    #[test]
    fn projects_other_frames_through_conversion() {
        let center = SkyCoord::galactic(0.0, 0.0);
        let proj = Projection::new(ProjectionKind::Sin, center);
        let same_point = center.to_frame(Frame::Equatorial);
        let p = proj.project(&same_point).unwrap();
        assert_close(p.length(), 0.0, 1e-9);
        assert_eq!(proj.unproject(p).unwrap().frame(), Frame::Galactic);
    }

    #[test]
    fn clamp_pulls_points_onto_boundary() {
        let k = ProjectionKind::Sin;
        let c = k.clamp_to_domain(Vec2::new(3.0, 4.0));
        assert_close(c.length(), 1.0, 1e-15);
        assert!(k.contains(c));

        let a = ProjectionKind::Aitoff;
        let c = a.clamp_to_domain(Vec2::new(10.0, 10.0));
        assert!(a.contains(c));
        assert!(a.unproject_local(c).is_some());
    }

    #[test]
    fn half_extent_matches_projection() {
        assert_close(ProjectionKind::Sin.half_extent(30.0), 0.5, 1e-15);
        assert_close(ProjectionKind::Sin.half_extent(120.0), 1.0, 1e-15);
        let p = ProjectionKind::Aitoff
            .project_local(90f64.to_radians(), 0.0)
            .unwrap();
        assert_close(ProjectionKind::Aitoff.half_extent(90.0), p.x, 1e-15);
        assert_close(
            ProjectionKind::Aitoff.half_extent(180.0),
            2.0 * std::f64::consts::SQRT_2,
            1e-12,
        );
    }

    #[test]
    fn lenient_projection_names() {
        assert_eq!(ProjectionKind::parse_or_default("AITOFF"), ProjectionKind::Aitoff);
        assert_eq!(ProjectionKind::parse_or_default("mollweide"), ProjectionKind::Sin);
    }
}
