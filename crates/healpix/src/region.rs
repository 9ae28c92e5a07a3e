//! Regions on the sphere used to query the tessellation.
//!
//! All geometry runs on unit vectors in the region's own frame; the frame tag
//! only matters when a region is handed to something expressed in another
//! frame (see [`SkyRegion::to_frame`]).

use foundation::math::{Frame, SkyCoord, Vec3, convert_vector};

const ON_PLANE_EPS: f64 = 1e-15;

/// Everything within `radius` of `center`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SphericalCap {
    frame: Frame,
    center: Vec3,
    radius_rad: f64,
}

impl SphericalCap {
    pub fn new(center: SkyCoord, radius_deg: f64) -> Self {
        Self {
            frame: center.frame(),
            center: center.to_unit_vector(),
            radius_rad: radius_deg.clamp(0.0, 180.0).to_radians(),
        }
    }

    /// `center` must be a unit vector in `frame`.
    pub fn from_vector(center: Vec3, radius_rad: f64, frame: Frame) -> Self {
        Self {
            frame,
            center,
            radius_rad: radius_rad.clamp(0.0, std::f64::consts::PI),
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn center(&self) -> SkyCoord {
        SkyCoord::from_vector(self.center, self.frame)
    }

    pub fn center_vector(&self) -> Vec3 {
        self.center
    }

    pub fn radius_deg(&self) -> f64 {
        self.radius_rad.to_degrees()
    }

    pub fn radius_rad(&self) -> f64 {
        self.radius_rad
    }

    pub fn contains_vector(&self, v: Vec3) -> bool {
        self.center.angle_to(v) <= self.radius_rad
    }

    pub fn contains(&self, coord: &SkyCoord) -> bool {
        self.contains_vector(coord.to_frame(self.frame).to_unit_vector())
    }

    /// Same cap grown by `margin_rad`.
    pub fn inflated(&self, margin_rad: f64) -> Self {
        Self::from_vector(self.center, self.radius_rad + margin_rad, self.frame)
    }

    pub fn intersects_cap(&self, other: &SphericalCap) -> bool {
        self.center.angle_to(other.center) <= self.radius_rad + other.radius_rad
    }

    pub fn contains_cap(&self, other: &SphericalCap) -> bool {
        self.center.angle_to(other.center) + other.radius_rad <= self.radius_rad
    }

    pub fn to_frame(&self, frame: Frame) -> Self {
        Self {
            frame,
            center: convert_vector(self.center, self.frame, frame),
            radius_rad: self.radius_rad,
        }
    }
}

/// A polygon bounded by great-circle arcs between consecutive vertices.
///
/// The inside is the side holding `interior`, so the polygon need not be
/// convex and may be larger than a hemisphere.
#[derive(Debug, Clone, PartialEq)]
pub struct SphericalPolygon {
    frame: Frame,
    vertices: Vec<Vec3>,
    interior: Vec3,
}

impl SphericalPolygon {
    /// Returns `None` for fewer than three vertices.
    ///
    /// Vertices and interior point are converted into the frame of the first
    /// vertex.
    pub fn new(vertices: &[SkyCoord], interior: SkyCoord) -> Option<Self> {
        let frame = vertices.first()?.frame();
        if vertices.len() < 3 {
            return None;
        }
        let vertices = vertices
            .iter()
            .map(|c| c.to_frame(frame).to_unit_vector())
            .collect();
        Some(Self {
            frame,
            vertices,
            interior: interior.to_frame(frame).to_unit_vector(),
        })
    }

    /// Polygon whose interior point is the normalized vertex mean.
    ///
    /// Only meaningful for polygons smaller than a hemisphere.
    pub fn from_vertices(vertices: &[SkyCoord]) -> Option<Self> {
        let frame = vertices.first()?.frame();
        let sum = vertices
            .iter()
            .map(|c| c.to_frame(frame).to_unit_vector())
            .fold(Vec3::new(0.0, 0.0, 0.0), |acc, v| acc + v);
        let interior = SkyCoord::from_vector(sum.normalized()?, frame);
        Self::new(vertices, interior)
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> Vec<SkyCoord> {
        self.vertices
            .iter()
            .map(|v| SkyCoord::from_vector(*v, self.frame))
            .collect()
    }

    pub fn interior(&self) -> SkyCoord {
        SkyCoord::from_vector(self.interior, self.frame)
    }

    fn edges(&self) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Longest edge, in radians.
    pub fn longest_edge_rad(&self) -> f64 {
        self.edges().map(|(a, b)| a.angle_to(b)).fold(0.0, f64::max)
    }

    /// Crossing-parity test along the arc from the interior point to `v`.
    pub fn contains_vector(&self, v: Vec3) -> bool {
        // Two legs through a midpoint keep each arc shorter than π even when
        // `v` is antipodal to the interior point.
        let mid = (self.interior + v)
            .normalized()
            .unwrap_or_else(|| any_perpendicular(self.interior));
        let crossings = self
            .edges()
            .map(|(a, b)| {
                usize::from(arcs_intersect(self.interior, mid, a, b))
                    + usize::from(arcs_intersect(mid, v, a, b))
            })
            .sum::<usize>();
        crossings % 2 == 0
    }

    pub fn contains(&self, coord: &SkyCoord) -> bool {
        self.contains_vector(coord.to_frame(self.frame).to_unit_vector())
    }

    /// Smallest angular distance from `v` to the polygon boundary, in radians.
    pub fn boundary_distance(&self, v: Vec3) -> f64 {
        self.edges()
            .map(|(a, b)| arc_distance(v, a, b))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn intersects_cap(&self, cap: &SphericalCap) -> bool {
        let c = cap.center_vector();
        self.contains_vector(c) || self.boundary_distance(c) <= cap.radius_rad()
    }

    pub fn contains_cap(&self, cap: &SphericalCap) -> bool {
        let c = cap.center_vector();
        self.contains_vector(c) && self.boundary_distance(c) > cap.radius_rad()
    }

    pub fn to_frame(&self, frame: Frame) -> Self {
        Self {
            frame,
            vertices: self
                .vertices
                .iter()
                .map(|v| convert_vector(*v, self.frame, frame))
                .collect(),
            interior: convert_vector(self.interior, self.frame, frame),
        }
    }
}

/// Area of sky a tile query runs against.
#[derive(Debug, Clone, PartialEq)]
pub enum SkyRegion {
    AllSky,
    Cap(SphericalCap),
    Polygon(SphericalPolygon),
}

impl SkyRegion {
    /// Frame the region is expressed in; `None` for the frame-free whole sky.
    pub fn frame(&self) -> Option<Frame> {
        match self {
            SkyRegion::AllSky => None,
            SkyRegion::Cap(cap) => Some(cap.frame()),
            SkyRegion::Polygon(poly) => Some(poly.frame()),
        }
    }

    pub fn to_frame(&self, frame: Frame) -> SkyRegion {
        match self {
            SkyRegion::AllSky => SkyRegion::AllSky,
            SkyRegion::Cap(cap) => SkyRegion::Cap(cap.to_frame(frame)),
            SkyRegion::Polygon(poly) => SkyRegion::Polygon(poly.to_frame(frame)),
        }
    }

    pub fn contains(&self, coord: &SkyCoord) -> bool {
        match self {
            SkyRegion::AllSky => true,
            SkyRegion::Cap(cap) => cap.contains(coord),
            SkyRegion::Polygon(poly) => poly.contains(coord),
        }
    }

    /// Slack added to cell caps before intersection tests.
    ///
    /// Polygon edges are chords of a curved outline, so the true boundary can
    /// bulge past them.
    pub fn margin_rad(&self) -> f64 {
        match self {
            SkyRegion::Polygon(poly) => poly.longest_edge_rad() / 4.0,
            _ => 0.0,
        }
    }

    /// `cap` must already be in this region's frame.
    pub fn intersects_cap(&self, cap: &SphericalCap) -> bool {
        match self {
            SkyRegion::AllSky => true,
            SkyRegion::Cap(region) => region.intersects_cap(cap),
            SkyRegion::Polygon(poly) => poly.intersects_cap(cap),
        }
    }

    /// `cap` must already be in this region's frame.
    pub fn contains_cap(&self, cap: &SphericalCap) -> bool {
        match self {
            SkyRegion::AllSky => true,
            SkyRegion::Cap(region) => region.contains_cap(cap),
            SkyRegion::Polygon(poly) => poly.contains_cap(cap),
        }
    }
}

fn any_perpendicular(v: Vec3) -> Vec3 {
    let axis = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Z };
    v.cross(axis).normalized().unwrap_or(Vec3::Z)
}

/// Whether `p` (on the great circle with normal `n`) lies on the short arc `a → b`.
fn on_arc(a: Vec3, b: Vec3, n: Vec3, p: Vec3) -> bool {
    a.cross(p).dot(n) >= -ON_PLANE_EPS && p.cross(b).dot(n) >= -ON_PLANE_EPS
}

/// Short-arc intersection test.
fn arcs_intersect(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> bool {
    let n1 = a.cross(b);
    let n2 = c.cross(d);
    let side_c = c.dot(n1);
    let side_d = d.dot(n1);
    let side_a = a.dot(n2);
    let side_b = b.dot(n2);
    if side_c * side_d > 0.0 || side_a * side_b > 0.0 {
        return false;
    }
    let Some(p) = n1.cross(n2).normalized() else {
        return false;
    };
    [p, -p]
        .into_iter()
        .any(|x| on_arc(a, b, n1, x) && on_arc(c, d, n2, x))
}

/// Angular distance from `p` to the short arc `a → b`, in radians.
fn arc_distance(p: Vec3, a: Vec3, b: Vec3) -> f64 {
    let to_ends = p.angle_to(a).min(p.angle_to(b));
    let Some(n) = a.cross(b).normalized() else {
        return to_ends;
    };
    // Foot of the perpendicular from `p` onto the great circle.
    let Some(foot) = (p - n.scale(p.dot(n))).normalized() else {
        return to_ends;
    };
    if on_arc(a, b, n, foot) {
        p.dot(n).clamp(-1.0, 1.0).asin().abs()
    } else {
        to_ends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "expected {a} ≈ {b} (eps={eps})");
    }

    fn square(center_ra: f64, center_dec: f64, half: f64) -> SphericalPolygon {
        let corners = [
            SkyCoord::equatorial(center_ra - half, center_dec - half),
            SkyCoord::equatorial(center_ra + half, center_dec - half),
            SkyCoord::equatorial(center_ra + half, center_dec + half),
            SkyCoord::equatorial(center_ra - half, center_dec + half),
        ];
        SphericalPolygon::new(&corners, SkyCoord::equatorial(center_ra, center_dec)).unwrap()
    }

    #[test]
    fn cap_contains_by_angle() {
        let cap = SphericalCap::new(SkyCoord::equatorial(10.0, 0.0), 5.0);
        assert!(cap.contains(&SkyCoord::equatorial(14.9, 0.0)));
        assert!(!cap.contains(&SkyCoord::equatorial(15.1, 0.0)));
        assert_close(cap.center().lon(), 10.0, 1e-9);
    }

    #[test]
    fn cap_containment_and_overlap() {
        let big = SphericalCap::new(SkyCoord::equatorial(0.0, 0.0), 10.0);
        let small = SphericalCap::new(SkyCoord::equatorial(3.0, 0.0), 2.0);
        let far = SphericalCap::new(SkyCoord::equatorial(30.0, 0.0), 2.0);
        assert!(big.contains_cap(&small));
        assert!(big.intersects_cap(&small));
        assert!(!big.intersects_cap(&far));
        assert!(big.inflated(20f64.to_radians()).intersects_cap(&far));
    }

    #[test]
    fn polygon_contains_points() {
        let poly = square(50.0, 20.0, 5.0);
        assert!(poly.contains(&SkyCoord::equatorial(50.0, 20.0)));
        assert!(poly.contains(&SkyCoord::equatorial(53.0, 17.0)));
        assert!(!poly.contains(&SkyCoord::equatorial(60.0, 20.0)));
        assert!(!poly.contains(&SkyCoord::equatorial(230.0, -20.0)));
    }

    #[test]
    fn polygon_straddling_ra_zero() {
        let poly = square(0.0, 0.0, 3.0);
        assert!(poly.contains(&SkyCoord::equatorial(359.0, 1.0)));
        assert!(poly.contains(&SkyCoord::equatorial(1.0, -1.0)));
        assert!(!poly.contains(&SkyCoord::equatorial(180.0, 0.0)));
    }

    #[test]
    fn polygon_around_pole() {
        let ring: Vec<_> = (0..8)
            .map(|i| SkyCoord::equatorial(f64::from(i) * 45.0, 80.0))
            .collect();
        let poly = SphericalPolygon::new(&ring, SkyCoord::equatorial(0.0, 90.0)).unwrap();
        assert!(poly.contains(&SkyCoord::equatorial(123.0, 89.0)));
        assert!(!poly.contains(&SkyCoord::equatorial(123.0, 70.0)));
    }

    #[test]
    fn polygon_interior_point_selects_the_side() {
        let ring: Vec<_> = (0..8)
            .map(|i| SkyCoord::equatorial(f64::from(i) * 45.0, 80.0))
            .collect();
        let rest = SphericalPolygon::new(&ring, SkyCoord::equatorial(0.0, -90.0)).unwrap();
        assert!(!rest.contains(&SkyCoord::equatorial(123.0, 89.0)));
        assert!(rest.contains(&SkyCoord::equatorial(123.0, 0.0)));
    }

    #[test]
    fn polygon_needs_three_vertices() {
        let pts = [SkyCoord::equatorial(0.0, 0.0), SkyCoord::equatorial(1.0, 0.0)];
        assert!(SphericalPolygon::from_vertices(&pts).is_none());
    }

    #[test]
    fn boundary_distance_to_edge() {
        let poly = square(0.0, 0.0, 5.0);
        let d = poly.boundary_distance(SkyCoord::equatorial(0.0, 0.0).to_unit_vector());
        assert_close(d.to_degrees(), 5.0, 0.05);
    }

    #[test]
    fn polygon_cap_tests() {
        let poly = square(0.0, 0.0, 5.0);
        let inside = SphericalCap::new(SkyCoord::equatorial(0.0, 0.0), 1.0);
        let straddling = SphericalCap::new(SkyCoord::equatorial(6.0, 0.0), 2.0);
        let outside = SphericalCap::new(SkyCoord::equatorial(20.0, 0.0), 2.0);
        assert!(poly.contains_cap(&inside));
        assert!(poly.intersects_cap(&straddling));
        assert!(!poly.contains_cap(&straddling));
        assert!(!poly.intersects_cap(&outside));
    }

    #[test]
    fn region_frame_conversion_keeps_membership() {
        let region = SkyRegion::Cap(SphericalCap::new(SkyCoord::equatorial(83.6, 22.0), 2.0));
        let gal = region.to_frame(Frame::Galactic);
        assert_eq!(gal.frame(), Some(Frame::Galactic));
        let inside = SkyCoord::equatorial(84.0, 22.5);
        assert!(gal.contains(&inside.to_frame(Frame::Galactic)));
        assert!(gal.contains(&inside));
    }
}
