use std::collections::BTreeSet;

use foundation::math::Frame;

use crate::cell::{HealpixCell, MAX_ORDER, cell_count};
use crate::region::SkyRegion;

/// Every cell at `order` that may overlap `region`.
///
/// The answer is conservative: a few cells just outside the region can be
/// included, but no overlapping cell is ever left out. The region is taken to
/// be in the tessellation's frame.
pub fn tiles_covering(order: u8, region: &SkyRegion) -> BTreeSet<HealpixCell> {
    let order = order.min(MAX_ORDER);
    let mut out = BTreeSet::new();

    if matches!(region, SkyRegion::AllSky) {
        out.extend((0..cell_count(order)).filter_map(|i| HealpixCell::new(order, i).ok()));
        return out;
    }

    let frame = region.frame().unwrap_or(Frame::Equatorial);
    let margin = region.margin_rad();
    let mut stack: Vec<HealpixCell> = (0..12u64)
        .rev()
        .filter_map(|i| HealpixCell::new(0, i).ok())
        .collect();

    while let Some(cell) = stack.pop() {
        let cap = cell.bounding_cap(frame);
        if !region.intersects_cap(&cap.inflated(margin)) {
            continue;
        }
        if cell.order() == order {
            out.insert(cell);
            continue;
        }
        if region.contains_cap(&cap)
            && let Some(range) = cell.descendant_range(order)
        {
            out.extend(range.filter_map(|i| HealpixCell::new(order, i).ok()));
            continue;
        }
        if let Some(children) = cell.children() {
            stack.extend(children.into_iter().rev());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::tiles_covering;
    use crate::cell::{HealpixCell, cell_at, cell_count};
    use crate::region::{SkyRegion, SphericalCap, SphericalPolygon};
    use foundation::math::SkyCoord;

    #[test]
    fn all_sky_is_every_cell() {
        for order in 0..=4 {
            let tiles = tiles_covering(order, &SkyRegion::AllSky);
            assert_eq!(tiles.len() as u64, cell_count(order));
        }
    }

    #[test]
    fn small_cap_contains_its_center_cell() {
        for (ra, dec) in [(0.0, 0.0), (83.6, 22.0), (266.4, -28.9), (10.0, 89.5), (200.0, -89.0)] {
            let center = SkyCoord::equatorial(ra, dec);
            let region = SkyRegion::Cap(SphericalCap::new(center, 0.5));
            let tiles = tiles_covering(6, &region);
            assert!(tiles.contains(&cell_at(6, &center).unwrap()), "({ra}, {dec})");
            assert!(tiles.len() < 40, "({ra}, {dec}) -> {}", tiles.len());
        }
    }

    #[test]
    fn covering_is_exhaustive_for_points_inside() {
        let center = SkyCoord::equatorial(120.0, 40.0);
        let region = SkyRegion::Cap(SphericalCap::new(center, 8.0));
        let tiles = tiles_covering(5, &region);
        for i in 0..40 {
            let angle = f64::from(i) * 9.0;
            for r in [1.0, 4.0, 7.9] {
                let sample = SkyCoord::equatorial(
                    120.0 + r * angle.to_radians().cos() / 40f64.to_radians().cos(),
                    40.0 + r * angle.to_radians().sin(),
                );
                if region.contains(&sample) {
                    assert!(tiles.contains(&cell_at(5, &sample).unwrap()));
                }
            }
        }
    }

    #[test]
    fn polygon_cover_matches_point_sampling() {
        let corners = [
            SkyCoord::equatorial(10.0, -10.0),
            SkyCoord::equatorial(30.0, -10.0),
            SkyCoord::equatorial(30.0, 10.0),
            SkyCoord::equatorial(10.0, 10.0),
        ];
        let poly = SphericalPolygon::new(&corners, SkyCoord::equatorial(20.0, 0.0)).unwrap();
        let region = SkyRegion::Polygon(poly);
        let tiles = tiles_covering(4, &region);
        for ra in 11..30 {
            for dec in -9..10 {
                let p = SkyCoord::equatorial(f64::from(ra), f64::from(dec));
                assert!(tiles.contains(&cell_at(4, &p).unwrap()), "({ra}, {dec})");
            }
        }
        let far = cell_at(4, &SkyCoord::equatorial(200.0, 0.0)).unwrap();
        assert!(!tiles.contains(&far));
    }

    #[test]
    fn coarser_cover_contains_parents() {
        let region = SkyRegion::Cap(SphericalCap::new(SkyCoord::equatorial(45.0, 45.0), 5.0));
        let fine = tiles_covering(5, &region);
        let coarse = tiles_covering(4, &region);
        for cell in &fine {
            let parent: HealpixCell = cell.parent().unwrap();
            assert!(coarse.contains(&parent), "{cell}");
        }
    }

    #[test]
    fn hemisphere_cap_covers_about_half() {
        let region = SkyRegion::Cap(SphericalCap::new(SkyCoord::equatorial(0.0, 90.0), 90.0));
        let tiles = tiles_covering(3, &region);
        let total = cell_count(3) as usize;
        assert!(tiles.len() >= total / 2);
        assert!(tiles.len() < total * 3 / 4);
    }
}
