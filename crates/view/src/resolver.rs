//! Viewport → tile set.
//!
//! Given a camera and a survey, work out which region of sky is on screen,
//! the order whose texels are no larger than a screen pixel, and the tiles
//! of that order covering the region. Tiles of coarser orders that are
//! already resident are listed first so a compositor can paint something
//! while the target tiles stream in.

use std::collections::BTreeSet;

use catalog::SurveyDescriptor;
use foundation::math::{ProjectionKind, SkyCoord};
use healpix::{
    HealpixCell, MAX_ORDER, SkyRegion, SphericalCap, SphericalPolygon, TileId, angular_size_deg,
    clamp_order, tiles_covering,
};
use serde::{Deserialize, Serialize};
use streaming::Residency;

use crate::camera::CameraState;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Border samples per screen side.
    pub edge_samples: usize,
    /// Border samples per side once the field of view exceeds `wide_fov_deg`.
    pub wide_edge_samples: usize,
    pub wide_fov_deg: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            edge_samples: 8,
            wide_edge_samples: 24,
            wide_fov_deg: 60.0,
        }
    }
}

/// Output of [`ViewportResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTiles {
    pub order: u8,
    /// Visible region, in the camera frame.
    pub region: SkyRegion,
    /// Resident ancestors of the target tiles, coarsest first.
    pub fallbacks: Vec<TileId>,
    /// Target-order tiles, nearest to the view center first.
    pub targets: Vec<TileId>,
}

impl ResolvedTiles {
    /// Fallbacks then targets: the order in which to request and paint.
    pub fn tiles(&self) -> impl Iterator<Item = &TileId> {
        self.fallbacks.iter().chain(self.targets.iter())
    }

    pub fn len(&self) -> usize {
        self.fallbacks.len() + self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.fallbacks.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ViewportResolver {
    config: ResolverConfig,
}

impl ViewportResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Sky region on screen, in the camera frame.
    pub fn visible_region(&self, camera: &CameraState) -> SkyRegion {
        let kind = camera.projection;
        if camera.fov_deg >= 180.0 {
            return match kind {
                ProjectionKind::Sin => {
                    SkyRegion::Cap(SphericalCap::new(camera.center, 90.0))
                }
                ProjectionKind::Aitoff => SkyRegion::AllSky,
            };
        }

        let per_side = if camera.fov_deg > self.config.wide_fov_deg {
            self.config.wide_edge_samples
        } else {
            self.config.edge_samples
        }
        .max(1);

        let projection = camera.projection();
        let w = f64::from(camera.screen_width);
        let h = f64::from(camera.screen_height);
        let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        let mut clamped = false;
        let mut border: Vec<SkyCoord> = Vec::with_capacity(per_side * 4);
        for side in 0..4 {
            let (x1, y1) = corners[side];
            let (x2, y2) = corners[(side + 1) % 4];
            for step in 0..per_side {
                let f = step as f64 / per_side as f64;
                let mut p = camera.pixel_to_plane(x1 + f * (x2 - x1), y1 + f * (y2 - y1));
                if !kind.contains(p) {
                    p = kind.clamp_to_domain(p);
                    clamped = true;
                }
                if let Some(coord) = projection.unproject(p) {
                    border.push(coord);
                }
            }
        }

        // The Aitoff boundary folds onto the antimeridian, which a polygon
        // cannot describe.
        if clamped && kind == ProjectionKind::Aitoff {
            return SkyRegion::AllSky;
        }
        match SphericalPolygon::new(&border, camera.center) {
            Some(polygon) => SkyRegion::Polygon(polygon),
            None => SkyRegion::AllSky,
        }
    }

    /// Smallest order whose texels are no larger than one screen pixel.
    ///
    /// The field of view is capped at 180° before measuring pixels, so every
    /// wider view resolves to the same order.
    pub fn target_order(&self, camera: &CameraState, survey: &SurveyDescriptor) -> u8 {
        let pixel = camera.pixel_angle_deg();
        let tile_width = f64::from(survey.tile_width.max(1));
        let order = (0..=MAX_ORDER)
            .find(|&order| angular_size_deg(order) / tile_width <= pixel)
            .unwrap_or(MAX_ORDER);
        clamp_order(i32::from(order), survey.min_order, survey.max_order)
    }

    pub fn resolve(
        &self,
        camera: &CameraState,
        survey: &SurveyDescriptor,
        residency: &impl Residency,
    ) -> ResolvedTiles {
        let region = self.visible_region(camera);
        let order = self.target_order(camera, survey);
        let survey_region = region.to_frame(survey.frame);
        let cells = tiles_covering(order, &survey_region);

        let center = camera.center.to_frame(survey.frame).to_unit_vector();
        let mut targets: Vec<(f64, HealpixCell)> = cells
            .iter()
            .map(|cell| (center.angle_to(cell.center()), *cell))
            .collect();
        targets.sort_by(|(da, ca), (db, cb)| da.total_cmp(db).then_with(|| ca.cmp(cb)));

        let min_order = survey.min_order.min(order);
        let mut ancestors: BTreeSet<HealpixCell> = BTreeSet::new();
        for cell in &cells {
            for ancestor_order in min_order..order {
                if let Some(ancestor) = cell.ancestor_at(ancestor_order) {
                    ancestors.insert(ancestor);
                }
            }
        }
        // BTreeSet order is (order, index): coarse first.
        let fallbacks = ancestors
            .into_iter()
            .map(|cell| survey.tile_id(cell))
            .filter(|tile| residency.is_loaded(tile))
            .collect();

        ResolvedTiles {
            order,
            region,
            fallbacks,
            targets: targets
                .into_iter()
                .map(|(_, cell)| survey.tile_id(cell))
                .collect(),
        }
    }
}
