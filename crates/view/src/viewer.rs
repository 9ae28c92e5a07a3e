//! `SkyView`: the camera, the active survey, and the per-frame tile pass.
//!
//! Everything is driven from the host's render loop. `frame(now)` advances
//! animations, resolves the visible tiles, requests missing ones from the
//! cache, and tells overlays what is on screen. Fetches run elsewhere (see
//! [`streaming::TileLoader`]) and come back through `on_fetch_complete`.

use catalog::{RefreshReport, SurveyDescriptor, SurveyRegistry};
use foundation::math::{Frame, ProjectionKind, SkyCoord, Vec2};
use foundation::time::Time;
use healpix::{SkyRegion, SurveyId, TileId};
use runtime::{Observers, SubscriptionId};
use serde::{Deserialize, Serialize};
use streaming::{
    CacheStats, Completion, CompletionOutcome, FetchError, TileCache, TileDecoder, TileLoader,
    TileLookup, TileSource,
};
use tracing::debug;

use crate::animator::{AnimationKind, CameraAnimator, OnComplete};
use crate::camera::{CameraState, FovRange};
use crate::config::ViewerConfig;
use crate::error::ViewError;
use crate::overlay::{OverlayLayer, VisibleSky};
use crate::resolver::ViewportResolver;

/// Tiles for one rendered frame, coarse fallbacks first.
#[derive(Debug, Clone)]
pub struct FrameTiles<P> {
    pub camera: CameraState,
    pub order: u8,
    pub region: SkyRegion,
    pub tiles: Vec<(TileId, TileLookup<P>)>,
}

impl<P> FrameTiles<P> {
    pub fn loaded(&self) -> impl Iterator<Item = (&TileId, &std::sync::Arc<P>)> {
        self.tiles
            .iter()
            .filter_map(|(tile, lookup)| lookup.payload().map(|payload| (tile, payload)))
    }

    /// Tiles still on their way.
    pub fn pending(&self) -> usize {
        self.tiles
            .iter()
            .filter(|(_, lookup)| matches!(lookup, TileLookup::Pending | TileLookup::Deferred))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.tiles
            .iter()
            .filter(|(tile, _)| tile.order() == self.order)
            .all(|(_, lookup)| lookup.is_loaded())
    }
}

/// A fetch result applied to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    Loaded { tile: TileId, evicted: Vec<TileId> },
    Failed { tile: TileId, error: FetchError, permanent: bool },
}

impl TileEvent {
    pub fn tile(&self) -> &TileId {
        match self {
            TileEvent::Loaded { tile, .. } | TileEvent::Failed { tile, .. } => tile,
        }
    }
}

/// FITS WCS header describing the current view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ViewWcs {
    pub naxis: u32,
    pub naxis1: u32,
    pub naxis2: u32,
    pub radecsys: String,
    pub crpix1: f64,
    pub crpix2: f64,
    pub crval1: f64,
    pub crval2: f64,
    pub ctype1: String,
    pub ctype2: String,
    #[serde(rename = "CD1_1")]
    pub cd1_1: f64,
    #[serde(rename = "CD1_2")]
    pub cd1_2: f64,
    #[serde(rename = "CD2_1")]
    pub cd2_1: f64,
    #[serde(rename = "CD2_2")]
    pub cd2_2: f64,
}

pub struct SkyView<P> {
    camera: CameraState,
    fov_range: FovRange,
    registry: SurveyRegistry,
    // Kept even if a refreshed feed drops it.
    survey: SurveyDescriptor,
    cache: TileCache<P>,
    resolver: ViewportResolver,
    animator: CameraAnimator,
    overlays: Vec<Box<dyn OverlayLayer>>,
    camera_observers: Observers<CameraState>,
    tile_observers: Observers<TileEvent>,
    last_order: Option<u8>,
    // Camera and order the overlays last saw.
    overlays_seen: Option<(CameraState, u8)>,
}

impl<P> std::fmt::Debug for SkyView<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkyView")
            .field("camera", &self.camera)
            .field("fov_range", &self.fov_range)
            .field("survey", &self.survey.id)
            .field("cache", &self.cache.stats())
            .field("overlays", &self.overlays.len())
            .finish()
    }
}

impl<P> SkyView<P> {
    pub fn new(config: ViewerConfig, registry: SurveyRegistry) -> Result<Self, ViewError> {
        let center = config.initial_center()?;
        let survey = registry.require(&SurveyId::new(&config.survey))?.clone();
        let fov_range = FovRange::new(config.fov_range.min, config.fov_range.max);
        let camera = CameraState::new(
            center,
            fov_range.clamp(config.fov_deg),
            config.projection,
            config.screen_width,
            config.screen_height,
        );
        debug!(
            survey = %survey.id,
            lon = center.lon(),
            lat = center.lat(),
            fov = camera.fov_deg,
            "sky view created"
        );
        Ok(Self {
            camera,
            fov_range,
            registry,
            survey,
            cache: TileCache::new(config.cache),
            resolver: ViewportResolver::new(config.resolver),
            animator: CameraAnimator::new(config.animation),
            overlays: Vec::new(),
            camera_observers: Observers::new(),
            tile_observers: Observers::new(),
            last_order: None,
            overlays_seen: None,
        })
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn cache(&self) -> &TileCache<P> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn registry(&self) -> &SurveyRegistry {
        &self.registry
    }

    pub fn survey(&self) -> &SurveyDescriptor {
        &self.survey
    }

    pub fn fov_range(&self) -> FovRange {
        self.fov_range
    }

    pub fn is_animating(&self) -> bool {
        self.animator.is_running()
    }

    fn replace_camera(&mut self, next: CameraState) {
        if next == self.camera {
            return;
        }
        self.camera = next;
        self.camera_observers.notify(&self.camera);
    }

    /// View center in the current frame.
    pub fn get_center(&self) -> SkyCoord {
        self.camera.center
    }

    /// View center as equatorial `[ra, dec]`.
    pub fn get_ra_dec(&self) -> [f64; 2] {
        let c = self.camera.center.to_frame(Frame::Equatorial);
        [c.lon(), c.lat()]
    }

    pub fn get_fov_degrees(&self) -> f64 {
        self.camera.fov_deg
    }

    /// `[horizontal, vertical]` field of view, each at most 180°.
    pub fn get_fov(&self) -> [f64; 2] {
        self.camera.fov_xy()
    }

    /// Centers the view on `coord` (any frame). Cancels a running pan.
    pub fn point_to(&mut self, coord: SkyCoord) {
        self.animator.cancel(AnimationKind::Pan);
        let next = CameraState {
            center: coord.to_frame(self.camera.frame),
            ..self.camera
        };
        self.replace_camera(next);
    }

    pub fn point_to_ra_dec(&mut self, ra: f64, dec: f64) {
        self.point_to(SkyCoord::equatorial(ra, dec));
    }

    /// Centers the view on `(lon, lat)` read in the current frame.
    pub fn goto_position(&mut self, lon: f64, lat: f64) {
        self.point_to(SkyCoord::new(lon, lat, self.camera.frame));
    }

    /// Sets the field of view, clamped to the allowed range. Cancels a running zoom.
    pub fn set_fov(&mut self, fov_deg: f64) {
        self.animator.cancel(AnimationKind::Zoom);
        self.apply_fov(fov_deg);
    }

    fn apply_fov(&mut self, fov_deg: f64) {
        let next = CameraState {
            fov_deg: self.fov_range.clamp(fov_deg),
            ..self.camera
        };
        self.replace_camera(next);
    }

    /// Bounds given in the wrong order are swapped; the current field of
    /// view is pulled into the new range.
    pub fn set_fov_range(&mut self, min_deg: f64, max_deg: f64) {
        self.fov_range = FovRange::new(min_deg, max_deg);
        self.apply_fov(self.camera.fov_deg);
    }

    /// Pans along a great circle to `(ra, dec)` over `duration_ms`.
    pub fn animate_to(
        &mut self,
        ra: f64,
        dec: f64,
        duration_ms: f64,
        now: Time,
        on_complete: Option<OnComplete>,
    ) {
        let target = SkyCoord::equatorial(ra, dec);
        self.animator
            .pan(self.camera.center, target, duration_ms, now, on_complete);
    }

    /// Eases the field of view to `fov_deg` (clamped to the allowed range).
    pub fn animate_fov(
        &mut self,
        fov_deg: f64,
        duration_ms: f64,
        now: Time,
        on_complete: Option<OnComplete>,
    ) {
        let target = self.fov_range.clamp(fov_deg);
        self.animator
            .zoom(self.camera.fov_deg, target, duration_ms, now, on_complete);
    }

    /// Stops all animations where they are. Completion callbacks do not run.
    pub fn stop_animation(&mut self) {
        self.animator.stop();
    }

    pub fn project(&self, coord: &SkyCoord) -> Option<Vec2> {
        self.camera.projection().project(coord)
    }

    pub fn unproject(&self, p: Vec2) -> Option<SkyCoord> {
        self.camera.projection().unproject(p)
    }

    /// Screen pixel (origin top-left) of a sky position, if it is on the
    /// visible side of the projection.
    pub fn world_to_pixel(&self, coord: &SkyCoord) -> Option<(f64, f64)> {
        self.camera.world_to_pixel(coord)
    }

    pub fn pixel_to_world(&self, x: f64, y: f64) -> Option<SkyCoord> {
        self.camera.pixel_to_world(x, y)
    }

    /// Equatorial positions along the screen border, `steps` per side,
    /// clockwise from the top-left pixel. Off-sky pixels give `None`.
    pub fn fov_corners(&self, steps: usize) -> Vec<Option<SkyCoord>> {
        let steps = steps.max(1);
        let w = f64::from(self.camera.screen_width - 1);
        let h = f64::from(self.camera.screen_height - 1);
        let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        let mut points = Vec::with_capacity(4 * steps);
        for side in 0..4 {
            let (x1, y1) = corners[side];
            let (x2, y2) = corners[(side + 1) % 4];
            for step in 0..steps {
                let f = step as f64 / steps as f64;
                let coord = self.pixel_to_world(x1 + f * (x2 - x1), y1 + f * (y2 - y1));
                points.push(coord.map(|c| c.to_frame(Frame::Equatorial)));
            }
        }
        points
    }

    pub fn view_wcs(&self) -> ViewWcs {
        let [ra, dec] = self.get_ra_dec();
        let [fov_x, fov_y] = self.get_fov();
        let label = self.camera.projection.label();
        let width = self.camera.screen_width;
        let height = self.camera.screen_height;
        ViewWcs {
            naxis: 2,
            naxis1: width,
            naxis2: height,
            radecsys: "ICRS".to_string(),
            crpix1: f64::from(width) / 2.0,
            crpix2: f64::from(height) / 2.0,
            crval1: ra,
            crval2: dec,
            ctype1: format!("RA---{label}"),
            ctype2: format!("DEC--{label}"),
            cd1_1: fov_x / f64::from(width),
            cd1_2: 0.0,
            cd2_1: 0.0,
            cd2_2: fov_y / f64::from(height),
        }
    }

    pub fn set_frame(&mut self, frame: Frame) {
        if frame == self.camera.frame {
            return;
        }
        debug!(%frame, "view frame changed");
        self.replace_camera(self.camera.in_frame(frame));
    }

    /// Changes the projection. Cached tiles stay valid.
    pub fn set_projection(&mut self, projection: ProjectionKind) {
        let next = CameraState {
            projection,
            ..self.camera
        };
        self.replace_camera(next);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let next = CameraState {
            screen_width: width.max(1),
            screen_height: height.max(1),
            ..self.camera
        };
        self.replace_camera(next);
    }

    /// Switches the base survey to a registered one.
    pub fn set_base_survey(&mut self, id: &str) -> Result<(), ViewError> {
        let descriptor = self.registry.require(&SurveyId::new(id))?.clone();
        if descriptor == self.survey {
            return Ok(());
        }
        let dropped = self.cache.invalidate(&self.survey.id);
        debug!(from = %self.survey.id, to = %descriptor.id, dropped, "switching base survey");
        self.survey = descriptor;
        self.last_order = None;
        self.overlays_seen = None;
        Ok(())
    }

    /// Replaces the registry contents with a feed.
    ///
    /// The active survey stays usable: if the feed drops it, its descriptor
    /// is registered again; if the feed changes it, the new descriptor is
    /// adopted and its cached tiles are dropped.
    pub fn refresh_surveys(&mut self, feed: Vec<SurveyDescriptor>) -> RefreshReport {
        let report = self.registry.refresh(feed);
        match self.registry.get(&self.survey.id) {
            None => {
                debug!(survey = %self.survey.id, "active survey missing from feed; keeping it");
                self.registry.register(self.survey.clone());
            }
            Some(updated) if *updated != self.survey => {
                let updated = updated.clone();
                let dropped = self.cache.invalidate(&updated.id);
                debug!(survey = %updated.id, dropped, "active survey changed upstream");
                self.survey = updated;
                self.last_order = None;
            }
            Some(_) => {}
        }
        report
    }

    pub fn refresh_surveys_from_json(&mut self, json: &str) -> Result<RefreshReport, ViewError> {
        let feed = catalog::parse_feed(json)?;
        Ok(self.refresh_surveys(feed))
    }

    pub fn add_overlay(&mut self, layer: Box<dyn OverlayLayer>) {
        debug!(layer = layer.name(), "overlay added");
        self.overlays.push(layer);
        self.overlays_seen = None;
    }

    pub fn overlay_names(&self) -> Vec<&str> {
        self.overlays.iter().map(|layer| layer.name()).collect()
    }

    /// Called with the new camera after every change.
    pub fn on_camera_changed(&mut self, callback: impl FnMut(&CameraState) + 'static) -> SubscriptionId {
        self.camera_observers.subscribe(callback)
    }

    /// Called when a fetch result lands in the cache.
    pub fn on_tile_resolved(&mut self, callback: impl FnMut(&TileEvent) + 'static) -> SubscriptionId {
        self.tile_observers.subscribe(callback)
    }

    pub fn unsubscribe_camera(&mut self, id: SubscriptionId) -> bool {
        self.camera_observers.unsubscribe(id)
    }

    pub fn unsubscribe_tiles(&mut self, id: SubscriptionId) -> bool {
        self.tile_observers.unsubscribe(id)
    }

    /// One render-loop step at `now`.
    pub fn frame(&mut self, now: Time) -> FrameTiles<P> {
        let mut update = self.animator.tick(now);
        if update.center.is_some() || update.fov_deg.is_some() {
            let mut next = self.camera;
            if let Some(center) = update.center {
                next.center = center.to_frame(next.frame);
            }
            if let Some(fov) = update.fov_deg {
                next.fov_deg = self.fov_range.clamp(fov);
            }
            self.replace_camera(next);
        }

        let resolved = self.resolver.resolve(&self.camera, &self.survey, &self.cache);
        if self.last_order != Some(resolved.order) {
            debug!(
                survey = %self.survey.id,
                from = ?self.last_order,
                to = resolved.order,
                fov = self.camera.fov_deg,
                "tile order changed"
            );
            self.last_order = Some(resolved.order);
        }

        let tiles = resolved
            .tiles()
            .map(|tile| (tile.clone(), self.cache.get(tile, now)))
            .collect();

        if self.overlays_seen != Some((self.camera, resolved.order)) {
            for layer in &mut self.overlays {
                let sky = VisibleSky::for_layer(
                    &resolved.region,
                    resolved.order,
                    self.camera.fov_deg,
                    &**layer,
                );
                layer.on_visible(&sky);
            }
            self.overlays_seen = Some((self.camera, resolved.order));
        }

        update.run_callbacks();

        FrameTiles {
            camera: self.camera,
            order: resolved.order,
            region: resolved.region,
            tiles,
        }
    }

    /// Starts queued fetches on `loader`.
    pub fn dispatch<S: TileSource, D>(&mut self, loader: &mut TileLoader<S, D>) -> usize {
        loader.dispatch(&mut self.cache, &self.registry)
    }

    /// Applies one finished fetch and notifies tile observers.
    pub fn on_fetch_complete(&mut self, completion: Completion<P>, now: Time) -> CompletionOutcome {
        let Completion { ticket, result } = completion;
        let error = result.as_ref().err().cloned();
        let outcome = self.cache.complete(&ticket, result, now);
        let event = match (&outcome, error) {
            (CompletionOutcome::Loaded { evicted }, _) => Some(TileEvent::Loaded {
                tile: ticket.tile,
                evicted: evicted.clone(),
            }),
            (CompletionOutcome::Failed { permanent }, Some(error)) => Some(TileEvent::Failed {
                tile: ticket.tile,
                error,
                permanent: *permanent,
            }),
            _ => None,
        };
        if let Some(event) = event {
            self.tile_observers.notify(&event);
        }
        outcome
    }

    /// Applies every completion `loader` has ready without waiting.
    pub fn drain_completions<S, D>(&mut self, loader: &mut TileLoader<S, D>, now: Time) -> usize
    where
        S: TileSource,
        D: TileDecoder<P>,
    {
        let ready = loader.poll_ready();
        let count = ready.len();
        for completion in ready {
            self.on_fetch_complete(completion, now);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::{SkyView, TileEvent};
    use crate::config::ViewerConfig;
    use crate::overlay::{OverlayLayer, VisibleSky};
    use catalog::{SurveyDescriptor, SurveyRegistry};
    use foundation::math::{Frame, ProjectionKind, SkyCoord};
    use foundation::time::Time;
    use futures_util::future::{FutureExt, LocalBoxFuture};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use streaming::{CompletionOutcome, FetchError, RawBytes, TileLoader, TileLookup, TileSource};

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "expected {a} ≈ {b} (eps={eps})");
    }

    struct UrlEcho;

    impl TileSource for UrlEcho {
        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
            let body = url.as_bytes().to_vec();
            async move { Ok(body) }.boxed_local()
        }
    }

    fn view() -> SkyView<Vec<u8>> {
        let config = ViewerConfig {
            target: "83.63 +22.01".to_string(),
            fov_deg: 30.0,
            ..ViewerConfig::default()
        };
        SkyView::new(config, SurveyRegistry::with_defaults()).unwrap()
    }

    #[test]
    fn camera_queries() {
        let mut v = view();
        assert_eq!(v.get_center(), SkyCoord::equatorial(83.63, 22.01));
        assert_eq!(v.get_fov_degrees(), 30.0);
        assert_eq!(v.get_fov(), [30.0, 22.5]);

        v.set_frame(Frame::Galactic);
        assert_eq!(v.get_center().frame(), Frame::Galactic);
        let [ra, dec] = v.get_ra_dec();
        assert_close(ra, 83.63, 1e-6);
        assert_close(dec, 22.01, 1e-6);
    }

    #[test]
    fn fov_is_kept_in_range() {
        let mut v = view();
        v.set_fov(1e-6);
        assert_eq!(v.get_fov_degrees(), 1.0 / 3600.0);
        v.set_fov_range(50.0, 2.0);
        assert_eq!(v.fov_range().min, 2.0);
        assert_eq!(v.get_fov_degrees(), 2.0);
        v.set_fov(90.0);
        assert_eq!(v.get_fov_degrees(), 50.0);
    }

    #[test]
    fn goto_reads_the_current_frame() {
        let mut v = view();
        v.set_frame(Frame::Galactic);
        v.goto_position(0.0, 0.0);
        let [ra, dec] = v.get_ra_dec();
        assert_close(ra, 266.405, 1e-2);
        assert_close(dec, -28.936, 1e-2);

        v.point_to_ra_dec(10.0, 41.0);
        assert_eq!(v.get_center().frame(), Frame::Galactic);
        let [ra, _] = v.get_ra_dec();
        assert_close(ra, 10.0, 1e-6);
    }

    #[test]
    fn camera_observers_see_every_change() {
        let mut v = view();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = v.on_camera_changed(move |cam| sink.borrow_mut().push(cam.fov_deg));
        v.set_fov(10.0);
        v.set_fov(10.0);
        v.set_projection(ProjectionKind::Aitoff);
        assert_eq!(*seen.borrow(), vec![10.0, 10.0]);
        assert!(v.unsubscribe_camera(id));
        v.set_fov(12.0);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn animations_drive_the_camera() {
        let mut v = view();
        v.point_to_ra_dec(0.0, 0.0);
        let done = Rc::new(Cell::new(0));
        let counter = done.clone();
        v.animate_to(10.0, 0.0, 1000.0, Time(0.0), Some(Box::new(move || counter.set(counter.get() + 1))));
        v.animate_fov(5.0, 1000.0, Time(0.0), None);
        assert!(v.is_animating());

        v.frame(Time(0.0));
        v.frame(Time(500.0));
        assert_close(v.get_ra_dec()[0], 5.0, 1e-9);
        assert!(v.get_fov_degrees() < 30.0 && v.get_fov_degrees() > 5.0);
        assert_eq!(done.get(), 0);

        let last = v.frame(Time(1000.0));
        assert_eq!(last.camera.center, SkyCoord::equatorial(10.0, 0.0));
        assert_eq!(v.get_fov_degrees(), 5.0);
        assert_eq!(done.get(), 1);
        v.frame(Time(1100.0));
        assert_eq!(done.get(), 1);
        assert!(!v.is_animating());
    }

    #[test]
    fn stop_animation_freezes_the_view() {
        let mut v = view();
        v.animate_fov(5.0, 1000.0, Time(0.0), None);
        v.frame(Time(0.0));
        v.frame(Time(250.0));
        let fov = v.get_fov_degrees();
        v.stop_animation();
        v.frame(Time(2000.0));
        assert_eq!(v.get_fov_degrees(), fov);
    }

    #[tokio::test]
    async fn frames_request_then_show_tiles() {
        let mut v = view();
        let resolved = Rc::new(Cell::new(0));
        let count = resolved.clone();
        v.on_tile_resolved(move |event| {
            if matches!(event, TileEvent::Loaded { .. }) {
                count.set(count.get() + 1);
            }
        });

        let first = v.frame(Time(0.0));
        assert!(!first.tiles.is_empty());
        assert!(first.tiles.iter().all(|(_, l)| matches!(l, TileLookup::Pending)));
        assert!(first.tiles.iter().all(|(t, _)| t.order() == first.order));

        let mut loader = TileLoader::for_cache(UrlEcho, RawBytes, v.cache());
        while v.cache().queued_len() > 0 || !loader.is_idle() {
            v.dispatch(&mut loader);
            let Some(completion) = loader.next_completion::<Vec<u8>>().await else {
                continue;
            };
            let outcome = v.on_fetch_complete(completion, Time(10.0));
            assert!(matches!(outcome, CompletionOutcome::Loaded { .. }));
        }
        assert_eq!(resolved.get(), first.tiles.len());

        let second = v.frame(Time(20.0));
        assert!(second.is_complete());
        assert_eq!(second.pending(), 0);
        let (tile, payload) = second.loaded().next().unwrap();
        let url = String::from_utf8(payload.to_vec()).unwrap();
        assert!(url.ends_with(&format!("Npix{}.jpg", tile.index())));
    }

    #[tokio::test]
    async fn zooming_in_shows_resident_fallbacks() {
        let mut v = view();
        let coarse = v.frame(Time(0.0));
        let mut loader = TileLoader::for_cache(UrlEcho, RawBytes, v.cache());
        v.dispatch(&mut loader);
        while let Some(completion) = loader.next_completion::<Vec<u8>>().await {
            v.on_fetch_complete(completion, Time(1.0));
            v.dispatch(&mut loader);
        }

        v.set_fov(0.5);
        let fine = v.frame(Time(2.0));
        assert!(fine.order > coarse.order);
        let fallbacks: Vec<_> = fine.tiles.iter().filter(|(t, _)| t.order() < fine.order).collect();
        assert!(!fallbacks.is_empty());
        assert!(fallbacks.iter().all(|(t, l)| l.is_loaded() && t.order() == coarse.order));
        assert!(fine.tiles[0].1.is_loaded());
    }

    #[test]
    fn switching_surveys() {
        let mut v = view();
        assert!(v.set_base_survey("P/Nope").is_err());
        v.set_base_survey("P/Mellinger/color").unwrap();
        let tiles = v.frame(Time(0.0));
        assert!(tiles.tiles.iter().all(|(t, _)| t.survey.as_str() == "P/Mellinger/color"));
        assert!(tiles.order <= 4);
    }

    struct Recording(Rc<RefCell<Vec<String>>>);

    impl TileSource for Recording {
        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
            self.0.borrow_mut().push(url.to_string());
            futures_util::future::pending().boxed_local()
        }
    }

    #[test]
    fn switching_surveys_drops_the_old_requests() {
        let mut v = view();
        let urls = Rc::new(RefCell::new(Vec::new()));
        let mut loader = TileLoader::for_cache(Recording(urls.clone()), RawBytes, v.cache());

        v.frame(Time(0.0));
        assert!(v.dispatch(&mut loader) > 0);
        assert!(v.cache().queued_len() > 0);
        let in_flight = loader.in_flight();
        assert!(in_flight > 0);

        v.set_base_survey("P/Mellinger/color").unwrap();
        assert_eq!(v.cache().queued_len(), 0);
        assert_eq!(v.cache().len(), 0);

        urls.borrow_mut().clear();
        v.frame(Time(1.0));
        let sent = v.dispatch(&mut loader);
        let urls = urls.borrow();
        assert!(sent > 0);
        assert_eq!(urls.len(), sent);
        assert!(urls.iter().all(|url| url.contains("Mellinger")), "{urls:?}");
        // The old fetches were aborted, so only the new ones remain.
        assert_eq!(loader.in_flight(), sent);
    }

    #[test]
    fn refresh_keeps_the_active_survey() {
        let mut v = view();
        let report = v.refresh_surveys(vec![SurveyDescriptor::new(
            "P/Other",
            "Other",
            "https://example.org/other",
            5,
        )]);
        assert!(report.added.iter().any(|id| id.as_str() == "P/Other"));
        assert_eq!(v.survey().id.as_str(), "P/DSS2/color");
        assert!(v.registry().contains(&v.survey().id));

        v.frame(Time(0.0));
        assert!(v.cache().len() > 0);
        let moved = SurveyDescriptor::new("P/DSS2/color", "DSS moved", "https://mirror.example.org/dss", 9);
        v.refresh_surveys(vec![moved.clone()]);
        assert_eq!(v.survey(), &moved);
        assert_eq!(v.cache().len(), 0);
    }

    #[test]
    fn projection_switch_keeps_cached_tiles() {
        let mut v = view();
        v.frame(Time(0.0));
        let before = v.cache().len();
        v.set_projection(ProjectionKind::Aitoff);
        assert_eq!(v.cache().len(), before);
        let wide = {
            v.set_fov(200.0);
            v.frame(Time(1.0))
        };
        assert_eq!(wide.region, healpix::SkyRegion::AllSky);
    }

    #[test]
    fn wcs_matches_the_view() {
        let v = view();
        let wcs = v.view_wcs();
        assert_eq!(wcs.ctype1, "RA---SIN");
        assert_eq!(wcs.naxis1, 800);
        assert_eq!(wcs.crpix2, 300.0);
        assert_close(wcs.crval1, 83.63, 1e-9);
        assert_close(wcs.cd1_1, 30.0 / 800.0, 1e-12);
        assert_close(wcs.cd2_2, 22.5 / 600.0, 1e-12);
        let json = serde_json::to_value(&wcs).unwrap();
        assert_eq!(json["CTYPE2"], "DEC--SIN");
        assert_eq!(json["CD1_1"], 30.0 / 800.0);
        assert_eq!(json["RADECSYS"], "ICRS");
    }

    #[test]
    fn fov_corners_walk_the_border() {
        let v = view();
        let corners = v.fov_corners(3);
        assert_eq!(corners.len(), 12);
        let top_left = v.pixel_to_world(0.0, 0.0).unwrap();
        assert_eq!(corners[0], Some(top_left));
        let bottom_right = v.pixel_to_world(799.0, 599.0).unwrap();
        assert_eq!(corners[6], Some(bottom_right));
        assert_eq!(v.fov_corners(0).len(), 4);
    }

    #[test]
    fn pixels_and_plane_round_trip() {
        let v = view();
        let coord = SkyCoord::equatorial(85.0, 20.0);
        let (x, y) = v.world_to_pixel(&coord).unwrap();
        let back = v.pixel_to_world(x, y).unwrap();
        assert_close(back.angular_distance(&coord), 0.0, 1e-9);
        let p = v.project(&coord).unwrap();
        let again = v.unproject(p).unwrap();
        assert_close(again.angular_distance(&coord), 0.0, 1e-9);
        assert!(v.project(&SkyCoord::equatorial(263.63, -22.01)).is_none());
    }

    struct Recorder {
        seen: Rc<RefCell<Vec<VisibleSky>>>,
    }

    impl OverlayLayer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn frame(&self) -> Frame {
            Frame::Galactic
        }

        fn max_order(&self) -> u8 {
            0
        }

        fn on_visible(&mut self, sky: &VisibleSky) {
            self.seen.borrow_mut().push(sky.clone());
        }
    }

    #[test]
    fn overlays_hear_about_changes_only() {
        let mut v = view();
        let seen = Rc::new(RefCell::new(Vec::new()));
        v.add_overlay(Box::new(Recorder { seen: seen.clone() }));
        assert_eq!(v.overlay_names(), vec!["recorder"]);

        v.frame(Time(0.0));
        v.frame(Time(1.0));
        assert_eq!(seen.borrow().len(), 1);
        v.point_to_ra_dec(100.0, 10.0);
        v.frame(Time(2.0));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].frame, Frame::Galactic);
        assert_eq!(seen[1].order, 0);
        assert_eq!(seen[1].region.frame(), Some(Frame::Galactic));
    }
}
