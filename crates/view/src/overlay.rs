//! Boundary to overlay layers (catalogs, footprints, markers).
//!
//! Layers draw themselves; the view only tells them what is on screen, in
//! the layer's own frame and at an order the layer can serve.

use foundation::math::Frame;
use healpix::SkyRegion;

/// Visible sky as seen by one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSky {
    /// Visible region in the layer's frame.
    pub region: SkyRegion,
    /// View order clamped to the layer's `max_order`.
    pub order: u8,
    pub fov_deg: f64,
    pub frame: Frame,
}

impl VisibleSky {
    /// Re-targets a view-frame snapshot at a layer.
    pub fn for_layer(region: &SkyRegion, order: u8, fov_deg: f64, layer: &dyn OverlayLayer) -> Self {
        let frame = layer.frame();
        Self {
            region: region.to_frame(frame),
            order: order.min(layer.max_order()),
            fov_deg,
            frame,
        }
    }
}

pub trait OverlayLayer {
    fn name(&self) -> &str;

    fn frame(&self) -> Frame {
        Frame::Equatorial
    }

    /// Deepest order the layer can index.
    fn max_order(&self) -> u8 {
        healpix::MAX_ORDER
    }

    fn on_visible(&mut self, sky: &VisibleSky);
}

#[cfg(test)]
mod tests {
    use super::{OverlayLayer, VisibleSky};
    use foundation::math::{Frame, SkyCoord};
    use healpix::{SkyRegion, SphericalCap};

    struct Shallow;

    impl OverlayLayer for Shallow {
        fn name(&self) -> &str {
            "shallow"
        }

        fn frame(&self) -> Frame {
            Frame::Galactic
        }

        fn max_order(&self) -> u8 {
            3
        }

        fn on_visible(&mut self, _sky: &VisibleSky) {}
    }

    #[test]
    fn snapshot_uses_layer_frame_and_order() {
        let region = SkyRegion::Cap(SphericalCap::new(SkyCoord::equatorial(266.4, -28.9), 2.0));
        let sky = VisibleSky::for_layer(&region, 7, 4.0, &Shallow);
        assert_eq!(sky.order, 3);
        assert_eq!(sky.frame, Frame::Galactic);
        assert_eq!(sky.region.frame(), Some(Frame::Galactic));
        // Galactic center sits inside the converted cap.
        assert!(sky.region.contains(&SkyCoord::galactic(0.0, 0.0)));

        let all = VisibleSky::for_layer(&SkyRegion::AllSky, 2, 360.0, &Shallow);
        assert_eq!(all.order, 2);
        assert_eq!(all.region, SkyRegion::AllSky);
    }
}
