use foundation::math::{Frame, ProjectionKind, SkyCoord, deserialize_frame_name};
use serde::{Deserialize, Deserializer, Serialize};
use streaming::CacheConfig;

use crate::animator::AnimationConfig;
use crate::camera::FovRange;
use crate::error::ViewError;
use crate::resolver::ResolverConfig;

/// Start-up settings for a [`crate::SkyView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Initial center, decimal or sexagesimal, read in `frame`.
    pub target: String,
    #[serde(deserialize_with = "deserialize_frame_name")]
    pub frame: Frame,
    /// Base survey id.
    pub survey: String,
    pub fov_deg: f64,
    #[serde(deserialize_with = "deserialize_projection_name")]
    pub projection: ProjectionKind,
    pub fov_range: FovRange,
    pub screen_width: u32,
    pub screen_height: u32,
    pub cache: CacheConfig,
    pub animation: AnimationConfig,
    pub resolver: ResolverConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            target: "0 +0".to_string(),
            frame: Frame::Equatorial,
            survey: "P/DSS2/color".to_string(),
            fov_deg: 60.0,
            projection: ProjectionKind::Sin,
            fov_range: FovRange::default(),
            screen_width: 800,
            screen_height: 600,
            cache: CacheConfig::default(),
            animation: AnimationConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self, ViewError> {
        serde_json::from_str(json).map_err(|err| ViewError::Config(err.to_string()))
    }

    pub fn initial_center(&self) -> Result<SkyCoord, ViewError> {
        Ok(SkyCoord::parse(&self.target, self.frame)?)
    }
}

// Unknown names fall back to SIN rather than failing the whole config.
fn deserialize_projection_name<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ProjectionKind, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(ProjectionKind::parse_or_default(&raw))
}

#[cfg(test)]
mod tests {
    use super::ViewerConfig;
    use crate::error::ViewError;
    use foundation::math::{Frame, ProjectionKind};

    #[test]
    fn defaults_point_at_origin() {
        let cfg = ViewerConfig::default();
        let center = cfg.initial_center().unwrap();
        assert_eq!(center.lon(), 0.0);
        assert_eq!(center.lat(), 0.0);
        assert_eq!(cfg.survey, "P/DSS2/color");
        assert_eq!(cfg.animation.cadence_ms, 50.0);
    }

    #[test]
    fn json_names_are_lenient() {
        let cfg = ViewerConfig::from_json(
            r#"{
                "target": "05 34 31.9 +22 00 52",
                "frame": "J2000",
                "projection": "AITOFF",
                "fov_deg": 3.5,
                "fov_range": {"min": 1.0},
                "cache": {"max_tiles": 64}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.frame, Frame::Equatorial);
        assert_eq!(cfg.projection, ProjectionKind::Aitoff);
        assert_eq!(cfg.fov_range.min, 1.0);
        assert_eq!(cfg.fov_range.max, 360.0);
        assert_eq!(cfg.cache.max_tiles, 64);
        assert_eq!(cfg.screen_width, 800);
        let center = cfg.initial_center().unwrap();
        assert!((center.lon() - 83.6329).abs() < 1e-3);

        let odd = ViewerConfig::from_json(r#"{"projection": "mercator", "frame": "gal"}"#).unwrap();
        assert_eq!(odd.projection, ProjectionKind::Sin);
        assert_eq!(odd.frame, Frame::Galactic);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(matches!(
            ViewerConfig::from_json(r#"{"frame": "ecliptic"}"#),
            Err(ViewError::Config(_))
        ));
        let cfg = ViewerConfig {
            target: "M1".to_string(),
            ..ViewerConfig::default()
        };
        assert!(matches!(cfg.initial_center(), Err(ViewError::Coord(_))));
    }
}
