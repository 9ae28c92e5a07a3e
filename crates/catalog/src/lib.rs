use std::collections::BTreeMap;
use std::str::FromStr;

use foundation::math::{Frame, deserialize_frame_name};
use healpix::{HealpixCell, SurveyId, TileError, TileId};
use serde::{Deserialize, Deserializer, Serialize};

/// Default HiPS directory layout, relative to a survey's root URL.
pub const HIPS_TEMPLATE: &str = "Norder{order}/Dir{dir}/Npix{index}.{format}";
/// Tile edge length (pixels) assumed when a survey does not say.
pub const DEFAULT_TILE_WIDTH: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The survey feed could not be parsed.
    Feed(String),
    UnknownSurvey(SurveyId),
    Tile(TileError),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Feed(msg) => write!(f, "survey feed error: {msg}"),
            CatalogError::UnknownSurvey(id) => write!(f, "unknown survey: {id}"),
            CatalogError::Tile(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<TileError> for CatalogError {
    fn from(err: TileError) -> Self {
        CatalogError::Tile(err)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Jpeg,
    Png,
    Fits,
}

impl TileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpg",
            TileFormat::Png => "png",
            TileFormat::Fits => "fits",
        }
    }

    /// First recognized entry of a space separated list such as `"jpeg png"`.
    pub fn from_list(list: &str) -> Option<Self> {
        list.split_whitespace().find_map(|name| name.parse().ok())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TileFormat::Jpeg),
            "png" => Ok(TileFormat::Png),
            "fits" => Ok(TileFormat::Fits),
            other => Err(format!("unknown tile format: {other:?}")),
        }
    }
}

impl<'de> Deserialize<'de> for TileFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TileFormat::from_list(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("no usable tile format in {raw:?}")))
    }
}

fn default_tile_width() -> u32 {
    DEFAULT_TILE_WIDTH
}

/// Metadata for one HiPS survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyDescriptor {
    pub id: SurveyId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "url", alias = "rootUrl")]
    pub root_url: String,
    #[serde(alias = "maxOrder")]
    pub max_order: u8,
    #[serde(default, alias = "minOrder")]
    pub min_order: u8,
    #[serde(default, deserialize_with = "deserialize_frame_name")]
    pub frame: Frame,
    #[serde(default)]
    pub format: TileFormat,
    #[serde(default = "default_tile_width", alias = "tileWidth")]
    pub tile_width: u32,
    /// Path template below `root_url`; `None` means [`HIPS_TEMPLATE`].
    #[serde(default, alias = "urlTemplate", skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
}

impl SurveyDescriptor {
    pub fn new(id: &str, name: &str, root_url: &str, max_order: u8) -> Self {
        Self {
            id: SurveyId::from(id),
            name: name.to_string(),
            root_url: root_url.to_string(),
            max_order,
            min_order: 0,
            frame: Frame::Equatorial,
            format: TileFormat::Jpeg,
            tile_width: DEFAULT_TILE_WIDTH,
            url_template: None,
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.url_template = Some(template.to_string());
        self
    }

    pub fn tile_id(&self, cell: HealpixCell) -> TileId {
        TileId::from_cell(self.id.clone(), cell)
    }

    /// Rejects cells deeper than the survey provides.
    pub fn validate_cell(&self, cell: &HealpixCell) -> Result<(), TileError> {
        if cell.order() > self.max_order {
            return Err(TileError::InvalidTileId {
                order: cell.order(),
                index: cell.index(),
            });
        }
        Ok(())
    }

    /// Absolute URL of one tile.
    ///
    /// Placeholders: `{order}`, `{dir}` (index rounded down to a multiple of
    /// 10000), `{index}`, `{format}` (file extension).
    pub fn tile_url(&self, cell: &HealpixCell) -> String {
        let template = self.url_template.as_deref().unwrap_or(HIPS_TEMPLATE);
        let dir = cell.index() / 10_000 * 10_000;
        let path = template
            .replace("{order}", &cell.order().to_string())
            .replace("{dir}", &dir.to_string())
            .replace("{index}", &cell.index().to_string())
            .replace("{format}", self.format.extension());
        format!("{}/{}", self.root_url.trim_end_matches('/'), path)
    }
}

/// Parses a JSON array of survey descriptors.
pub fn parse_feed(json: &str) -> Result<Vec<SurveyDescriptor>, CatalogError> {
    serde_json::from_str(json).map_err(|e| CatalogError::Feed(e.to_string()))
}

/// Outcome of [`SurveyRegistry::refresh`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: Vec<SurveyId>,
    pub removed: Vec<SurveyId>,
}

impl RefreshReport {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Registered {
    descriptor: SurveyDescriptor,
    // Registered by hand rather than by a feed; survives refreshes.
    pinned: bool,
}

/// The set of known surveys, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct SurveyRegistry {
    surveys: BTreeMap<SurveyId, Registered>,
}

impl SurveyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with a few well-known all-sky surveys.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for survey in default_surveys() {
            registry.register(survey);
        }
        registry
    }

    /// Adds or replaces a survey that later feed refreshes will not remove.
    pub fn register(&mut self, descriptor: SurveyDescriptor) -> Option<SurveyDescriptor> {
        self.surveys
            .insert(
                descriptor.id.clone(),
                Registered {
                    descriptor,
                    pinned: true,
                },
            )
            .map(|old| old.descriptor)
    }

    pub fn len(&self) -> usize {
        self.surveys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surveys.is_empty()
    }

    pub fn contains(&self, id: &SurveyId) -> bool {
        self.surveys.contains_key(id)
    }

    pub fn get(&self, id: &SurveyId) -> Option<&SurveyDescriptor> {
        self.surveys.get(id).map(|r| &r.descriptor)
    }

    pub fn require(&self, id: &SurveyId) -> Result<&SurveyDescriptor, CatalogError> {
        self.get(id)
            .ok_or_else(|| CatalogError::UnknownSurvey(id.clone()))
    }

    /// Surveys sorted by display name, then id.
    pub fn list(&self) -> Vec<&SurveyDescriptor> {
        let mut out: Vec<_> = self.surveys.values().map(|r| &r.descriptor).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Replaces the feed-provided surveys with `feed`.
    ///
    /// Pinned surveys are kept (a feed entry with the same id overrides the
    /// descriptor but not the pin). Later duplicates in `feed` win.
    pub fn refresh(&mut self, feed: Vec<SurveyDescriptor>) -> RefreshReport {
        let before: Vec<SurveyId> = self.surveys.keys().cloned().collect();

        let mut next: BTreeMap<SurveyId, Registered> = self
            .surveys
            .iter()
            .filter(|(_, r)| r.pinned)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        for descriptor in feed {
            let pinned = next.get(&descriptor.id).is_some_and(|r| r.pinned);
            next.insert(descriptor.id.clone(), Registered { descriptor, pinned });
        }

        let report = RefreshReport {
            added: next
                .keys()
                .filter(|id| !self.surveys.contains_key(*id))
                .cloned()
                .collect(),
            removed: before
                .into_iter()
                .filter(|id| !next.contains_key(id))
                .collect(),
        };
        self.surveys = next;
        report
    }

    pub fn refresh_from_json(&mut self, json: &str) -> Result<RefreshReport, CatalogError> {
        let feed = parse_feed(json)?;
        Ok(self.refresh(feed))
    }

    /// URL of `tile`, after checking its survey exists and provides its order.
    pub fn tile_url(&self, tile: &TileId) -> Result<String, CatalogError> {
        let survey = self.require(&tile.survey)?;
        survey.validate_cell(&tile.cell)?;
        Ok(survey.tile_url(&tile.cell))
    }
}

fn default_surveys() -> Vec<SurveyDescriptor> {
    vec![
        SurveyDescriptor::new(
            "P/DSS2/color",
            "DSS colored",
            "https://alasky.cds.unistra.fr/DSS/DSSColor",
            9,
        ),
        SurveyDescriptor::new(
            "P/2MASS/color",
            "2MASS colored",
            "https://alasky.cds.unistra.fr/2MASS/Color",
            9,
        ),
        SurveyDescriptor::new(
            "P/Mellinger/color",
            "Mellinger colored",
            "https://alasky.cds.unistra.fr/MellingerRGB",
            4,
        )
        .with_frame(Frame::Galactic),
        SurveyDescriptor::new(
            "P/Fermi/color",
            "Fermi color",
            "https://alasky.cds.unistra.fr/Fermi/Color",
            3,
        ),
    ]
}
