use std::sync::Arc;

use foundation::math::{Frame, SkyCoord, Vec3};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::nested;
use crate::region::SphericalCap;

/// Deepest order addressable with 64-bit nested indices.
pub const MAX_ORDER: u8 = 29;
pub const BASE_CELLS: u64 = 12;

/// Number of cells at `order`: `12 · 4^order`.
pub fn cell_count(order: u8) -> u64 {
    BASE_CELLS << (2 * u32::from(order))
}

/// Mean angular size of a cell side at `order`, in degrees.
pub fn angular_size_deg(order: u8) -> f64 {
    // Base cells cover 4π/12 steradians each.
    let base = (std::f64::consts::PI / 3.0).sqrt().to_degrees();
    base / f64::from(1u32 << order.min(31))
}

/// Clamps a computed order into `[min_order, max_order]` (and `MAX_ORDER`).
pub fn clamp_order(order: i32, min_order: u8, max_order: u8) -> u8 {
    let max_order = max_order.min(MAX_ORDER);
    let min_order = min_order.min(max_order);
    order.clamp(i32::from(min_order), i32::from(max_order)) as u8
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileError {
    InvalidTileId { order: u8, index: u64 },
}

impl std::fmt::Display for TileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TileError::InvalidTileId { order, index } => {
                write!(f, "invalid tile id: order {order}, index {index}")
            }
        }
    }
}

impl std::error::Error for TileError {}

/// One cell of the NESTED HEALPix tessellation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HealpixCell {
    order: u8,
    index: u64,
}

impl HealpixCell {
    pub fn new(order: u8, index: u64) -> Result<Self, TileError> {
        if order > MAX_ORDER || index >= cell_count(order) {
            return Err(TileError::InvalidTileId { order, index });
        }
        Ok(Self { order, index })
    }

    /// Cell at `order` containing `v`, a direction in the tessellation's frame.
    pub fn containing(order: u8, v: Vec3) -> Result<Self, TileError> {
        if order > MAX_ORDER {
            return Err(TileError::InvalidTileId { order, index: 0 });
        }
        Ok(Self {
            order,
            index: nested::index_at(order, v),
        })
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn parent(&self) -> Option<Self> {
        if self.order == 0 {
            return None;
        }
        Some(Self {
            order: self.order - 1,
            index: self.index >> 2,
        })
    }

    /// Ancestor (or self) at a coarser `order`.
    pub fn ancestor_at(&self, order: u8) -> Option<Self> {
        if order > self.order {
            return None;
        }
        let shift = 2 * u32::from(self.order - order);
        Some(Self {
            order,
            index: self.index >> shift,
        })
    }

    /// The four cells one order deeper; `None` at [`MAX_ORDER`].
    pub fn children(&self) -> Option<[Self; 4]> {
        if self.order >= MAX_ORDER {
            return None;
        }
        let order = self.order + 1;
        let first = self.index << 2;
        Some([0, 1, 2, 3].map(|i| Self {
            order,
            index: first + i,
        }))
    }

    /// Index range of all descendants at a deeper `order`.
    pub fn descendant_range(&self, order: u8) -> Option<std::ops::Range<u64>> {
        if order < self.order || order > MAX_ORDER {
            return None;
        }
        let shift = 2 * u32::from(order - self.order);
        Some((self.index << shift)..((self.index + 1) << shift))
    }

    /// Direction at fractional position `(x, y) ∈ [0, 1]²` inside the cell.
    fn point(&self, x: f64, y: f64) -> Vec3 {
        let n = nested::nside(self.order) as f64;
        let (ix, iy, face) = nested::index_to_xyf(self.order, self.index);
        nested::face_point((ix as f64 + x) / n, (iy as f64 + y) / n, face)
    }

    pub fn center(&self) -> Vec3 {
        self.point(0.5, 0.5)
    }

    /// Corner directions in cyclic order: north, west, south, east.
    pub fn vertices(&self) -> [Vec3; 4] {
        [
            self.point(1.0, 1.0),
            self.point(0.0, 1.0),
            self.point(0.0, 0.0),
            self.point(1.0, 0.0),
        ]
    }

    /// Corners as coordinates tagged with the survey's `frame`.
    pub fn footprint(&self, frame: Frame) -> [SkyCoord; 4] {
        self.vertices().map(|v| SkyCoord::from_vector(v, frame))
    }

    /// A cap around the cell center that contains the whole cell.
    ///
    /// Cell edges are not great circles, so the radius is measured against
    /// the corners and several edge points and then padded.
    pub fn bounding_cap(&self, frame: Frame) -> SphericalCap {
        const EDGE: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];
        let center = self.center();
        let mut radius: f64 = 0.0;
        for t in EDGE {
            for (x, y) in [(t, 0.0), (t, 1.0), (0.0, t), (1.0, t)] {
                radius = radius.max(center.angle_to(self.point(x, y)));
            }
        }
        SphericalCap::from_vector(center, radius * 1.05 + 1e-12, frame)
    }
}

impl std::fmt::Display for HealpixCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.order, self.index)
    }
}

/// Cell of `coord` at `order`, in the coordinate's own frame.
pub fn cell_at(order: u8, coord: &SkyCoord) -> Result<HealpixCell, TileError> {
    HealpixCell::containing(order, coord.to_unit_vector())
}

/// Interned survey identifier; clones are cheap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurveyId(Arc<str>);

impl SurveyId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SurveyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SurveyId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl std::fmt::Display for SurveyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SurveyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SurveyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SurveyId::from)
    }
}

/// A tile of one survey: the cache key for everything fetched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId {
    pub survey: SurveyId,
    pub cell: HealpixCell,
}

impl TileId {
    pub fn new(survey: SurveyId, order: u8, index: u64) -> Result<Self, TileError> {
        Ok(Self {
            survey,
            cell: HealpixCell::new(order, index)?,
        })
    }

    pub fn from_cell(survey: SurveyId, cell: HealpixCell) -> Self {
        Self { survey, cell }
    }

    pub fn order(&self) -> u8 {
        self.cell.order()
    }

    pub fn index(&self) -> u64 {
        self.cell.index()
    }

    pub fn parent(&self) -> Option<Self> {
        Some(Self::from_cell(self.survey.clone(), self.cell.parent()?))
    }

    pub fn children(&self) -> Option<[Self; 4]> {
        let cells = self.cell.children()?;
        Some(cells.map(|c| Self::from_cell(self.survey.clone(), c)))
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.survey, self.cell)
    }
}
