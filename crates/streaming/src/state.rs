use std::collections::BTreeSet;
use std::sync::Arc;

use healpix::TileId;

/// Lifecycle of one cached tile: `Pending → Loaded | Error`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TileState {
    /// Requested; queued or in flight.
    Pending,
    Loaded,
    /// Last attempt failed; may be retried after backoff.
    Error,
}

/// Answer to a synchronous tile lookup.
#[derive(Debug)]
pub enum TileLookup<P> {
    Loaded(Arc<P>),
    Pending,
    /// Failed and not (yet) retried; draw nothing.
    Unavailable,
    /// The request queue is full; nothing was recorded, ask again later.
    Deferred,
}

impl<P> TileLookup<P> {
    pub fn state(&self) -> Option<TileState> {
        match self {
            TileLookup::Loaded(_) => Some(TileState::Loaded),
            TileLookup::Pending => Some(TileState::Pending),
            TileLookup::Unavailable => Some(TileState::Error),
            TileLookup::Deferred => None,
        }
    }

    pub fn payload(&self) -> Option<&Arc<P>> {
        match self {
            TileLookup::Loaded(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, TileLookup::Loaded(_))
    }
}

impl<P> Clone for TileLookup<P> {
    fn clone(&self) -> Self {
        match self {
            TileLookup::Loaded(p) => TileLookup::Loaded(Arc::clone(p)),
            TileLookup::Pending => TileLookup::Pending,
            TileLookup::Unavailable => TileLookup::Unavailable,
            TileLookup::Deferred => TileLookup::Deferred,
        }
    }
}

/// Read-only view of which tiles are already usable.
pub trait Residency {
    fn is_loaded(&self, tile: &TileId) -> bool;
}

impl Residency for BTreeSet<TileId> {
    fn is_loaded(&self, tile: &TileId) -> bool {
        self.contains(tile)
    }
}
