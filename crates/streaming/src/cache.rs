use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::time::Time;
use healpix::{SurveyId, TileId};
use runtime::dispatch::{DispatchBudget, DispatchQueue, Ticket};
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::source::{Decoded, FetchError};
use crate::state::{Residency, TileLookup, TileState};
use crate::stats::CacheStats;

/// One fetch attempt handed to a loader.
///
/// The ticket is only honoured by [`TileCache::complete`] while the attempt
/// is still current: invalidating the survey or starting a newer attempt
/// makes it stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub ticket: Ticket,
    pub tile: TileId,
    pub generation: u64,
}

/// What [`TileCache::complete`] did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Loaded { evicted: Vec<TileId> },
    Failed { permanent: bool },
    /// The attempt no longer matches a live entry; the result was dropped.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Queued {
    tile: TileId,
    generation: u64,
}

#[derive(Debug)]
struct TileEntry<P> {
    state: TileState,
    payload: Option<Arc<P>>,
    bytes: usize,
    last_access: u64,
    attempts: u32,
    retry_at: Option<Time>,
    last_error: Option<FetchError>,
    // Current attempt, queued or in flight.
    ticket: Option<Ticket>,
}

impl<P> TileEntry<P> {
    fn pending(ticket: Ticket, tick: u64) -> Self {
        Self {
            state: TileState::Pending,
            payload: None,
            bytes: 0,
            last_access: tick,
            attempts: 0,
            retry_at: None,
            last_error: None,
            ticket: Some(ticket),
        }
    }
}

/// In-memory tile store with request coalescing and LRU eviction.
///
/// All state transitions after the initial request go through
/// [`TileCache::complete`]. Entries are kept in a `BTreeMap`, and eviction
/// breaks `last_access` ties by tile order, so runs are reproducible.
#[derive(Debug)]
pub struct TileCache<P> {
    config: CacheConfig,
    entries: BTreeMap<TileId, TileEntry<P>>,
    queue: DispatchQueue<Queued>,
    in_flight: BTreeMap<Ticket, TileId>,
    cancelled: Vec<Ticket>,
    generations: BTreeMap<SurveyId, u64>,
    tick: u64,
    loaded: usize,
    loaded_bytes: usize,
    stats: CacheStats,
}

impl<P> TileCache<P> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            queue: DispatchQueue::with_capacity_limit(config.max_queued),
            config,
            entries: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            cancelled: Vec::new(),
            generations: BTreeMap::new(),
            tick: 0,
            loaded: 0,
            loaded_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn loaded_len(&self) -> usize {
        self.loaded
    }

    pub fn loaded_bytes(&self) -> usize {
        self.loaded_bytes
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn generation(&self, survey: &SurveyId) -> u64 {
        self.generations.get(survey).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats;
        stats.entries = self.entries.len();
        stats.loaded = self.loaded;
        stats.loaded_bytes = self.loaded_bytes;
        stats.pending = self
            .entries
            .values()
            .filter(|e| e.state == TileState::Pending)
            .count();
        stats.errored = self
            .entries
            .values()
            .filter(|e| e.state == TileState::Error)
            .count();
        stats.queued = self.queue.len();
        stats.in_flight = self.in_flight.len();
        stats
    }

    pub fn state(&self, tile: &TileId) -> Option<TileState> {
        self.entries.get(tile).map(|e| e.state)
    }

    /// Loaded payload without touching recency or requesting anything.
    pub fn peek(&self, tile: &TileId) -> Option<Arc<P>> {
        self.entries.get(tile).and_then(|e| e.payload.clone())
    }

    pub fn last_error(&self, tile: &TileId) -> Option<&FetchError> {
        self.entries.get(tile).and_then(|e| e.last_error.as_ref())
    }

    pub fn attempts(&self, tile: &TileId) -> u32 {
        self.entries.get(tile).map_or(0, |e| e.attempts)
    }

    /// Looks a tile up, requesting it if it is not known yet.
    ///
    /// Coarser orders are dispatched first; use
    /// [`TileCache::get_with_priority`] to choose otherwise.
    pub fn get(&mut self, tile: &TileId, now: Time) -> TileLookup<P> {
        self.get_with_priority(tile, i64::from(tile.order()), now)
    }

    /// Like [`TileCache::get`]; lower `priority` values are dispatched first.
    pub fn get_with_priority(&mut self, tile: &TileId, priority: i64, now: Time) -> TileLookup<P> {
        self.tick += 1;
        let tick = self.tick;
        let generation = self.generation(&tile.survey);

        let Some(entry) = self.entries.get_mut(tile) else {
            let queued = Queued {
                tile: tile.clone(),
                generation,
            };
            let Ok(ticket) = self.queue.push(priority, queued) else {
                self.stats.deferred += 1;
                trace!(%tile, "request queue full, deferring");
                return TileLookup::Deferred;
            };
            self.entries
                .insert(tile.clone(), TileEntry::pending(ticket, tick));
            self.stats.misses += 1;
            trace!(%tile, ?ticket, "queued tile request");
            return TileLookup::Pending;
        };

        match entry.state {
            TileState::Loaded => {
                entry.last_access = tick;
                self.stats.hits += 1;
                match &entry.payload {
                    Some(payload) => TileLookup::Loaded(Arc::clone(payload)),
                    None => TileLookup::Unavailable,
                }
            }
            TileState::Pending => TileLookup::Pending,
            TileState::Error => {
                let due = entry.retry_at.is_some_and(|at| now >= at);
                if !due {
                    return TileLookup::Unavailable;
                }
                let queued = Queued {
                    tile: tile.clone(),
                    generation,
                };
                let Ok(ticket) = self.queue.push(priority, queued) else {
                    self.stats.deferred += 1;
                    return TileLookup::Unavailable;
                };
                entry.state = TileState::Pending;
                entry.ticket = Some(ticket);
                entry.retry_at = None;
                entry.last_access = tick;
                debug!(%tile, attempt = entry.attempts + 1, "retrying tile");
                TileLookup::Pending
            }
        }
    }

    /// Pops queued requests, in priority order, while `budget` allows.
    ///
    /// Returned tickets count as in flight until completed or cancelled.
    pub fn take_dispatchable(&mut self, budget: &mut DispatchBudget) -> Vec<FetchTicket> {
        let drained = self.queue.drain_within(budget);
        let mut out = Vec::with_capacity(drained.len());
        for (ticket, queued) in drained {
            self.in_flight.insert(ticket, queued.tile.clone());
            out.push(FetchTicket {
                ticket,
                tile: queued.tile,
                generation: queued.generation,
            });
        }
        if !out.is_empty() {
            debug!(count = out.len(), in_flight = self.in_flight.len(), "dispatching tiles");
        }
        out
    }

    /// In-flight tickets whose results are no longer wanted; the loader
    /// should abort them.
    pub fn take_cancelled(&mut self) -> Vec<Ticket> {
        std::mem::take(&mut self.cancelled)
    }

    /// Applies the result of one fetch attempt.
    pub fn complete(
        &mut self,
        fetch: &FetchTicket,
        result: Result<Decoded<P>, FetchError>,
        now: Time,
    ) -> CompletionOutcome {
        self.in_flight.remove(&fetch.ticket);

        if fetch.generation != self.generation(&fetch.tile.survey) {
            return self.stale(fetch);
        }
        let Some(entry) = self.entries.get_mut(&fetch.tile) else {
            return self.stale(fetch);
        };
        if entry.state != TileState::Pending || entry.ticket != Some(fetch.ticket) {
            return self.stale(fetch);
        }
        entry.ticket = None;

        match result {
            Ok(decoded) => {
                self.tick += 1;
                entry.state = TileState::Loaded;
                entry.payload = Some(Arc::new(decoded.payload));
                entry.bytes = decoded.bytes;
                entry.last_access = self.tick;
                entry.retry_at = None;
                entry.last_error = None;
                self.loaded += 1;
                self.loaded_bytes += decoded.bytes;
                trace!(tile = %fetch.tile, bytes = decoded.bytes, "tile loaded");
                let evicted = self.evict_as_needed(&fetch.tile);
                CompletionOutcome::Loaded { evicted }
            }
            Err(err) => {
                entry.attempts += 1;
                entry.state = TileState::Error;
                entry.retry_at = self.config.retry.retry_at(entry.attempts, now);
                let permanent = entry.retry_at.is_none();
                self.stats.failures += 1;
                if permanent {
                    warn!(tile = %fetch.tile, attempts = entry.attempts, error = %err, "tile failed permanently");
                } else {
                    debug!(tile = %fetch.tile, attempts = entry.attempts, error = %err, "tile fetch failed");
                }
                entry.last_error = Some(err);
                CompletionOutcome::Failed { permanent }
            }
        }
    }

    fn stale(&mut self, fetch: &FetchTicket) -> CompletionOutcome {
        self.stats.stale_completions += 1;
        trace!(tile = %fetch.tile, ticket = ?fetch.ticket, "ignoring stale completion");
        CompletionOutcome::Stale
    }

    fn over_budget(&self) -> bool {
        self.loaded > self.config.max_tiles
            || self
                .config
                .max_bytes
                .is_some_and(|max| self.loaded_bytes > max)
    }

    fn evict_as_needed(&mut self, protected: &TileId) -> Vec<TileId> {
        let mut evicted = Vec::new();
        while self.over_budget() {
            let candidate = self
                .entries
                .iter()
                .filter(|(k, e)| e.state == TileState::Loaded && *k != protected)
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.last_access
                        .cmp(&eb.last_access)
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());

            let Some(tile) = candidate else {
                break;
            };
            if let Some(entry) = self.entries.remove(&tile) {
                self.loaded -= 1;
                self.loaded_bytes = self.loaded_bytes.saturating_sub(entry.bytes);
            }
            self.stats.evictions += 1;
            debug!(%tile, "evicted tile");
            evicted.push(tile);
        }
        evicted
    }

    /// Forgets every tile of `survey`.
    ///
    /// Queued requests are dropped, in-flight ones are reported through
    /// [`TileCache::take_cancelled`], and completions issued before this call
    /// are ignored. Returns the number of entries removed.
    pub fn invalidate(&mut self, survey: &SurveyId) -> usize {
        *self.generations.entry(survey.clone()).or_insert(0) += 1;

        let before = self.entries.len();
        let mut freed_loaded = 0;
        let mut freed_bytes = 0;
        let mut tickets = Vec::new();
        self.entries.retain(|tile, entry| {
            if &tile.survey != survey {
                return true;
            }
            if entry.state == TileState::Loaded {
                freed_loaded += 1;
                freed_bytes += entry.bytes;
            }
            tickets.extend(entry.ticket);
            false
        });
        self.loaded -= freed_loaded;
        self.loaded_bytes = self.loaded_bytes.saturating_sub(freed_bytes);

        let mut dropped_queued = 0;
        let mut aborted = 0;
        for ticket in tickets {
            if self.queue.cancel(ticket).is_some() {
                dropped_queued += 1;
            } else if self.in_flight.remove(&ticket).is_some() {
                self.cancelled.push(ticket);
                aborted += 1;
            }
        }

        let removed = before - self.entries.len();
        debug!(%survey, removed, dropped_queued, aborted, "invalidated survey");
        removed
    }
}

impl<P> Residency for TileCache<P> {
    fn is_loaded(&self, tile: &TileId) -> bool {
        self.state(tile) == Some(TileState::Loaded)
    }
}
