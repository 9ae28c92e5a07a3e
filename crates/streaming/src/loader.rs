use std::collections::{BTreeMap, VecDeque};

use catalog::{CatalogError, SurveyRegistry, TileFormat};
use foundation::time::Time;
use futures_util::future::{AbortHandle, Aborted, FutureExt, LocalBoxFuture, abortable};
use futures_util::stream::{FuturesUnordered, StreamExt};
use runtime::dispatch::{DispatchBudget, Ticket};
use tracing::{debug, trace};

use crate::cache::{CompletionOutcome, FetchTicket, TileCache};
use crate::source::{Decoded, FetchError, TileDecoder, TileSource};

/// A finished fetch attempt, ready for [`TileCache::complete`].
#[derive(Debug)]
pub struct Completion<P> {
    pub ticket: FetchTicket,
    pub result: Result<Decoded<P>, FetchError>,
}

type Fetched = (FetchTicket, TileFormat, Result<Vec<u8>, FetchError>);

/// Drives tile fetches for a [`TileCache`].
///
/// Everything runs on the caller's task: fetch futures are polled only from
/// [`TileLoader::next_completion`] or [`TileLoader::poll_ready`].
pub struct TileLoader<S, D> {
    source: S,
    decoder: D,
    max_in_flight: usize,
    dispatch_per_frame: usize,
    running: FuturesUnordered<LocalBoxFuture<'static, Fetched>>,
    aborts: BTreeMap<Ticket, AbortHandle>,
    // Failures decided without touching the network.
    ready: VecDeque<(FetchTicket, FetchError)>,
}

impl<S, D> std::fmt::Debug for TileLoader<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLoader")
            .field("in_flight", &self.aborts.len())
            .field("ready", &self.ready.len())
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

impl<S: TileSource, D> TileLoader<S, D> {
    pub fn new(source: S, decoder: D, max_in_flight: usize, dispatch_per_frame: usize) -> Self {
        Self {
            source,
            decoder,
            max_in_flight: max_in_flight.max(1),
            dispatch_per_frame,
            running: FuturesUnordered::new(),
            aborts: BTreeMap::new(),
            ready: VecDeque::new(),
        }
    }

    /// Uses the limits from the cache's configuration.
    pub fn for_cache<P>(source: S, decoder: D, cache: &TileCache<P>) -> Self {
        let cfg = cache.config();
        Self::new(source, decoder, cfg.max_in_flight, cfg.dispatch_per_frame)
    }

    pub fn in_flight(&self) -> usize {
        self.aborts.len()
    }

    /// No fetch running and no completion waiting.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.ready.is_empty()
    }

    /// Aborts cancelled fetches, then starts queued ones within this frame's
    /// budget. Returns how many tickets were taken from the cache.
    pub fn dispatch<P>(&mut self, cache: &mut TileCache<P>, registry: &SurveyRegistry) -> usize {
        for ticket in cache.take_cancelled() {
            self.abort(ticket);
        }

        let room = self.max_in_flight.saturating_sub(self.aborts.len());
        let mut budget = DispatchBudget::new(room.min(self.dispatch_per_frame));
        let tickets = cache.take_dispatchable(&mut budget);
        let count = tickets.len();

        for ticket in tickets {
            let url = match registry.tile_url(&ticket.tile) {
                Ok(url) => url,
                Err(CatalogError::UnknownSurvey(_)) => {
                    self.ready.push_back((ticket, FetchError::UnknownSurvey));
                    continue;
                }
                Err(_) => {
                    self.ready.push_back((ticket, FetchError::InvalidTileId));
                    continue;
                }
            };
            let format = registry
                .get(&ticket.tile.survey)
                .map(|survey| survey.format)
                .unwrap_or_default();

            trace!(tile = %ticket.tile, %url, "starting fetch");
            let (fetch, handle) = abortable(self.source.fetch(&url));
            self.aborts.insert(ticket.ticket, handle);
            self.running.push(
                async move {
                    let result = match fetch.await {
                        Ok(result) => result,
                        Err(Aborted) => Err(FetchError::Aborted),
                    };
                    (ticket, format, result)
                }
                .boxed_local(),
            );
        }
        count
    }

    /// Aborts one in-flight fetch; it will complete with [`FetchError::Aborted`].
    pub fn abort(&mut self, ticket: Ticket) -> bool {
        match self.aborts.remove(&ticket) {
            Some(handle) => {
                handle.abort();
                debug!(?ticket, "aborted fetch");
                true
            }
            None => false,
        }
    }

    fn finish<P>(&mut self, fetched: Fetched) -> Completion<P>
    where
        D: TileDecoder<P>,
    {
        let (ticket, format, result) = fetched;
        self.aborts.remove(&ticket.ticket);
        let result = result.and_then(|bytes| self.decoder.decode(&ticket.tile, format, bytes));
        Completion { ticket, result }
    }

    /// Waits for the next finished attempt; `None` once nothing is running.
    pub async fn next_completion<P>(&mut self) -> Option<Completion<P>>
    where
        D: TileDecoder<P>,
    {
        if let Some((ticket, err)) = self.ready.pop_front() {
            return Some(Completion {
                ticket,
                result: Err(err),
            });
        }
        let fetched = self.running.next().await?;
        Some(self.finish(fetched))
    }

    /// Collects every completion available without waiting.
    pub fn poll_ready<P>(&mut self) -> Vec<Completion<P>>
    where
        D: TileDecoder<P>,
    {
        let mut out: Vec<Completion<P>> = self
            .ready
            .drain(..)
            .map(|(ticket, err)| Completion {
                ticket,
                result: Err(err),
            })
            .collect();
        while let Some(Some(fetched)) = self.running.next().now_or_never() {
            out.push(self.finish(fetched));
        }
        out
    }

    /// Dispatches and completes until the cache has nothing queued and no
    /// fetch is running. `now` supplies completion timestamps.
    pub async fn run_until_idle<P>(
        &mut self,
        cache: &mut TileCache<P>,
        registry: &SurveyRegistry,
        mut now: impl FnMut() -> Time,
    ) -> Vec<(FetchTicket, CompletionOutcome)>
    where
        D: TileDecoder<P>,
    {
        let mut outcomes = Vec::new();
        loop {
            self.dispatch(cache, registry);
            let Some(completion) = self.next_completion().await else {
                if cache.queued_len() == 0 {
                    break;
                }
                continue;
            };
            let outcome = cache.complete(&completion.ticket, completion.result, now());
            outcomes.push((completion.ticket, outcome));
        }
        outcomes
    }
}
