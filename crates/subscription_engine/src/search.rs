//! Debounced, de-duplicated catalog search.
//!
//! Every keystroke calls [`SearchOrchestrator::search`]. Calls are tagged with
//! an input generation so that only the text still pending when the debounce
//! window elapses is sent, and every issued request carries a request id so
//! that a response is rendered only while its request is the current one.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::domain::SearchResult;
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{events::EngineEvent, remote::RemoteSubscriptionApi};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub issued_at: Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSnapshot {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub is_loading: bool,
    pub show_results: bool,
}

impl SearchSnapshot {
    /// The benign "no results" state shown after an empty or failed search.
    pub fn is_empty_result(&self) -> bool {
        self.show_results && !self.is_loading && self.results.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A request was issued and its response is now displayed.
    Results(Vec<SearchResult>),
    /// Same text as the last issued query; the displayed results stay.
    Unchanged(Vec<SearchResult>),
    /// Blank input cleared the results.
    Cleared,
    /// A newer keystroke or request overtook this call, or the same text is
    /// already in flight; this call applied nothing.
    Superseded,
}

impl SearchOutcome {
    pub fn results(&self) -> &[SearchResult] {
        match self {
            Self::Results(results) | Self::Unchanged(results) => results,
            Self::Cleared | Self::Superseded => &[],
        }
    }
}

#[derive(Default)]
struct SearchState {
    input_generation: u64,
    next_request_id: u64,
    current_request: Option<u64>,
    last_issued: Option<SearchQuery>,
    query: String,
    results: Vec<SearchResult>,
    is_loading: bool,
    show_results: bool,
}

impl SearchState {
    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            query: self.query.clone(),
            results: self.results.clone(),
            is_loading: self.is_loading,
            show_results: self.show_results,
        }
    }

    fn clear(&mut self) {
        self.input_generation += 1;
        self.current_request = None;
        self.last_issued = None;
        self.query.clear();
        self.results.clear();
        self.is_loading = false;
        self.show_results = false;
    }
}

pub struct SearchOrchestrator {
    api: Arc<dyn RemoteSubscriptionApi>,
    debounce: Duration,
    state: Mutex<SearchState>,
    events: broadcast::Sender<EngineEvent>,
}

impl SearchOrchestrator {
    pub fn new(
        api: Arc<dyn RemoteSubscriptionApi>,
        debounce: Duration,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            api,
            debounce,
            state: Mutex::new(SearchState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: SearchSnapshot) {
        let _ = self.events.send(EngineEvent::SearchChanged(snapshot));
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.state().snapshot()
    }

    pub fn last_issued(&self) -> Option<SearchQuery> {
        self.state().last_issued.clone()
    }

    pub async fn search(&self, text: &str) -> SearchOutcome {
        let normalized = text.trim().to_string();

        let generation = {
            let mut state = self.state();
            if normalized.is_empty() {
                state.clear();
                let snapshot = state.snapshot();
                drop(state);
                debug!("search: cleared on blank input");
                self.publish(snapshot);
                return SearchOutcome::Cleared;
            }
            state.input_generation += 1;
            state.query = text.to_string();
            state.input_generation
        };

        tokio::time::sleep(self.debounce).await;

        let (request_id, snapshot) = {
            let mut state = self.state();
            if state.input_generation != generation {
                return SearchOutcome::Superseded;
            }
            if state
                .last_issued
                .as_ref()
                .is_some_and(|issued| issued.text == normalized)
            {
                debug!("search: skipped duplicate query={normalized}");
                // The request already in flight for this text delivers the results.
                if state.is_loading {
                    return SearchOutcome::Superseded;
                }
                return SearchOutcome::Unchanged(state.results.clone());
            }
            state.next_request_id += 1;
            let request_id = state.next_request_id;
            state.current_request = Some(request_id);
            state.last_issued = Some(SearchQuery {
                text: normalized.clone(),
                issued_at: Instant::now(),
            });
            state.is_loading = true;
            (request_id, state.snapshot())
        };
        self.publish(snapshot);

        info!(request_id, query = %normalized, "search: issuing catalog request");
        let response = self.api.search_catalog(&normalized).await;

        let (results, snapshot) = {
            let mut state = self.state();
            if state.current_request != Some(request_id) {
                debug!("search: discarded stale response request_id={request_id}");
                return SearchOutcome::Superseded;
            }
            let results = match response {
                Ok(results) => results,
                Err(err) => {
                    warn!("search: catalog request failed request_id={request_id}: {err:#}");
                    Vec::new()
                }
            };
            state.results = results.clone();
            state.is_loading = false;
            state.show_results = true;
            (results, state.snapshot())
        };
        self.publish(snapshot);

        SearchOutcome::Results(results)
    }

    /// Drops the query, the results and anything pending or in flight.
    pub fn clear(&self) {
        let snapshot = {
            let mut state = self.state();
            state.clear();
            state.snapshot()
        };
        self.publish(snapshot);
    }

    /// Hands the chosen result back and resets the search box.
    pub fn select(&self, result: &SearchResult) -> SearchResult {
        info!("search: selected template={}", result.id);
        self.clear();
        result.clone()
    }
}

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod tests;
