//! Client-side engine behind the subscription settings screens: catalog
//! search, the local subscription list, and the fetch schedule, with every
//! destructive or quota-affecting change gated behind an explicit confirmation.

use std::{sync::Arc, time::Duration};

use shared::domain::{SearchResult, Subscription};
use tokio::sync::broadcast;
use tracing::info;

pub mod error;
pub mod events;
pub mod fetch_config;
pub mod form;
pub mod gate;
pub mod http;
pub mod remote;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{EngineError, EngineResult, FieldErrors};
pub use events::{EngineEvent, Notice, NoticeLevel};
pub use fetch_config::{hour_to_time_string, time_string_to_hour, ConfigController, ScheduleDraft};
pub use form::SourceForm;
pub use gate::{ActionKind, GatePhase, GateTarget, MutationGate, PendingAction};
pub use http::{HttpApiOptions, HttpRemoteApi};
pub use remote::RemoteSubscriptionApi;
pub use search::{SearchOrchestrator, SearchOutcome, SearchQuery, SearchSnapshot};
pub use store::SubscriptionStore;

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub debounce: Duration,
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debounce: search::DEFAULT_DEBOUNCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Wires the components to one remote API and one event channel.
pub struct SubscriptionEngine {
    search: SearchOrchestrator,
    subscriptions: SubscriptionStore,
    fetch_config: ConfigController,
    events: broadcast::Sender<EngineEvent>,
}

impl SubscriptionEngine {
    pub fn new(api: Arc<dyn RemoteSubscriptionApi>, options: EngineOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Arc::new(Self {
            search: SearchOrchestrator::new(Arc::clone(&api), options.debounce, events.clone()),
            subscriptions: SubscriptionStore::new(Arc::clone(&api), events.clone()),
            fetch_config: ConfigController::new(api, events.clone()),
            events,
        })
    }

    pub fn search(&self) -> &SearchOrchestrator {
        &self.search
    }

    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    pub fn fetch_config(&self) -> &ConfigController {
        &self.fetch_config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Loads the subscription list and the fetch settings side by side.
    ///
    /// Both loads always run; the first failure is returned.
    pub async fn initialize(&self) -> EngineResult<()> {
        let (subscriptions, config) =
            tokio::join!(self.subscriptions.list(), self.fetch_config.load());
        info!(
            "engine: initialized subscriptions_ok={} config_ok={}",
            subscriptions.is_ok(),
            config.is_ok()
        );
        subscriptions?;
        config?;
        Ok(())
    }

    /// Picks a catalog result, resets the search box and opens its form.
    ///
    /// The returned form replaces any previous selection's form.
    pub fn select(&self, result: &SearchResult) -> SourceForm {
        SourceForm::new(self.search.select(result))
    }

    pub async fn submit(&self, form: &mut SourceForm) -> EngineResult<Subscription> {
        self.subscriptions.submit(form).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
