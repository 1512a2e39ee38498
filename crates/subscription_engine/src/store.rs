//! Authoritative local list of the user's subscriptions.
//!
//! Creation waits for the server record. Deletes and status toggles go
//! through the store's [`MutationGate`] and are committed only after the
//! confirmed remote call succeeds; a failure leaves the stored value as it was.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::{Subscription, SubscriptionId, TemplateId};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    error::{EngineError, EngineResult},
    events::{EngineEvent, Notice},
    form::SourceForm,
    gate::{ActionKind, GatePhase, GateTarget, MutationGate, PendingAction},
    remote::RemoteSubscriptionApi,
};

#[derive(Default)]
struct StoreState {
    subscriptions: Vec<Subscription>,
    is_loading: bool,
    last_error: Option<String>,
    /// Bumped by every local commit; a list response snapshotted before one is stale.
    revision: u64,
    next_list_id: u64,
    current_list: Option<u64>,
}

pub struct SubscriptionStore {
    api: Arc<dyn RemoteSubscriptionApi>,
    gate: MutationGate,
    state: Mutex<StoreState>,
    events: broadcast::Sender<EngineEvent>,
}

impl SubscriptionStore {
    pub fn new(api: Arc<dyn RemoteSubscriptionApi>, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            api,
            gate: MutationGate::new(),
            state: Mutex::new(StoreState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        let _ = self.events.send(EngineEvent::Notice(notice));
    }

    fn publish(&self, subscriptions: Vec<Subscription>) {
        let _ = self
            .events
            .send(EngineEvent::SubscriptionsChanged(subscriptions));
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state().subscriptions.clone()
    }

    pub fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.state()
            .subscriptions
            .iter()
            .find(|subscription| subscription.id == id)
            .cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Loads the full list from the server, replacing local state.
    ///
    /// On failure the list becomes empty rather than stale. A response that
    /// lands after a newer reload was issued, or after a local create, delete
    /// or status change, is discarded and the current list is returned.
    pub async fn list(&self) -> EngineResult<Vec<Subscription>> {
        let (list_id, revision) = {
            let mut state = self.state();
            state.next_list_id += 1;
            let list_id = state.next_list_id;
            state.current_list = Some(list_id);
            state.is_loading = true;
            (list_id, state.revision)
        };
        let response = self.api.list_subscriptions().await;

        let result = {
            let mut state = self.state();
            if state.current_list != Some(list_id) {
                debug!("subscriptions: discarded list response superseded by a newer reload");
                return Ok(state.subscriptions.clone());
            }
            state.current_list = None;
            state.is_loading = false;
            match response {
                Ok(_) if state.revision != revision => {
                    debug!("subscriptions: discarded list response older than a local change");
                    return Ok(state.subscriptions.clone());
                }
                Ok(fetched) => {
                    let mut seen = HashSet::new();
                    let mut subscriptions = Vec::with_capacity(fetched.len());
                    for subscription in fetched {
                        if seen.insert(subscription.id) {
                            subscriptions.push(subscription);
                        } else {
                            warn!(
                                "subscriptions: dropped duplicate id={} from list response",
                                subscription.id
                            );
                        }
                    }
                    info!("subscriptions: loaded count={}", subscriptions.len());
                    state.subscriptions = subscriptions;
                    state.last_error = None;
                    Ok(state.subscriptions.clone())
                }
                Err(err) => {
                    let err = EngineError::remote(err);
                    error!("subscriptions: load failed: {err}");
                    state.subscriptions.clear();
                    state.last_error = Some(err.to_string());
                    Err(err)
                }
            }
        };

        match &result {
            Ok(subscriptions) => self.publish(subscriptions.clone()),
            Err(err) => {
                self.publish(Vec::new());
                self.notify(Notice::failure("Failed to load subscriptions", err.to_string()));
            }
        }
        result
    }

    /// Creates a subscription; nothing is added locally until the server returns it.
    pub async fn create(
        &self,
        template_id: &TemplateId,
        parameters: &BTreeMap<String, String>,
    ) -> EngineResult<Subscription> {
        info!("subscriptions: creating template={template_id}");
        let created = match self.api.create_subscription(template_id, parameters).await {
            Ok(created) => created,
            Err(err) => {
                let err = EngineError::remote(err);
                warn!("subscriptions: create failed template={template_id}: {err}");
                self.notify(Notice::failure("Subscription failed", err.to_string()));
                return Err(err);
            }
        };

        let snapshot = {
            let mut state = self.state();
            if state.subscriptions.iter().any(|s| s.id == created.id) {
                warn!(
                    "subscriptions: discarded create response with colliding id={}",
                    created.id
                );
                return Err(EngineError::Conflict { id: created.id });
            }
            state.subscriptions.push(created.clone());
            state.revision += 1;
            state.subscriptions.clone()
        };

        self.publish(snapshot);
        self.notify(Notice::success(
            "Subscribed",
            format!("Added subscription: {}", created.display_name),
        ));
        Ok(created)
    }

    /// Validates the form locally and creates the subscription only if it passes.
    pub async fn submit(&self, form: &mut SourceForm) -> EngineResult<Subscription> {
        let parameters = form.validate()?;
        self.create(form.template_id(), &parameters).await
    }

    fn ensure_known(&self, id: SubscriptionId) -> EngineResult<()> {
        if self.get(id).is_some() {
            Ok(())
        } else {
            Err(EngineError::UnknownSubscription { id })
        }
    }

    /// Arms a delete for `id`. Nothing changes until [`SubscriptionStore::confirm`].
    pub fn delete(&self, id: SubscriptionId) -> EngineResult<PendingAction> {
        self.ensure_known(id)?;
        let action = PendingAction::delete(id);
        self.gate.arm(action.clone())?;
        Ok(action)
    }

    /// Arms a status toggle for `id`. The stored `is_active` stays untouched
    /// until the confirmed call succeeds.
    pub fn set_active(&self, id: SubscriptionId, value: bool) -> EngineResult<PendingAction> {
        self.ensure_known(id)?;
        let action = PendingAction::toggle(GateTarget::Subscription(id), value);
        self.gate.arm(action.clone())?;
        Ok(action)
    }

    pub fn pending(&self, id: SubscriptionId) -> Option<PendingAction> {
        self.gate.pending(GateTarget::Subscription(id))
    }

    pub fn phase(&self, id: SubscriptionId) -> GatePhase {
        self.gate.phase(GateTarget::Subscription(id))
    }

    pub fn is_action_loading(&self, id: SubscriptionId) -> bool {
        self.gate.is_loading(GateTarget::Subscription(id))
    }

    pub fn cancel(&self, id: SubscriptionId) -> EngineResult<PendingAction> {
        self.gate.cancel(GateTarget::Subscription(id))
    }

    pub fn dismiss(&self, id: SubscriptionId) -> bool {
        self.gate.dismiss(GateTarget::Subscription(id))
    }

    /// Runs the pending action for `id` and commits its result.
    ///
    /// Returns the updated record for a toggle and `None` for a delete.
    pub async fn confirm(&self, id: SubscriptionId) -> EngineResult<Option<Subscription>> {
        let api = Arc::clone(&self.api);
        let outcome = self
            .gate
            .confirm(GateTarget::Subscription(id), move |action| async move {
                match action.kind {
                    ActionKind::Delete => api
                        .delete_subscription(id)
                        .await
                        .map(|()| None)
                        .map_err(EngineError::remote),
                    ActionKind::Enable | ActionKind::Disable => {
                        let value = action
                            .requested_value
                            .unwrap_or(action.kind == ActionKind::Enable);
                        api.set_subscription_active(id, value)
                            .await
                            .map(Some)
                            .map_err(EngineError::remote)
                    }
                    ActionKind::Fetch => Err(EngineError::NotReady(
                        "manual fetch cannot target a subscription",
                    )),
                }
            })
            .await;

        match outcome {
            Ok(None) => {
                self.commit_delete(id);
                self.notify(Notice::success("Deleted", "Subscription removed"));
                Ok(None)
            }
            Ok(Some(updated)) => {
                if updated.id != id {
                    warn!(
                        "subscriptions: discarded status response for id={} while updating id={id}",
                        updated.id
                    );
                    return Err(EngineError::Conflict { id: updated.id });
                }
                let active = updated.is_active;
                if !self.commit_update(updated.clone()) {
                    return Err(EngineError::UnknownSubscription { id });
                }
                self.notify(if active {
                    Notice::success("Subscription enabled", "Updates from this source will be fetched")
                } else {
                    Notice::success("Subscription disabled", "Updates from this source are paused")
                });
                Ok(Some(updated))
            }
            Err(err) => {
                if err.is_transient() {
                    self.notify(Notice::failure("Update failed", err.to_string()));
                }
                Err(err)
            }
        }
    }

    fn commit_delete(&self, id: SubscriptionId) {
        let snapshot = {
            let mut state = self.state();
            state.subscriptions.retain(|subscription| subscription.id != id);
            state.revision += 1;
            state.subscriptions.clone()
        };
        info!("subscriptions: deleted id={id}");
        self.publish(snapshot);
    }

    /// Returns `false` when the record has left the local list meanwhile.
    fn commit_update(&self, updated: Subscription) -> bool {
        let snapshot = {
            let mut state = self.state();
            match state
                .subscriptions
                .iter_mut()
                .find(|subscription| subscription.id == updated.id)
            {
                Some(slot) => *slot = updated,
                None => {
                    warn!(
                        "subscriptions: status response for id={} no longer in the list",
                        updated.id
                    );
                    return false;
                }
            }
            state.revision += 1;
            state.subscriptions.clone()
        };
        self.publish(snapshot);
        true
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
