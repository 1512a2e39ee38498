//! Confirmation protocol in front of every state-changing action.
//!
//! Each [`GateTarget`] moves through `Idle -> AwaitingConfirmation ->
//! (Confirmed | Cancelled) -> Idle`. A target holds at most one
//! [`PendingAction`]; arming it again before the first one resolves is
//! rejected. Different targets are gated independently.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use shared::domain::SubscriptionId;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateTarget {
    Subscription(SubscriptionId),
    Config,
    ManualFetch,
}

impl fmt::Display for GateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(id) => write!(f, "subscription {id}"),
            Self::Config => f.write_str("fetch config"),
            Self::ManualFetch => f.write_str("manual fetch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Enable,
    Disable,
    Delete,
    Fetch,
}

/// Snapshot of what the user asked for, captured when the gate is armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub target: GateTarget,
    pub kind: ActionKind,
    pub requested_value: Option<bool>,
}

impl PendingAction {
    pub fn toggle(target: GateTarget, value: bool) -> Self {
        Self {
            target,
            kind: if value {
                ActionKind::Enable
            } else {
                ActionKind::Disable
            },
            requested_value: Some(value),
        }
    }

    pub fn delete(id: SubscriptionId) -> Self {
        Self {
            target: GateTarget::Subscription(id),
            kind: ActionKind::Delete,
            requested_value: None,
        }
    }

    pub fn manual_fetch() -> Self {
        Self {
            target: GateTarget::ManualFetch,
            kind: ActionKind::Fetch,
            requested_value: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    AwaitingConfirmation,
    InFlight,
}

struct Slot {
    action: PendingAction,
    in_flight: bool,
}

#[derive(Default)]
pub struct MutationGate {
    slots: Mutex<HashMap<GateTarget, Slot>>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<GateTarget, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Idle -> AwaitingConfirmation`. Rejected while the target is armed or in flight.
    pub fn arm(&self, action: PendingAction) -> EngineResult<()> {
        let target = action.target;
        let mut slots = self.slots();
        if slots.contains_key(&target) {
            debug!("gate: rejected re-arm target={target}");
            return Err(EngineError::Busy { target });
        }
        info!("gate: awaiting confirmation target={target} kind={:?}", action.kind);
        slots.insert(
            target,
            Slot {
                action,
                in_flight: false,
            },
        );
        Ok(())
    }

    /// `AwaitingConfirmation -> Cancelled -> Idle`. Returns the discarded action.
    pub fn cancel(&self, target: GateTarget) -> EngineResult<PendingAction> {
        let mut slots = self.slots();
        let in_flight = slots
            .get(&target)
            .map(|slot| slot.in_flight)
            .ok_or(EngineError::NotPending { target })?;
        if in_flight {
            return Err(EngineError::InFlight { target });
        }
        let slot = slots
            .remove(&target)
            .ok_or(EngineError::NotPending { target })?;
        info!("gate: cancelled target={target}");
        Ok(slot.action)
    }

    /// Outside click or escape on the confirmation surface.
    ///
    /// Ignored while the confirmed call is in flight; otherwise the same as
    /// [`MutationGate::cancel`]. Returns whether the pending action was dropped.
    pub fn dismiss(&self, target: GateTarget) -> bool {
        match self.cancel(target) {
            Ok(_) => true,
            Err(EngineError::InFlight { .. }) => {
                debug!("gate: ignored dismiss while in flight target={target}");
                false
            }
            Err(_) => false,
        }
    }

    pub fn phase(&self, target: GateTarget) -> GatePhase {
        match self.slots().get(&target) {
            None => GatePhase::Idle,
            Some(slot) if slot.in_flight => GatePhase::InFlight,
            Some(_) => GatePhase::AwaitingConfirmation,
        }
    }

    pub fn pending(&self, target: GateTarget) -> Option<PendingAction> {
        self.slots().get(&target).map(|slot| slot.action.clone())
    }

    pub fn is_loading(&self, target: GateTarget) -> bool {
        self.phase(target) == GatePhase::InFlight
    }

    /// `AwaitingConfirmation -> Confirmed`: runs `call` exactly once for the
    /// captured action and returns the gate to `Idle` whatever the outcome.
    pub async fn confirm<F, Fut, T>(&self, target: GateTarget, call: F) -> EngineResult<T>
    where
        F: FnOnce(PendingAction) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let action = {
            let mut slots = self.slots();
            let slot = slots
                .get_mut(&target)
                .ok_or(EngineError::NotPending { target })?;
            if slot.in_flight {
                return Err(EngineError::Busy { target });
            }
            slot.in_flight = true;
            slot.action.clone()
        };
        info!("gate: confirmed target={target} kind={:?}", action.kind);

        let release = ReleaseOnDrop { gate: self, target };
        let result = call(action).await;
        drop(release);

        match &result {
            Ok(_) => info!("gate: completed target={target}"),
            Err(err) => info!("gate: failed target={target} error={err}"),
        }
        result
    }
}

/// Clears the slot even if the confirm future is dropped mid-call.
struct ReleaseOnDrop<'a> {
    gate: &'a MutationGate,
    target: GateTarget,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.gate.slots().remove(&self.target);
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
