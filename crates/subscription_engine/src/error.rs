use std::collections::BTreeMap;

use shared::domain::SubscriptionId;
use thiserror::Error;

use crate::gate::GateTarget;

/// Field name to human-readable message.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("remote call failed: {0}")]
    Remote(String),
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(FieldErrors),
    #[error("server returned subscription {id} which already exists locally")]
    Conflict { id: SubscriptionId },
    #[error("an action for {target} is already awaiting confirmation or in flight")]
    Busy { target: GateTarget },
    #[error("no action is awaiting confirmation for {target}")]
    NotPending { target: GateTarget },
    #[error("action for {target} is in flight and cannot be abandoned")]
    InFlight { target: GateTarget },
    #[error("unknown subscription {id}")]
    UnknownSubscription { id: SubscriptionId },
    #[error("{0}")]
    NotReady(&'static str),
}

impl EngineError {
    pub fn remote(err: anyhow::Error) -> Self {
        Self::Remote(format!("{err:#}"))
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Errors the user can act on by retrying the originating action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
