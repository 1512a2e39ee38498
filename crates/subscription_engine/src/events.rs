//! Events broadcast from the engine to whatever renders it.

use shared::domain::{FetchConfig, Subscription};

use crate::search::SearchSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Failure,
}

/// A dismissible, transient notification. Never blocks the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn failure(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Failure,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.level == NoticeLevel::Failure
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Notice(Notice),
    SearchChanged(SearchSnapshot),
    SubscriptionsChanged(Vec<Subscription>),
    FetchConfigChanged(Option<FetchConfig>),
}
