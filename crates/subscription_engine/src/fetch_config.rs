//! Auto-fetch schedule configuration and daily fetch quota.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::{FetchConfig, FetchConfigPatch, FetchFrequency, FetchQuota, ManualFetchReport};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    error::{EngineError, EngineResult, FieldErrors},
    events::{EngineEvent, Notice},
    gate::{GatePhase, GateTarget, MutationGate, PendingAction},
    remote::RemoteSubscriptionApi,
};

pub const MAX_HOUR: u8 = 23;

fn clamp_hour(hour: i64) -> u8 {
    u8::try_from(hour.clamp(0, i64::from(MAX_HOUR))).unwrap_or(MAX_HOUR)
}

/// Formats an hour as `HH:00`, clamping into `0..=23`.
pub fn hour_to_time_string(hour: i64) -> String {
    format!("{:02}:00", clamp_hour(hour))
}

/// Reads the hour part of `HH:MM`, clamping into `0..=23`.
///
/// Returns `None` when the hour part is not an integer.
pub fn time_string_to_hour(value: &str) -> Option<u8> {
    let hour = value.split(':').next()?.trim().parse::<i64>().ok()?;
    Some(clamp_hour(hour))
}

/// Unsaved schedule edits; only sent by [`ConfigController::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub frequency: FetchFrequency,
    pub preferred_hour: u8,
}

impl ScheduleDraft {
    fn from_config(config: &FetchConfig) -> Self {
        Self {
            frequency: config.frequency,
            preferred_hour: config.preferred_hour.min(MAX_HOUR),
        }
    }

    pub fn preferred_time(&self) -> String {
        hour_to_time_string(i64::from(self.preferred_hour))
    }
}

#[derive(Default)]
struct ConfigState {
    config: Option<FetchConfig>,
    draft: Option<ScheduleDraft>,
    quota: Option<FetchQuota>,
    is_loading: bool,
    is_saving: bool,
    last_error: Option<String>,
}

pub struct ConfigController {
    api: Arc<dyn RemoteSubscriptionApi>,
    gate: MutationGate,
    state: Mutex<ConfigState>,
    events: broadcast::Sender<EngineEvent>,
}

impl ConfigController {
    pub fn new(api: Arc<dyn RemoteSubscriptionApi>, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            api,
            gate: MutationGate::new(),
            state: Mutex::new(ConfigState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, ConfigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        let _ = self.events.send(EngineEvent::Notice(notice));
    }

    fn publish(&self, config: Option<FetchConfig>) {
        let _ = self.events.send(EngineEvent::FetchConfigChanged(config));
    }

    pub fn config(&self) -> Option<FetchConfig> {
        self.state().config.clone()
    }

    pub fn draft(&self) -> Option<ScheduleDraft> {
        self.state().draft
    }

    pub fn quota(&self) -> Option<FetchQuota> {
        self.state().quota.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Edits are accepted only once a record is present, no load or save runs,
    /// and no auto-fetch change is pending.
    pub fn can_edit(&self) -> bool {
        self.ensure_editable(&self.state()).is_ok()
    }

    /// Callers hold the state lock so that a save and an armed toggle exclude each other.
    fn ensure_editable(&self, state: &ConfigState) -> EngineResult<()> {
        if state.config.is_none() || state.draft.is_none() {
            return Err(EngineError::NotReady("fetch settings are not loaded"));
        }
        if state.is_loading {
            return Err(EngineError::NotReady("fetch settings are still loading"));
        }
        if state.is_saving {
            return Err(EngineError::NotReady("fetch settings are being saved"));
        }
        if self.gate.phase(GateTarget::Config) != GatePhase::Idle {
            return Err(EngineError::NotReady("an auto-fetch change is pending"));
        }
        Ok(())
    }

    /// The committed toggle value; a pending or failed change never shows here.
    pub fn displayed_auto_fetch(&self) -> Option<bool> {
        self.state()
            .config
            .as_ref()
            .map(|config| config.auto_fetch_enabled)
    }

    pub async fn load(&self) -> EngineResult<FetchConfig> {
        self.state().is_loading = true;
        let response = self.api.get_fetch_config().await;

        let result = {
            let mut state = self.state();
            state.is_loading = false;
            match response {
                Ok(config) => {
                    state.draft = Some(ScheduleDraft::from_config(&config));
                    state.config = Some(config.clone());
                    state.last_error = None;
                    Ok(config)
                }
                Err(err) => {
                    let err = EngineError::remote(err);
                    state.last_error = Some(err.to_string());
                    Err(err)
                }
            }
        };

        match &result {
            Ok(config) => {
                info!(
                    "fetch_config: loaded auto_fetch={} frequency={} hour={}",
                    config.auto_fetch_enabled, config.frequency, config.preferred_hour
                );
                self.publish(Some(config.clone()));
            }
            Err(err) => {
                warn!("fetch_config: load failed: {err}");
                self.notify(Notice::failure("Failed to load fetch settings", err.to_string()));
            }
        }
        result
    }

    fn edit_draft(&self, edit: impl FnOnce(&mut ScheduleDraft)) -> EngineResult<ScheduleDraft> {
        let mut state = self.state();
        self.ensure_editable(&state)?;
        let draft = state
            .draft
            .as_mut()
            .ok_or(EngineError::NotReady("fetch settings are not loaded"))?;
        edit(draft);
        Ok(*draft)
    }

    pub fn set_frequency(&self, frequency: FetchFrequency) -> EngineResult<ScheduleDraft> {
        self.edit_draft(|draft| draft.frequency = frequency)
    }

    pub fn set_preferred_hour(&self, hour: i64) -> EngineResult<ScheduleDraft> {
        let hour = clamp_hour(hour);
        self.edit_draft(|draft| draft.preferred_hour = hour)
    }

    pub fn set_preferred_time(&self, value: &str) -> EngineResult<ScheduleDraft> {
        let Some(hour) = time_string_to_hour(value) else {
            let mut errors = FieldErrors::new();
            errors.insert(
                "preferred_hour".to_string(),
                format!("'{value}' is not a valid HH:00 time"),
            );
            return Err(EngineError::Validation(errors));
        };
        self.edit_draft(|draft| draft.preferred_hour = hour)
    }

    /// Sends only the fields present in `patch`; the returned record replaces
    /// local state as a whole and resets the draft.
    pub async fn update(&self, patch: FetchConfigPatch) -> EngineResult<FetchConfig> {
        {
            let mut state = self.state();
            if patch.is_empty() {
                if let Some(config) = &state.config {
                    return Ok(config.clone());
                }
            }
            if state.is_saving {
                return Err(EngineError::NotReady("a settings update is already running"));
            }
            if self.gate.phase(GateTarget::Config) != GatePhase::Idle {
                return Err(EngineError::NotReady("an auto-fetch change is pending"));
            }
            state.is_saving = true;
        }

        let result = self
            .api
            .update_fetch_config(&patch)
            .await
            .map_err(EngineError::remote);

        {
            let mut state = self.state();
            state.is_saving = false;
            match &result {
                Ok(record) => {
                    state.draft = Some(ScheduleDraft::from_config(record));
                    state.config = Some(record.clone());
                    state.last_error = None;
                }
                Err(err) => state.last_error = Some(err.to_string()),
            }
        }

        match &result {
            Ok(record) => self.publish(Some(record.clone())),
            Err(err) => {
                warn!("fetch_config: update failed: {err}");
                self.notify(Notice::failure("Failed to save fetch settings", err.to_string()));
            }
        }
        result
    }

    /// Saves the schedule draft together with the committed toggle value.
    pub async fn save(&self) -> EngineResult<FetchConfig> {
        let patch = {
            let state = self.state();
            self.ensure_editable(&state)?;
            let (Some(config), Some(draft)) = (&state.config, &state.draft) else {
                return Err(EngineError::NotReady("fetch settings are not loaded"));
            };
            FetchConfigPatch {
                auto_fetch_enabled: Some(config.auto_fetch_enabled),
                frequency: Some(draft.frequency),
                preferred_hour: Some(draft.preferred_hour),
                daily_limit: None,
            }
        };

        let saved = self.update(patch).await?;
        info!(
            "fetch_config: saved frequency={} hour={}",
            saved.frequency, saved.preferred_hour
        );
        self.notify(Notice::success(
            "Settings saved",
            format!(
                "Fetching {} at {}",
                saved.frequency,
                hour_to_time_string(i64::from(saved.preferred_hour))
            ),
        ));
        Ok(saved)
    }

    /// Arms the auto-fetch toggle; the committed value stays until confirmation succeeds.
    ///
    /// Refused while a save runs, since the save carries the committed toggle value.
    pub fn request_auto_fetch(&self, enabled: bool) -> EngineResult<PendingAction> {
        let state = self.state();
        if state.config.is_none() || state.is_loading {
            return Err(EngineError::NotReady("fetch settings are not loaded"));
        }
        if state.is_saving {
            return Err(EngineError::NotReady("fetch settings are being saved"));
        }
        let action = PendingAction::toggle(GateTarget::Config, enabled);
        self.gate.arm(action.clone())?;
        Ok(action)
    }

    pub fn pending_auto_fetch(&self) -> Option<PendingAction> {
        self.gate.pending(GateTarget::Config)
    }

    pub fn auto_fetch_phase(&self) -> GatePhase {
        self.gate.phase(GateTarget::Config)
    }

    pub fn cancel_auto_fetch(&self) -> EngineResult<PendingAction> {
        self.gate.cancel(GateTarget::Config)
    }

    pub fn dismiss_auto_fetch(&self) -> bool {
        self.gate.dismiss(GateTarget::Config)
    }

    pub async fn confirm_auto_fetch(&self) -> EngineResult<FetchConfig> {
        let api = Arc::clone(&self.api);
        let result = self
            .gate
            .confirm(GateTarget::Config, move |action| async move {
                let patch = FetchConfigPatch {
                    auto_fetch_enabled: action.requested_value,
                    ..FetchConfigPatch::default()
                };
                api.update_fetch_config(&patch)
                    .await
                    .map_err(EngineError::remote)
            })
            .await;

        match result {
            Ok(record) => {
                // Unsaved schedule edits survive a toggle.
                self.state().config = Some(record.clone());
                self.publish(Some(record.clone()));
                self.notify(if record.auto_fetch_enabled {
                    Notice::success("Auto-fetch enabled", "Updates will be fetched on schedule")
                } else {
                    Notice::success(
                        "Auto-fetch disabled",
                        "Updates are no longer fetched automatically",
                    )
                });
                Ok(record)
            }
            Err(err) => {
                warn!("fetch_config: auto-fetch toggle failed: {err}");
                self.state().last_error = Some(err.to_string());
                // Re-publish the unchanged record so the toggle snaps back.
                self.publish(self.config());
                self.notify(Notice::failure("Failed to update auto-fetch", err.to_string()));
                Err(err)
            }
        }
    }

    pub async fn refresh_quota(&self) -> EngineResult<FetchQuota> {
        match self.api.get_fetch_quota().await {
            Ok(quota) => {
                self.state().quota = Some(quota.clone());
                Ok(quota)
            }
            Err(err) => {
                let err = EngineError::remote(err);
                warn!("fetch_config: quota refresh failed: {err}");
                self.notify(Notice::failure("Failed to load fetch quota", err.to_string()));
                Err(err)
            }
        }
    }

    /// Arms a manual fetch, which spends daily quota.
    pub fn request_manual_fetch(&self) -> EngineResult<PendingAction> {
        if self
            .state()
            .quota
            .as_ref()
            .is_some_and(|quota| !quota.can_fetch)
        {
            return Err(EngineError::NotReady("daily fetch quota is exhausted"));
        }
        let action = PendingAction::manual_fetch();
        self.gate.arm(action.clone())?;
        Ok(action)
    }

    pub fn cancel_manual_fetch(&self) -> EngineResult<PendingAction> {
        self.gate.cancel(GateTarget::ManualFetch)
    }

    pub fn dismiss_manual_fetch(&self) -> bool {
        self.gate.dismiss(GateTarget::ManualFetch)
    }

    pub fn manual_fetch_phase(&self) -> GatePhase {
        self.gate.phase(GateTarget::ManualFetch)
    }

    pub async fn confirm_manual_fetch(&self) -> EngineResult<ManualFetchReport> {
        let api = Arc::clone(&self.api);
        let result = self
            .gate
            .confirm(GateTarget::ManualFetch, move |_action| async move {
                api.manual_fetch().await.map_err(EngineError::remote)
            })
            .await;

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.notify(Notice::failure("Manual fetch failed", err.to_string()));
                return Err(err);
            }
        };

        match &report.quota_after {
            Some(quota) => {
                self.state().quota = Some(quota.clone());
            }
            None => {
                let _ = self.refresh_quota().await;
            }
        }

        info!("fetch_config: manual fetch success={} message={}", report.success, report.message);
        self.notify(if report.success {
            Notice::success("Fetch complete", report.message.clone())
        } else {
            Notice::failure("Fetch incomplete", report.message.clone())
        });
        Ok(report)
    }
}

#[cfg(test)]
#[path = "tests/fetch_config_tests.rs"]
mod tests;
