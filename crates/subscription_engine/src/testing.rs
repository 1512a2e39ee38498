//! In-memory backend used by the unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::domain::{
    FetchConfig, FetchConfigPatch, FetchFrequency, FetchQuota, FieldType, FormFieldSchema,
    ManualFetchReport, SearchResult, Subscription, SubscriptionId, TemplateId,
};

use crate::remote::RemoteSubscriptionApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Search(String),
    List,
    Create(TemplateId, BTreeMap<String, String>),
    Delete(SubscriptionId),
    SetActive(SubscriptionId, bool),
    GetConfig,
    UpdateConfig(FetchConfigPatch),
    GetQuota,
    ManualFetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Search,
    List,
    Create,
    Delete,
    SetActive,
    GetConfig,
    UpdateConfig,
    GetQuota,
    ManualFetch,
}

struct FakeState {
    catalog: Vec<SearchResult>,
    search_delays: HashMap<String, Duration>,
    delays: HashMap<Op, Duration>,
    subscriptions: Vec<Subscription>,
    next_id: i64,
    forced_create_id: Option<SubscriptionId>,
    config: FetchConfig,
    quota: FetchQuota,
    failing: HashSet<Op>,
    calls: Vec<Call>,
}

pub(crate) struct FakeRemoteApi {
    state: Mutex<FakeState>,
}

impl FakeRemoteApi {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                catalog: Vec::new(),
                search_delays: HashMap::new(),
                delays: HashMap::new(),
                subscriptions: Vec::new(),
                next_id: 100,
                forced_create_id: None,
                config: sample_config(),
                quota: FetchQuota {
                    daily_limit: 10,
                    current_count: 2,
                    remaining_count: 8,
                    can_fetch: true,
                    last_fetch_at: None,
                },
                failing: HashSet::new(),
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state")
    }

    pub(crate) fn with_catalog(self, catalog: Vec<SearchResult>) -> Self {
        self.state().catalog = catalog;
        self
    }

    pub(crate) fn with_subscriptions(self, subscriptions: Vec<Subscription>) -> Self {
        self.state().subscriptions = subscriptions;
        self
    }

    pub(crate) fn with_config(self, config: FetchConfig) -> Self {
        self.state().config = config;
        self
    }

    pub(crate) fn with_quota(self, quota: FetchQuota) -> Self {
        self.state().quota = quota;
        self
    }

    pub(crate) fn delay_search(&self, query: &str, delay: Duration) {
        self.state().search_delays.insert(query.to_string(), delay);
    }

    /// Holds every later `op` response for `delay` after the call is recorded.
    pub(crate) fn delay(&self, op: Op, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    pub(crate) fn config(&self) -> FetchConfig {
        self.state().config.clone()
    }

    pub(crate) fn fail(&self, op: Op) {
        self.state().failing.insert(op);
    }

    pub(crate) fn recover(&self, op: Op) {
        self.state().failing.remove(&op);
    }

    pub(crate) fn force_create_id(&self, id: SubscriptionId) {
        self.state().forced_create_id = Some(id);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub(crate) fn search_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Search(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn mutation_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    Call::Create(..)
                        | Call::Delete(_)
                        | Call::SetActive(..)
                        | Call::UpdateConfig(_)
                        | Call::ManualFetch
                )
            })
            .count()
    }

    fn record(&self, call: Call, op: Op) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(anyhow!("{op:?} failed: backend unavailable"));
        }
        Ok(())
    }

    async fn pause(&self, op: Op) {
        let delay = self.state().delays.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteSubscriptionApi for FakeRemoteApi {
    async fn search_catalog(&self, query: &str) -> Result<Vec<SearchResult>> {
        let delay = self.state().search_delays.get(query).copied();
        self.record(Call::Search(query.to_string()), Op::Search)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let needle = query.to_lowercase();
        Ok(self
            .state()
            .catalog
            .iter()
            .filter(|result| {
                result.id.as_str().to_lowercase().contains(&needle)
                    || result.display_name.to_lowercase().contains(&needle)
                    || result.platform.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.record(Call::List, Op::List)?;
        let snapshot = self.state().subscriptions.clone();
        self.pause(Op::List).await;
        Ok(snapshot)
    }

    async fn create_subscription(
        &self,
        template_id: &TemplateId,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Subscription> {
        self.record(
            Call::Create(template_id.clone(), parameters.clone()),
            Op::Create,
        )?;
        let mut state = self.state();
        let id = match state.forced_create_id.take() {
            Some(id) => id,
            None => {
                state.next_id += 1;
                SubscriptionId(state.next_id)
            }
        };
        let created = Subscription {
            id,
            template_id: template_id.clone(),
            display_name: format!("{template_id} subscription"),
            target_identifier: parameters.values().next().cloned().unwrap_or_default(),
            platform: "bilibili".to_string(),
            is_active: true,
            created_at: created_at(),
        };
        state.subscriptions.push(created.clone());
        Ok(created)
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.record(Call::Delete(id), Op::Delete)?;
        self.state().subscriptions.retain(|s| s.id != id);
        Ok(())
    }

    async fn set_subscription_active(
        &self,
        id: SubscriptionId,
        value: bool,
    ) -> Result<Subscription> {
        self.record(Call::SetActive(id, value), Op::SetActive)?;
        self.pause(Op::SetActive).await;
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("subscription {id} not found"))?;
        subscription.is_active = value;
        Ok(subscription.clone())
    }

    async fn get_fetch_config(&self) -> Result<FetchConfig> {
        self.record(Call::GetConfig, Op::GetConfig)?;
        Ok(self.state().config.clone())
    }

    async fn update_fetch_config(&self, patch: &FetchConfigPatch) -> Result<FetchConfig> {
        self.record(Call::UpdateConfig(patch.clone()), Op::UpdateConfig)?;
        self.pause(Op::UpdateConfig).await;
        let mut state = self.state();
        let config = &mut state.config;
        if let Some(value) = patch.auto_fetch_enabled {
            config.auto_fetch_enabled = value;
        }
        if let Some(value) = patch.frequency {
            config.frequency = value;
        }
        if let Some(value) = patch.preferred_hour {
            config.preferred_hour = value;
        }
        if let Some(value) = patch.daily_limit {
            config.daily_limit = value;
        }
        Ok(config.clone())
    }

    async fn get_fetch_quota(&self) -> Result<FetchQuota> {
        self.record(Call::GetQuota, Op::GetQuota)?;
        Ok(self.state().quota.clone())
    }

    async fn manual_fetch(&self) -> Result<ManualFetchReport> {
        self.record(Call::ManualFetch, Op::ManualFetch)?;
        let mut state = self.state();
        state.quota.current_count += 1;
        state.quota.remaining_count = state.quota.remaining_count.saturating_sub(1);
        state.quota.can_fetch = state.quota.remaining_count > 0;
        Ok(ManualFetchReport {
            success: true,
            message: "fetched 3 new items".to_string(),
            quota_after: Some(state.quota.clone()),
        })
    }
}

pub(crate) fn created_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 7, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn sample_config() -> FetchConfig {
    FetchConfig {
        auto_fetch_enabled: true,
        frequency: FetchFrequency::Daily,
        preferred_hour: 9,
        daily_limit: 10,
        timezone: Some("Asia/Shanghai".to_string()),
    }
}

pub(crate) fn bilibili_result() -> SearchResult {
    SearchResult {
        id: TemplateId::new("bilibili_user_videos"),
        display_name: "Bilibili - uploader videos".to_string(),
        description: "Latest uploads from a bilibili creator".to_string(),
        platform: "bilibili".to_string(),
        form_schema: vec![FormFieldSchema::new("uid", "Uploader UID", FieldType::Number)
            .required()
            .with_pattern("^[0-9]+$", "UID must be digits only")],
    }
}

pub(crate) fn weibo_result() -> SearchResult {
    SearchResult {
        id: TemplateId::new("weibo_keyword_search"),
        display_name: "Weibo - keyword search".to_string(),
        description: "Posts matching a keyword".to_string(),
        platform: "weibo".to_string(),
        form_schema: vec![FormFieldSchema::new("query", "Keyword", FieldType::String).required()],
    }
}

pub(crate) fn subscription(id: i64, is_active: bool) -> Subscription {
    Subscription {
        id: SubscriptionId(id),
        template_id: TemplateId::new("bilibili_user_videos"),
        display_name: format!("Bilibili uploader {id}"),
        target_identifier: "297572288".to_string(),
        platform: "bilibili".to_string(),
        is_active,
        created_at: created_at(),
    }
}
