use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{
    FetchConfig, FetchConfigPatch, FetchQuota, ManualFetchReport, SearchResult, Subscription,
    SubscriptionId, TemplateId,
};

/// Request/response boundary to the subscription backend.
///
/// Every call is a single request with a single response. Any failure is
/// reported as an error carrying a human-readable message; the engine treats
/// all failures the same way.
#[async_trait]
pub trait RemoteSubscriptionApi: Send + Sync {
    async fn search_catalog(&self, query: &str) -> Result<Vec<SearchResult>>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn create_subscription(
        &self,
        template_id: &TemplateId,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Subscription>;
    async fn delete_subscription(&self, id: SubscriptionId) -> Result<()>;
    async fn set_subscription_active(&self, id: SubscriptionId, value: bool)
        -> Result<Subscription>;
    async fn get_fetch_config(&self) -> Result<FetchConfig>;
    async fn update_fetch_config(&self, patch: &FetchConfigPatch) -> Result<FetchConfig>;
    async fn get_fetch_quota(&self) -> Result<FetchQuota>;
    async fn manual_fetch(&self) -> Result<ManualFetchReport>;
}
