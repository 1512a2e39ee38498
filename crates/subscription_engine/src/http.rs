//! reqwest-backed [`RemoteSubscriptionApi`] for the subscription backend.

use std::{collections::BTreeMap, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        FetchConfig, FetchConfigPatch, FetchQuota, ManualFetchReport, SearchResult, Subscription,
        SubscriptionId, TemplateId, UserId,
    },
    error::ApiException,
    protocol::{
        CatalogSearchQuery, CatalogSearchResponse, CreateSubscriptionRequest, ManualFetchRequest,
        SetSubscriptionActiveRequest, SubscriptionListResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::remote::RemoteSubscriptionApi;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct HttpApiOptions {
    pub base_url: String,
    pub user_id: UserId,
    pub bearer_token: Option<String>,
    pub request_timeout: Duration,
    pub search_limit: u32,
}

impl HttpApiOptions {
    pub fn new(base_url: impl Into<String>, user_id: UserId) -> Self {
        Self {
            base_url: base_url.into(),
            user_id,
            bearer_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

pub struct HttpRemoteApi {
    http: Client,
    base: Url,
    user_id: UserId,
    bearer_token: Option<String>,
    search_limit: u32,
}

impl HttpRemoteApi {
    pub fn new(options: HttpApiOptions) -> Result<Self> {
        let raw = options.base_url.trim();
        if !raw.starts_with("http://") && !raw.starts_with("https://") {
            anyhow::bail!("api url must start with http:// or https://, got '{raw}'");
        }
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let base = Url::parse(&normalized)
            .with_context(|| format!("invalid api url: {normalized}"))?;
        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base,
            user_id: options.user_id,
            bearer_token: options.bearer_token,
            search_limit: options.search_limit,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path: {path}"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .context("request to subscription backend failed")?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiException::from_body(status.as_u16(), &body).into())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .context("failed to decode subscription backend response")
    }
}

#[async_trait]
impl RemoteSubscriptionApi for HttpRemoteApi {
    async fn search_catalog(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = self.endpoint("api/v1/subscription-search/search")?;
        debug!("http: GET {url} query={query}");
        let body: CatalogSearchResponse = self
            .send_json(self.http.get(url).query(&CatalogSearchQuery {
                query: query.to_string(),
                limit: self.search_limit,
            }))
            .await?;
        Ok(body.templates)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let url = self.endpoint("api/v1/subscriptions-v2/")?;
        let body: SubscriptionListResponse = self.send_json(self.http.get(url)).await?;
        Ok(body.subscriptions)
    }

    async fn create_subscription(
        &self,
        template_id: &TemplateId,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Subscription> {
        let url = self.endpoint("api/v1/subscriptions-v2/")?;
        self.send_json(self.http.post(url).json(&CreateSubscriptionRequest {
            template_id: template_id.clone(),
            parameters: parameters.clone(),
            custom_name: parameters.get("custom_name").cloned(),
        }))
        .await
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<()> {
        let url = self.endpoint(&format!("api/v1/subscriptions-v2/{id}"))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn set_subscription_active(
        &self,
        id: SubscriptionId,
        value: bool,
    ) -> Result<Subscription> {
        let url = self.endpoint(&format!("api/v1/subscriptions/{id}"))?;
        self.send_json(
            self.http
                .put(url)
                .json(&SetSubscriptionActiveRequest { is_active: value }),
        )
        .await
    }

    async fn get_fetch_config(&self) -> Result<FetchConfig> {
        let url = self.endpoint(&format!("api/v1/fetch/config/{}", self.user_id))?;
        self.send_json(self.http.get(url)).await
    }

    async fn update_fetch_config(&self, patch: &FetchConfigPatch) -> Result<FetchConfig> {
        let url = self.endpoint(&format!("api/v1/fetch/config/{}", self.user_id))?;
        self.send_json(self.http.post(url).json(patch)).await
    }

    async fn get_fetch_quota(&self) -> Result<FetchQuota> {
        let url = self.endpoint(&format!("api/v1/fetch/quota/{}", self.user_id))?;
        self.send_json(self.http.get(url)).await
    }

    async fn manual_fetch(&self) -> Result<ManualFetchReport> {
        let url = self.endpoint("api/v1/fetch/manual-fetch")?;
        self.send_json(self.http.post(url).json(&ManualFetchRequest {
            user_id: self.user_id.0,
        }))
        .await
    }
}
