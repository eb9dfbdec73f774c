//! Client for the Kubernetes custom metrics API (`custom.metrics.k8s.io/v1beta1`)

use super::{MetricSample, MetricSelector, MetricSource};
use crate::error::TelemetryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const API_PATH: &str = "apis/custom.metrics.k8s.io/v1beta1";

/// Object a metric value describes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescribedObject {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub api_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValueItem {
    #[serde(default)]
    pub described_object: DescribedObject,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Response body of a custom metrics query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValueList {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub metadata: ListMetadata,
    #[serde(default)]
    pub items: Vec<MetricValueItem>,
}

impl From<MetricValueItem> for MetricSample {
    fn from(item: MetricValueItem) -> Self {
        Self {
            described_object: item.described_object,
            metric_name: item.metric_name,
            timestamp: item.timestamp,
            value: item.value,
        }
    }
}

/// HTTP client for pod metrics served through the custom metrics API
#[derive(Debug, Clone)]
pub struct CustomMetricsClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl CustomMetricsClient {
    /// Create a client for the API server at `base_url`.
    ///
    /// `request_timeout` bounds each HTTP request. The controller applies
    /// its own deadline on top.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, TelemetryError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        // Joining relative paths keeps any prefix only with a trailing slash
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Authenticate requests with a bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of `metric_name` for the pods matched by `selector`
    pub fn metric_url(
        &self,
        selector: &MetricSelector,
        metric_name: &str,
    ) -> Result<Url, TelemetryError> {
        let path = format!(
            "{}/namespaces/{}/pods/{}/{}",
            API_PATH, selector.namespace, selector.pod, metric_name
        );
        let mut url = self.base_url.join(&path)?;
        if let Some(labels) = &selector.label_selector {
            url.query_pairs_mut().append_pair("labelSelector", labels);
        }
        Ok(url)
    }

    /// Fetch the raw metric list
    pub async fn fetch(
        &self,
        selector: &MetricSelector,
        metric_name: &str,
    ) -> Result<MetricValueList, TelemetryError> {
        let url = self.metric_url(selector, metric_name)?;
        debug!(url = %url, "Querying custom metrics API");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl MetricSource for CustomMetricsClient {
    async fn query(
        &self,
        selector: &MetricSelector,
        metric_name: &str,
    ) -> Result<Vec<MetricSample>, TelemetryError> {
        let list = self.fetch(selector, metric_name).await?;
        Ok(list.items.into_iter().map(MetricSample::from).collect())
    }
}
