//! Client for the agent backend.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use qconsole_common::config::{HttpConfig, UpstreamConfig};
use qconsole_common::{ConsoleError, Result};

use crate::stream::EventStream;

/// Body of `POST /interact`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractRequest {
    pub query: String,
    pub query_id: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    upstream: UpstreamConfig,
    http: HttpConfig,
}

impl UpstreamClient {
    pub fn new(upstream: UpstreamConfig, http: HttpConfig) -> Result<Self> {
        // No client-wide timeout: the event stream stays open indefinitely.
        let client = Client::builder()
            .connect_timeout(http.connect_timeout())
            .build()?;
        Ok(Self { client, upstream, http })
    }

    pub fn interact_url(&self) -> String {
        self.upstream.interact_url()
    }

    pub fn stream_url(&self) -> String {
        self.upstream.stream_url()
    }

    /// POST a query and return the backend's JSON reply.
    pub async fn interact(&self, request: &InteractRequest) -> Result<Value> {
        let url = self.interact_url();
        debug!(url = %url, query_id = %request.query_id, "Submitting query");

        let resp = self
            .client
            .post(&url)
            .timeout(self.http.request_timeout())
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConsoleError::Upstream { status: status.as_u16(), body });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Subscription handle for the backend's event stream.
    pub fn event_stream(&self) -> EventStream {
        EventStream::new(self.client.clone(), self.stream_url(), self.http.retry_delay())
    }
}
