//! NVIDIA NIM upstream client

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::stream::relay_lines;
use crate::types::ChatCompletionRequest;
use axum::body::Bytes;
use futures::Stream;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::io;
use std::time::Duration;
use tracing::{error, info};

/// Client for the NIM chat completions endpoint
#[derive(Debug, Clone)]
pub struct NimClient {
    client: Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl NimClient {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            url: config.chat_completions_url(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// Send the request and wait for the response head.
    async fn send(&self, request: &ChatCompletionRequest) -> Result<Response> {
        info!("Forwarding to NVIDIA API...");

        let pending = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send();
        let response = tokio::time::timeout(self.timeout, pending).await??;

        info!("NVIDIA response status: {}", response.status());
        Ok(response)
    }

    /// Non-streaming chat completion; returns the upstream JSON unchanged.
    pub async fn chat_completion(&self, request: &ChatCompletionRequest) -> Result<Value> {
        tokio::time::timeout(self.timeout, self.exchange(request)).await?
    }

    async fn exchange(&self, request: &ChatCompletionRequest) -> Result<Value> {
        let response = self.send(request).await?;
        if response.status() != StatusCode::OK {
            return Err(rejected(response, false).await);
        }
        Ok(response.json::<Value>().await?)
    }

    /// Streaming chat completion; returns the upstream body re-chunked by line.
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<impl Stream<Item = std::result::Result<Bytes, io::Error>> + Send + 'static> {
        let response = self.send(request).await?;
        if response.status() != StatusCode::OK {
            return Err(tokio::time::timeout(self.timeout, rejected(response, true)).await?);
        }
        Ok(relay_lines(response.bytes_stream(), self.timeout))
    }
}

async fn rejected(response: Response, streaming: bool) -> ProxyError {
    let status = response.status();
    let details = match response.text().await {
        Ok(text) => text,
        Err(e) => return e.into(),
    };
    error!("NVIDIA API error: {}", details);
    ProxyError::Upstream {
        status,
        details,
        streaming,
    }
}
