// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP client for the trailing service.

use super::service::TrailService;
use super::types::{
    AckResponse, ExitAllResponse, Identity, OrderId, OrderRequest, OrderResponse,
    PositionsResponse, StartTrailRequest, StartTrailResponse, StatusResponse, StatusSnapshot,
    StopTrailRequest, TrailMode,
};
use crate::error::RemoteError;
use crate::position::{Position, PositionKey};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Header carrying the caller identity on every request.
pub const IDENTITY_HEADER: &str = "X-User-Id";

/// Configuration for the HTTP connection.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

/// [`TrailService`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpTrailService {
    client: Client,
    base_url: String,
}

impl HttpTrailService {
    pub fn new(config: &RpcConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, identity: &Identity, path: &str) -> Result<T, RemoteError> {
        debug!("GET {}", path);
        let resp = self
            .client
            .get(self.url(path))
            .header(IDENTITY_HEADER, identity.as_str())
            .send()
            .await?;
        decode(resp).await
    }

    async fn post<B, T>(&self, identity: &Identity, path: &str, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", path);
        let resp = self
            .client
            .post(self.url(path))
            .header(IDENTITY_HEADER, identity.as_str())
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body: remote_message(body),
        });
    }

    resp.json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

/// The `error` field of a JSON error body, or the raw body when there is none.
fn remote_message(body: String) -> String {
    serde_json::from_str::<AckResponse>(&body)
        .ok()
        .and_then(|ack| ack.error)
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or(body)
}

#[async_trait]
impl TrailService for HttpTrailService {
    async fn positions(&self, identity: &Identity) -> Result<Vec<Position>, RemoteError> {
        let resp: PositionsResponse = self.get(identity, "positions").await?;
        if !resp.success {
            return Err(RemoteError::rejected(resp.error, "Failed to fetch positions"));
        }
        Ok(resp.positions)
    }

    async fn place_order(
        &self,
        identity: &Identity,
        order: &OrderRequest,
    ) -> Result<OrderId, RemoteError> {
        let resp: OrderResponse = self.post(identity, "place-order", order).await?;
        match (resp.success, resp.order_id) {
            (true, Some(order_id)) => Ok(order_id),
            (true, None) => Err(RemoteError::Decode("order accepted without orderId".into())),
            (false, _) => Err(RemoteError::rejected(resp.error, "Order placement failed")),
        }
    }

    async fn start_trail(
        &self,
        identity: &Identity,
        mode: TrailMode,
        request: &StartTrailRequest,
    ) -> Result<Option<String>, RemoteError> {
        let resp: StartTrailResponse = self.post(identity, mode.path(), request).await?;
        if !resp.success {
            return Err(RemoteError::rejected(resp.error, "Failed to start trailing"));
        }
        Ok(resp.position_key)
    }

    async fn stop_trail(&self, identity: &Identity, key: &PositionKey) -> Result<(), RemoteError> {
        let body = StopTrailRequest {
            position_key: key.to_string(),
        };
        let resp: AckResponse = self.post(identity, "stop-trail", &body).await?;
        if !resp.success {
            return Err(RemoteError::rejected(resp.error, "Failed to stop trailing"));
        }
        Ok(())
    }

    async fn trail_status(&self, identity: &Identity) -> Result<StatusSnapshot, RemoteError> {
        let resp: StatusResponse = self.get(identity, "trail-status").await?;
        if !resp.success {
            return Err(RemoteError::rejected(resp.error, "Failed to fetch trail status"));
        }
        Ok(resp.into())
    }

    async fn exit_all_positions(&self, identity: &Identity) -> Result<ExitAllResponse, RemoteError> {
        let resp: ExitAllResponse = self
            .post(identity, "exit-all-positions", &serde_json::json!({}))
            .await?;
        if !resp.success && resp.results.is_empty() {
            return Err(RemoteError::rejected(resp.error, "Failed to exit positions"));
        }
        Ok(resp)
    }
}
