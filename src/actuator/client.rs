//! reqwest implementation of [`BarrierActuator`]

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ActuatorError, BarrierActuator, CloseAck, OpenAck, OpenRequest};
use crate::types::{ActuatorEndpoint, BarrierState, VehicleInfo};

/// Shared HTTP client for every camera's actuator.
///
/// Holds no per-camera state; the endpoint travels with each call so
/// configuration reloads never need to rebuild it.
#[derive(Clone, Debug)]
pub struct ActuatorClient {
    http: reqwest::Client,
}

/// Superset of the backend's open/close/status payloads.
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    barrier_opened: Option<bool>,
    #[serde(default)]
    is_open: Option<bool>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    vehicle_info: Option<VehicleInfo>,
    /// Exit responses carry fee/duration at the top level
    #[serde(flatten)]
    inline_vehicle: VehicleInfo,
}

impl Reply {
    fn reason(&self) -> Option<String> {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .filter(|m| !m.trim().is_empty())
    }
}

impl ActuatorClient {
    pub fn new(timeout: Duration) -> Result<Self, ActuatorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActuatorError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    /// Send a request and decode the reply, regardless of HTTP status.
    ///
    /// - 2xx with `success: true` → `Ok(reply)`
    /// - 2xx/4xx with `success: false` → `Rejected`
    /// - other non-2xx → `Status`, preferring the body's `error` field
    /// - 2xx that is not the expected JSON → `Malformed`
    async fn exchange(&self, req: reqwest::RequestBuilder) -> Result<Reply, ActuatorError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ActuatorError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ActuatorError::Network(e.to_string()))?;

        let parsed = serde_json::from_str::<Reply>(&body);

        if status.is_server_error() || (!status.is_success() && parsed.is_err()) {
            let message = parsed
                .ok()
                .and_then(|r| r.reason())
                .unwrap_or_else(|| {
                    let text = body.trim();
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("error").to_string()
                    } else {
                        text.chars().take(200).collect()
                    }
                });
            return Err(ActuatorError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let reply = parsed.map_err(|e| ActuatorError::Malformed(e.to_string()))?;
        if !reply.success {
            return Err(ActuatorError::Rejected {
                message: reply
                    .reason()
                    .unwrap_or_else(|| "request refused by barrier backend".to_string()),
            });
        }
        Ok(reply)
    }
}

#[async_trait]
impl BarrierActuator for ActuatorClient {
    async fn open(
        &self,
        endpoint: &ActuatorEndpoint,
        request: &OpenRequest,
    ) -> Result<OpenAck, ActuatorError> {
        let reply = self
            .exchange(self.http.post(endpoint.open_url()).json(request))
            .await?;

        let vehicle_info = reply
            .vehicle_info
            .clone()
            .or_else(|| (!reply.inline_vehicle.is_empty()).then(|| reply.inline_vehicle.clone()));

        Ok(OpenAck {
            // Older backends omit the flag; success means the barrier moved.
            barrier_opened: reply.barrier_opened.unwrap_or(true),
            message: reply.message.unwrap_or_default(),
            vehicle_info,
        })
    }

    async fn close(&self, endpoint: &ActuatorEndpoint) -> Result<CloseAck, ActuatorError> {
        let reply = self.exchange(self.http.post(endpoint.close_url())).await?;
        Ok(CloseAck {
            is_open: reply.is_open.unwrap_or(false),
            message: reply.message.unwrap_or_default(),
        })
    }

    async fn status(&self, endpoint: &ActuatorEndpoint) -> Result<BarrierState, ActuatorError> {
        let reply = self.exchange(self.http.get(endpoint.status_url())).await?;
        let is_open = reply
            .is_open
            .ok_or_else(|| ActuatorError::Malformed("status reply without is_open".to_string()))?;
        // Unlike feed pushes, a status reply must state `enabled` to count as enabled.
        Ok(BarrierState::observed(is_open, reply.enabled.unwrap_or(false)))
    }
}
