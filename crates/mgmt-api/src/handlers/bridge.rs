//! Wire protocol handlers

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use mgmt_core::{Command, MgmtError, WireResponse};
use mgmt_gateway::BridgeState;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /bridge
///
/// Accepts one request object or an array of them and answers in the same
/// shape. Elements are decoded and dispatched one by one, in order.
pub async fn post_bridge(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Request body is not JSON: {}", e)))?;

    let response = match body {
        Value::Array(requests) => {
            tracing::debug!(count = requests.len(), "Bulk request");
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                responses.push(encode(handle_one(&state, request).await)?);
            }
            Value::Array(responses)
        }
        request => encode(handle_one(&state, request).await)?,
    };

    Ok(Json(response))
}

/// GET /bridge/version
pub async fn get_version(State(state): State<AppState>) -> Result<Json<WireResponse>, ApiError> {
    let handler = state.handler();
    if handler.state() != BridgeState::Ready {
        return Err(ApiError::ServiceUnavailable(format!(
            "Bridge {} is not serving requests",
            handler.bridge_id()
        )));
    }
    let value = handler.dispatch(Command::Version).await?;
    Ok(Json(WireResponse::success(value)))
}

async fn handle_one(state: &AppState, request: Value) -> WireResponse {
    let command: Command = match serde_json::from_value(request) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(error = %e, "Undecodable request");
            return WireResponse::from_error(&MgmtError::InvalidRequest(e.to_string()));
        }
    };

    let result = state.handler().dispatch(command).await;
    if let Err(e) = &result {
        tracing::debug!(error_type = e.error_type(), error = %e, "Command failed");
    }
    WireResponse::from_result(result)
}

fn encode(response: WireResponse) -> Result<Value, ApiError> {
    serde_json::to_value(response)
        .map_err(|e| ApiError::Internal(format!("Failed to encode response: {}", e)))
}
