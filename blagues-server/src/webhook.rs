//! Signed inbound events from the chat transport.
//!
//! The transport posts every command and every interaction to `/events`.
//! Commands start a flow on their own task; interactions are fanned out to
//! the flows waiting on them.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use blagues_core::{FlowRequest, UserEvent};

use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-signature-256";

/// Id attached to each inbound request and carried through its logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Command(FlowRequest),
    Interaction(UserEvent),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub message: String,
    pub correlation_id: String,
}

type HmacSha256 = Hmac<Sha256>;

pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison.
    mac.verify_slice(&signature_bytes).is_ok()
}

/// `sha256=<hex>` signature of `payload`, as the transport computes it.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!(correlation_id = %correlation_id.0, "event without signature");
            StatusCode::UNAUTHORIZED
        })?;

    if !verify_signature(&state.config.webhook_secret, &bytes, signature) {
        error!(correlation_id = %correlation_id.0, "invalid event signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let mut request = Request::from_parts(parts, axum::body::Body::from(bytes));
    request.extensions_mut().insert(correlation_id);

    Ok(next.run(request).await)
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<(StatusCode, Json<WebhookResponse>), StatusCode> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let event: InboundEvent = serde_json::from_slice(&bytes).map_err(|e| {
        warn!(correlation_id = %correlation_id, error = %e, "malformed event");
        StatusCode::BAD_REQUEST
    })?;

    let message = match event {
        InboundEvent::Command(request) => {
            info!(
                correlation_id = %correlation_id,
                command = request.command.name(),
                user = %request.actor.id,
                "command received"
            );
            let flow = state.flow.clone();
            let task_correlation_id = correlation_id.clone();
            tokio::spawn(async move {
                // Failures were already answered and logged by the flow.
                if let Err(err) = flow.handle(request).await {
                    debug!(correlation_id = %task_correlation_id, error = %err, "flow ended with error");
                }
            });
            "command accepted".to_string()
        }
        InboundEvent::Interaction(event) => {
            let delivered = state.flow.hub().publish(event);
            debug!(correlation_id = %correlation_id, delivered, "interaction dispatched");
            format!("interaction delivered to {} waiting flow(s)", delivered)
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            message,
            correlation_id,
        }),
    ))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(events_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blagues_core::flow::Command;
    use blagues_core::UserEventKind;
    use serde_json::json;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"type":"interaction"}"#;
        let signature = sign("secret", body).unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature("secret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("secret", b"tampered", &signature));
    }

    #[test]
    fn test_malformed_signatures_are_rejected() {
        let body = b"{}";
        let hex_only = sign("secret", body).unwrap().trim_start_matches("sha256=").to_string();
        assert!(!verify_signature("secret", body, &hex_only));
        assert!(!verify_signature("secret", body, "sha256=not-hex"));
        assert!(!verify_signature("secret", body, ""));
    }

    #[test]
    fn test_inbound_event_wire_format() {
        let command: InboundEvent = serde_json::from_value(json!({
            "type": "command",
            "actor": {"id": "1", "name": "Alice"},
            "conversation": "commands",
            "command": "correct",
            "identifier": "42"
        }))
        .unwrap();
        match command {
            InboundEvent::Command(request) => assert_eq!(
                request.command,
                Command::Correct {
                    identifier: "42".to_string()
                }
            ),
            other => panic!("unexpected event {:?}", other),
        }

        let interaction: InboundEvent = serde_json::from_value(json!({
            "type": "interaction",
            "actor": {"id": "1", "name": "Alice"},
            "conversation": "commands",
            "kind": {"kind": "button", "prompt": "reply-1", "id": "send"}
        }))
        .unwrap();
        match interaction {
            InboundEvent::Interaction(event) => assert!(matches!(
                event.kind,
                UserEventKind::Button { ref id, .. } if id == "send"
            )),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
