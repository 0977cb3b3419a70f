//! HTTP webhook endpoint: HMAC-SHA1 signature verification and the push
//! event envelope.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha1::Sha1;
use tracing::{info, warn};

use crate::queue::DeployQueue;

type HmacSha1 = Hmac<Sha1>;

/// Shared state for the webhook handler.
#[derive(Clone)]
pub struct WebhookState {
    pub webhook_key: String,
    pub queue: DeployQueue,
}

/// A GitHub-shaped push event envelope. Only the fields the deploy pipeline
/// reads are modeled; everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub before: String,
    pub after: String,
    pub repository: Repository,
    pub pusher: Pusher,
    pub head_commit: HeadCommit,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Repository {
    pub clone_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pusher {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeadCommit {
    pub message: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Verify an `X-Hub-Signature: sha1=<hex>` header against the raw body,
/// using the configured secret. Comparison is constant-time via
/// `Mac::verify_slice`.
#[must_use]
pub fn verify_signature(body: &[u8], header_value: &str, secret: &str) -> bool {
    let Some(hex_sig) = header_value.strip_prefix("sha1=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// `GET /`, `GET /readyz`, `GET /livez`.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /webhook`.
pub async fn webhook_handler(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    let signature = headers
        .get("X-Hub-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if !verify_signature(&body, signature, &state.webhook_key) {
        warn!("rejected webhook with invalid signature");
        return Err(StatusCode::BAD_REQUEST);
    }

    let push_event: PushEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "failed to parse webhook payload");
        StatusCode::BAD_REQUEST
    })?;

    info!(git_ref = %push_event.git_ref, "enqueuing push event");
    state.queue.enqueue(push_event).await;

    Ok(Json(json!({ "enqueued": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_a_correctly_signed_body() {
        let body = b"payload bytes";
        let secret = "topsecret";
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = format!("sha1={}", hex::encode(mac.finalize().into_bytes()));

        assert!(verify_signature(body, &signature, secret));
    }

    #[test]
    fn rejects_a_mismatched_signature() {
        let body = b"payload bytes";
        assert!(!verify_signature(
            body,
            "sha1=0000000000000000000000000000000000000000",
            "topsecret"
        ));
    }

    #[test]
    fn rejects_a_missing_sha1_prefix() {
        assert!(!verify_signature(b"body", "deadbeef", "topsecret"));
    }
}
