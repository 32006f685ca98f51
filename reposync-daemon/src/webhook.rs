//! HTTP surface: health check and the repository-created webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use reposync_core::{MigrateMode, RepositoryRef};
use serde::Deserialize;
use sha2::Sha256;

use crate::intake::{EventIntake, IntakeOutcome};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const EVENT_HEADER: &str = "X-GitHub-Event";

#[derive(Clone)]
pub struct WebhookState {
    intake: EventIntake,
    secret: Option<Arc<str>>,
}

impl WebhookState {
    pub fn new(intake: EventIntake, secret: Option<String>) -> Self {
        Self {
            intake,
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryEvent {
    #[serde(default)]
    action: String,
    #[serde(default)]
    repository: EventRepository,
}

#[derive(Debug, Default, Deserialize)]
struct EventRepository {
    #[serde(default)]
    name: String,
    #[serde(default)]
    clone_url: String,
}

/// `/health` always; `/migrate-webhook` only when `mode` accepts webhooks.
pub fn router(mode: MigrateMode, state: WebhookState) -> Router {
    let mut router = Router::new().route("/health", get(health));
    if mode.accepts_webhooks() {
        router = router.route("/migrate-webhook", post(migrate_webhook));
        tracing::info!("webhook endpoint active at /migrate-webhook");
    }
    router.with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn migrate_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    handle_migrate_webhook(&state, &headers, &body).await
}

/// Validate a `repository` event and mirror the new repository.
pub async fn handle_migrate_webhook(
    state: &WebhookState,
    headers: &HeaderMap,
    body: &Bytes,
) -> (StatusCode, String) {
    if let Some(secret) = state.secret.as_deref() {
        if let Err(reason) = verify_signature(secret, headers, body) {
            tracing::warn!(reason, "webhook signature verification failed");
            return (StatusCode::UNAUTHORIZED, "invalid signature".to_string());
        }
    }

    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("repository");
    if event_type == "ping" {
        return (StatusCode::OK, "pong".to_string());
    }

    let event: RepositoryEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "error parsing webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                "Error parsing webhook payload".to_string(),
            );
        }
    };

    if event.repository.name.is_empty() || event.repository.clone_url.is_empty() {
        tracing::warn!("webhook payload missing repository name or clone URL");
        return (
            StatusCode::BAD_REQUEST,
            "Invalid repository name or clone URL".to_string(),
        );
    }

    if event.action != "created" {
        tracing::info!(action = %event.action, "ignoring non-creation event");
        return (StatusCode::OK, String::new());
    }

    let repo = RepositoryRef::new(event.repository.name, event.repository.clone_url);
    match state.intake.repository_created(&repo).await {
        Ok(IntakeOutcome::Created) => (
            StatusCode::OK,
            "Repository mirrored successfully".to_string(),
        ),
        Ok(IntakeOutcome::AlreadyMirrored) => {
            (StatusCode::OK, "Repository already mirrored".to_string())
        }
        Err(err) => {
            tracing::error!(repo = %repo.name, error = %err, "error creating destination mirror");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error creating destination mirror: {err}"),
            )
        }
    }
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), &'static str> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or("missing signature header")?;
    let hex_sig = header
        .strip_prefix("sha256=")
        .ok_or("signature does not start with sha256=")?;
    let sig = hex::decode(hex_sig).map_err(|_| "signature is not hex")?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "bad HMAC key")?;
    mac.update(body);
    mac.verify_slice(&sig).map_err(|_| "signature mismatch")
}
