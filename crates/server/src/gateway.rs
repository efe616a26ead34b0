use crate::context::RelayContext;
use crate::payload::{WebhookEnvelope, EVENT_CALLBACK, URL_VERIFICATION};
use crate::signature;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use slackrelay_core::metrics::MetricsSnapshot;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-request-timestamp";
const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Rejections of the synchronous phase of a delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing or invalid request signature")]
    Unauthorized,
    #[error("unsupported envelope type: {0}")]
    UnsupportedEnvelope(String),
    #[error("could not parse webhook payload: {0}")]
    Parse(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::UnsupportedEnvelope(_) => StatusCode::BAD_REQUEST,
            WebhookError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    ctx: RelayContext,
    signing_secret: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    in_flight: usize,
    sessions: usize,
    metrics: MetricsSnapshot,
}

pub struct Gateway {
    ctx: RelayContext,
    signing_secret: String,
    addr: SocketAddr,
}

impl Gateway {
    pub fn new(ctx: RelayContext, signing_secret: String, addr: SocketAddr) -> Self {
        Self {
            ctx,
            signing_secret,
            addr,
        }
    }

    pub fn router(&self) -> Router {
        router(self.ctx.clone(), self.signing_secret.clone())
    }

    /// Serve until `shutdown` resolves, then tear the relay context down.
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        info!("Gateway listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.ctx.shutdown();
        Ok(())
    }
}

pub fn router(ctx: RelayContext, signing_secret: String) -> Router {
    let state = AppState {
        ctx,
        signing_secret,
    };
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(events))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        in_flight: state.ctx.dedup().len(),
        sessions: state.ctx.sessions().len(),
        metrics: state.ctx.metrics().snapshot(),
    })
}

fn header<'a>(headers: &'a HeaderMap, primary: &str, fallback: &str) -> &'a str {
    headers
        .get(primary)
        .or_else(|| headers.get(fallback))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// POST /events: verify, answer challenges, accept callbacks and hand
/// them to the relay in the background.
async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let sig = header(&headers, SIGNATURE_HEADER, SLACK_SIGNATURE_HEADER);
    let ts = header(&headers, TIMESTAMP_HEADER, SLACK_TIMESTAMP_HEADER);
    if !signature::verify(&state.signing_secret, sig, ts, &body) {
        warn!("Rejected webhook with invalid signature");
        return Err(WebhookError::Unauthorized);
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Unparseable webhook payload");
        WebhookError::Parse(e.to_string())
    })?;

    match envelope.kind.as_str() {
        URL_VERIFICATION => {
            let challenge = envelope.challenge.unwrap_or_default();
            debug!("Answered URL verification challenge");
            Ok(Json(json!({ "challenge": challenge })).into_response())
        }
        EVENT_CALLBACK => {
            let Some(event) = envelope.event else {
                return Err(WebhookError::UnsupportedEnvelope(
                    "event_callback without event".to_string(),
                ));
            };
            let inbound = event.into_inbound();
            let session_id = state.ctx.dispatch(inbound);
            debug!(
                %session_id,
                event_id = envelope.event_id.as_deref().unwrap_or_default(),
                "Accepted event callback"
            );
            Ok((StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response())
        }
        other => {
            warn!(kind = %other, "Unsupported webhook envelope");
            Err(WebhookError::UnsupportedEnvelope(other.to_string()))
        }
    }
}
