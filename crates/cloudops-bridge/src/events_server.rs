//! Slack Events API endpoint feeding reactions into the workflow.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cloudops_slack::{
    parse_slack_events_request, verify_slack_request_signature, SlackEventsRequest,
    SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER,
};
use cloudops_workflow::ReactionWorkflow;
use serde_json::json;
use tokio::net::TcpListener;

use crate::processed_event_index::ProcessedEventIndex;

pub const SLACK_EVENTS_ENDPOINT: &str = "/slack/events";
pub const HEALTH_ENDPOINT: &str = "/healthz";

#[derive(Debug, Clone)]
pub struct EventsServerConfig {
    pub signing_secret: String,
    pub max_skew_seconds: u64,
    pub processed_event_cap: usize,
}

pub struct EventsServerState {
    workflow: Arc<ReactionWorkflow>,
    signing_secret: String,
    max_skew_seconds: u64,
    processed_events: Mutex<ProcessedEventIndex>,
}

impl EventsServerState {
    pub fn new(workflow: Arc<ReactionWorkflow>, config: &EventsServerConfig) -> Self {
        Self {
            workflow,
            signing_secret: config.signing_secret.clone(),
            max_skew_seconds: config.max_skew_seconds,
            processed_events: Mutex::new(ProcessedEventIndex::new(config.processed_event_cap)),
        }
    }

    /// Returns `false` for an event id seen before.
    fn mark_event_processed(&self, event_id: &str) -> bool {
        self.processed_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .mark_processed(event_id)
    }

    fn processed_event_count(&self) -> usize {
        self.processed_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

pub async fn run_events_server(bind: &str, state: Arc<EventsServerState>) -> Result<()> {
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid --bind '{bind}': expected host:port"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind slack events endpoint on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve slack events listen address")?;
    tracing::info!(addr = %local_addr, endpoint = SLACK_EVENTS_ENDPOINT, "slack events endpoint listening");

    let app = build_events_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("slack events server exited unexpectedly")?;
    Ok(())
}

pub fn build_events_router(state: Arc<EventsServerState>) -> Router {
    Router::new()
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(SLACK_EVENTS_ENDPOINT, post(handle_slack_events))
        .with_state(state)
}

async fn handle_health(State(state): State<Arc<EventsServerState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "tracked_threads": state.workflow.store().len(),
            "processed_events": state.processed_event_count(),
        })),
    )
        .into_response()
}

async fn handle_slack_events(
    State(state): State<Arc<EventsServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(body) = std::str::from_utf8(&body) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "slack_events_invalid_body",
            "request body is not valid utf-8",
        );
    };

    if let Err(error) = verify_slack_request_signature(
        body,
        header_value(&headers, SLACK_SIGNATURE_HEADER),
        header_value(&headers, SLACK_TIMESTAMP_HEADER),
        &state.signing_secret,
        current_unix_timestamp_ms(),
        state.max_skew_seconds,
    ) {
        tracing::warn!(error = %error, "rejected unsigned or stale slack request");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "slack_events_signature_rejected",
            &error.to_string(),
        );
    }

    let request = match parse_slack_events_request(body) {
        Ok(request) => request,
        Err(error) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "slack_events_invalid_payload",
                &format!("{error:#}"),
            );
        }
    };

    match request {
        SlackEventsRequest::UrlVerification { challenge } => {
            (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
        }
        SlackEventsRequest::Ignored { reason } => {
            tracing::debug!(reason = %reason, "ignored slack event");
            accepted("ignored")
        }
        SlackEventsRequest::ReactionAdded(event) => {
            if !state.mark_event_processed(&event.event_id) {
                tracing::debug!(event_id = %event.event_id, "dropped redelivered slack event");
                return accepted("duplicate");
            }
            let workflow = Arc::clone(&state.workflow);
            tokio::spawn(async move {
                workflow.handle_reaction(&event).await;
            });
            accepted("accepted")
        }
    }
}

fn accepted(status: &str) -> Response {
    (StatusCode::OK, Json(json!({ "ok": true, "status": status }))).into_response()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        })),
    )
        .into_response()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
