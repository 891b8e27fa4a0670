//! ==============================================================================
//! server.rs - local dashboard and json api
//! ==============================================================================
//!
//! routes:
//!     GET  /                  sensor cards (html)
//!     GET  /api/sensors       connection flag + latest reading per sensor
//!     GET  /api/history/:id   rolling history for one sensor
//!     GET  /api/snapshot      ai snapshot (never zero-like)
//!     POST /api/chat          {"text": ".."} -> assistant reply
//!     POST /api/chat/reset    clear the conversation
//!     POST /api/embed         {"text": ".."} -> embedding values
//!     POST /api/publish       {"topic": "..", "payload": ".."}
//!
//! relationships:
//!     - reads: hub.rs
//!     - uses: transport.rs (publish), assistant (chat)
//!
//! ==============================================================================

use crate::assistant::{build_sensors_context, ChatMessage, ChatSession};
use crate::domain::{AiSnapshot, HistoryEntry, SensorId, SensorValue};
use crate::error::AssistantError;
use crate::hub::SensorHub;
use crate::transport::TransportHandle;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;

/// slot the supervisor fills with the live connection's handle
pub type TransportSlot = Arc<RwLock<Option<TransportHandle>>>;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SensorHub>,
    pub transport: TransportSlot,
    /// absent when the assistant is disabled
    pub chat: Option<Arc<Mutex<ChatSession>>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/sensors", get(sensors_handler))
        .route("/api/history/:id", get(history_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/reset", post(chat_reset_handler))
        .route("/api/embed", post(embed_handler))
        .route("/api/publish", post(publish_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(
    bind: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn is_connected(slot: &TransportSlot) -> bool {
    slot.read().await.as_ref().map(|t| t.is_connected()).unwrap_or(false)
}

// ==============================================================================
// read views
// ==============================================================================

#[derive(Debug, Serialize)]
pub struct SensorView {
    pub id: SensorId,
    pub label: &'static str,
    pub unit: &'static str,
    pub value: Option<SensorValue>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SensorsResponse {
    pub connected: bool,
    pub sensors: Vec<SensorView>,
}

pub async fn sensors_handler(State(state): State<AppState>) -> Json<SensorsResponse> {
    let latest = state.hub.latest_map().await;
    let sensors = SensorId::ALL
        .iter()
        .map(|&id| {
            let meta = id.meta();
            let reading = latest.get(&id);
            SensorView {
                id,
                label: meta.label,
                unit: meta.unit,
                value: reading.map(|r| r.value.clone()),
                updated_at: reading.map(|r| r.updated_at),
            }
        })
        .collect();

    Json(SensorsResponse {
        connected: is_connected(&state.transport).await,
        sensors,
    })
}

pub async fn history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, (StatusCode, Json<Value>)> {
    let id: SensorId = id.parse().map_err(|e: crate::domain::UnknownSensor| {
        (StatusCode::NOT_FOUND, Json(json!({"status": "error", "message": e.to_string()})))
    })?;
    Ok(Json(state.hub.history(id).await))
}

pub async fn snapshot_handler(State(state): State<AppState>) -> Json<AiSnapshot> {
    Json(state.hub.ai_snapshot().await)
}

// ==============================================================================
// actions
// ==============================================================================

#[derive(Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: Option<String>,
    pub messages: Vec<ChatMessage>,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<Value>)> {
    let chat = assistant(&state)?;

    let context = build_sensors_context(&state.hub.ai_snapshot().await);
    let context = Some(context).filter(|c| !c.is_empty());

    let mut session = chat.lock().await;
    match session.send(&req.text, context).await {
        Ok(reply) => Ok(Json(ChatResponse {
            reply,
            messages: session.messages().to_vec(),
        })),
        Err(e) => {
            let message = session.last_error().map(str::to_string).unwrap_or_else(|| e.to_string());
            Err((StatusCode::BAD_GATEWAY, Json(json!({"status": "error", "message": message}))))
        }
    }
}

fn assistant(state: &AppState) -> Result<&Arc<Mutex<ChatSession>>, (StatusCode, Json<Value>)> {
    state.chat.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "message": AssistantError::Disabled.to_string()})),
        )
    })
}

#[derive(Deserialize)]
pub struct EmbedRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct EmbedResponse {
    pub values: Vec<f32>,
}

pub async fn embed_handler(
    State(state): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, (StatusCode, Json<Value>)> {
    let chat = assistant(&state)?;
    let session = chat.lock().await;
    match session.embed(&req.text).await {
        Ok(values) => Ok(Json(EmbedResponse { values })),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({"status": "error", "message": e.to_string()})),
        )),
    }
}

pub async fn chat_reset_handler(State(state): State<AppState>) -> Json<Value> {
    if let Some(chat) = state.chat.as_ref() {
        chat.lock().await.reset();
    }
    Json(json!({"status": "ok"}))
}

#[derive(Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: String,
}

/// the handle drops the message itself while disconnected; the status only
/// reports which case applied
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Json<Value> {
    let slot = state.transport.read().await;
    let Some(transport) = slot.as_ref() else {
        return Json(json!({"status": "skipped", "message": "not connected"}));
    };
    let connected = transport.is_connected();
    transport.publish(&req.topic, req.payload).await;
    if connected {
        Json(json!({"status": "ok"}))
    } else {
        Json(json!({"status": "skipped", "message": "not connected"}))
    }
}

// ==============================================================================
// dashboard
// ==============================================================================

pub async fn dashboard_handler(State(state): State<AppState>) -> Html<String> {
    let latest = state.hub.latest_map().await;
    let connected = is_connected(&state.transport).await;

    let cards: String = SensorId::ALL
        .iter()
        .map(|id| {
            let meta = id.meta();
            let (value, updated) = match latest.get(id) {
                Some(r) => (r.value.to_string(), format_age(r.updated_at)),
                None => ("0".to_string(), "--".to_string()),
            };
            format!(
                r#"<div class="card"><h3>{}</h3><p class="value">{} <span>{}</span></p><p class="updated">Atualizado: {}</p></div>"#,
                html_escape(meta.label),
                html_escape(&value),
                html_escape(meta.unit),
                html_escape(&updated),
            )
        })
        .collect();

    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><meta http-equiv="refresh" content="5"><title>Sensores</title>
<style>
body {{ font-family: system-ui; padding: 1.5rem; background: #F7FAFF; color: #1a1a2e; }}
.grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(220px, 1fr)); gap: 1rem; }}
.card {{ background: #fff; border-radius: 12px; padding: 1rem; box-shadow: 0 1px 4px #0002; }}
.value {{ font-size: 28px; font-weight: 700; margin: .25rem 0; }}
.value span {{ font-size: 14px; font-weight: 400; color: #667; }}
.updated {{ color: #889; font-size: 12px; }}
</style></head>
<body>
<h1>Sensores</h1>
<p>Broker: {}</p>
<div class="grid">{}</div>
</body>
</html>"#,
        if connected { "conectado" } else { "desconectado" },
        cards
    ))
}

fn format_age(updated_at: u64) -> String {
    let secs = crate::domain::now_ms().saturating_sub(updated_at) / 1000;
    match secs {
        0..=59 => format!("há {}s", secs),
        60..=3599 => format!("há {}min", secs / 60),
        _ => format!("há {}h", secs / 3600),
    }
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
