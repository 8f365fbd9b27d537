// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The chart endpoints expose the view
// the session maintains; the selection endpoint is the only way to change
// what is being loaded.
//
// CORS is configured permissively; the feed is read-mostly and carries no
// credentials.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::live::{Epoch, Selection, SelectionChange};
use crate::types::{IndicatorSet, Timeframe};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        // ── Chart ───────────────────────────────────────────────────
        .route("/api/v1/chart", get(chart))
        .route("/api/v1/chart/retry", post(chart_retry))
        .route("/api/v1/selection", get(get_selection).post(set_selection))
        // ── Instruments ─────────────────────────────────────────────
        .route("/api/v1/instruments", get(instruments))
        .route("/api/v1/instruments/reload", post(instruments_reload))
        .route("/api/v1/instruments/more", post(instruments_more))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Chart
// =============================================================================

async fn chart(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.session.view().snapshot())
}

#[derive(Serialize)]
struct SelectionResponse {
    epoch: Epoch,
    selection: Option<Selection>,
}

async fn chart_retry(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let epoch = state
        .session
        .retry()
        .ok_or_else(|| api_error(StatusCode::CONFLICT, "No selection to retry"))?;

    info!(epoch = %epoch, "chart retry requested via API");
    Ok(Json(SelectionResponse {
        epoch,
        selection: state.session.view().selection(),
    }))
}

async fn get_selection(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SelectionResponse {
        epoch: state.session.view().current_epoch(),
        selection: state.session.view().selection(),
    })
}

/// Partial selection update as sent by clients. Timeframes travel as a day
/// count and are validated here.
#[derive(Debug, Default, Deserialize)]
pub struct SelectionRequest {
    pub instrument_id: Option<String>,
    pub timeframe_days: Option<u32>,
    pub indicators: Option<IndicatorSet>,
    pub live_enabled: Option<bool>,
}

/// Provider ids are lowercase slugs (`bitcoin`, `avalanche-2`).
fn is_valid_instrument_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 100
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl SelectionRequest {
    pub fn validate(&self) -> Result<SelectionChange, String> {
        if let Some(id) = &self.instrument_id {
            if !is_valid_instrument_id(id) {
                return Err(format!("Invalid instrument id: '{id}'"));
            }
        }
        let timeframe = self.timeframe_days.map(Timeframe::try_from).transpose()?;

        Ok(SelectionChange {
            instrument_id: self.instrument_id.clone(),
            timeframe,
            indicators: self.indicators,
            live_enabled: self.live_enabled,
        })
    }
}

async fn set_selection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let change = req.validate().map_err(|e| {
        warn!(error = %e, "rejected selection change");
        api_error(StatusCode::BAD_REQUEST, e)
    })?;

    let epoch = match state.session.apply_change(&change) {
        Some(epoch) => epoch,
        None => {
            // Nothing selected yet: start from the configured defaults.
            let selection = change.merge(&state.default_selection());
            state.session.select(selection)
        }
    };
    state.persist_selection();

    info!(epoch = %epoch, change = ?change, "selection changed via API");
    Ok(Json(SelectionResponse {
        epoch,
        selection: state.session.view().selection(),
    }))
}

// =============================================================================
// Instruments
// =============================================================================

async fn instruments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.instruments.read().clone())
}

#[derive(Serialize)]
struct InstrumentsUpdated {
    added: usize,
    total: usize,
}

async fn instruments_reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let added = state.reload_instruments().await;
    let total = state.instruments.read().instruments.len();
    Json(InstrumentsUpdated { added, total })
}

async fn instruments_more(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let added = state.load_more_instruments().await;
    let total = state.instruments.read().instruments.len();
    Json(InstrumentsUpdated { added, total })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::testing::{rising_candles, summary, ScriptedApi};
    use crate::runtime_config::RuntimeConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_state(api: Arc<ScriptedApi>) -> Arc<AppState> {
        let mut config = RuntimeConfig::default();
        config.default_live_enabled = false;
        config.retry.max_attempts = 1;
        Arc::new(AppState::new(config, api))
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn instrument_id_validation() {
        assert!(is_valid_instrument_id("bitcoin"));
        assert!(is_valid_instrument_id("avalanche-2"));
        assert!(!is_valid_instrument_id(""));
        assert!(!is_valid_instrument_id("../etc"));
        assert!(!is_valid_instrument_id("Bitcoin"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let state = app_state(Arc::new(ScriptedApi::default()));
        let (status, json) = send(&state, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn unsupported_timeframe_is_bad_request() {
        let state = app_state(Arc::new(ScriptedApi::default()));
        let (status, json) = send(
            &state,
            post_json("/api/v1/selection", serde_json::json!({ "timeframe_days": 14 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("14"));
    }

    #[tokio::test]
    async fn invalid_instrument_is_bad_request() {
        let state = app_state(Arc::new(ScriptedApi::default()));
        let (status, _) = send(
            &state,
            post_json("/api/v1/selection", serde_json::json!({ "instrument_id": "../x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn retry_without_selection_conflicts() {
        let state = app_state(Arc::new(ScriptedApi::default()));
        let (status, _) = send(&state, post_json("/api/v1/chart/retry", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_drives_chart() {
        let api = Arc::new(ScriptedApi::default());
        api.push_ohlc(Ok(rising_candles(30, 100.0)));
        api.set_steady_summary(summary("ethereum", 3_000.0));
        let state = app_state(api);

        let (status, json) = send(
            &state,
            post_json(
                "/api/v1/selection",
                serde_json::json!({
                    "instrument_id": "ethereum",
                    "timeframe_days": 7,
                    "indicators": ["ema", "sma"]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["selection"]["instrument_id"], "ethereum");
        assert_eq!(json["selection"]["timeframe"], 7);
        assert_eq!(json["selection"]["indicators"], serde_json::json!(["sma", "ema"]));

        tokio::time::sleep(Duration::from_secs(5)).await;

        let (status, json) = send(&state, get("/api/v1/chart")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"]["state"], "ready");
        assert_eq!(json["status"]["origin"], "primary");
        assert_eq!(json["status"]["composite"]["overlays"][0]["name"], "SMA 20");
        assert_eq!(json["summary"]["instrument_id"], "ethereum");

        assert_eq!(state.runtime_config.read().default_instrument, "ethereum");
    }

    #[tokio::test]
    async fn instruments_default_to_builtin_list() {
        let state = app_state(Arc::new(ScriptedApi::default()));
        let (status, json) = send(&state, get("/api/v1/instruments")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "static");
        assert_eq!(json["instruments"].as_array().map(|a| a.len()), Some(10));
    }
}
