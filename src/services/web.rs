//! Axum-based HTTP server for the fan controller.
//!
//! Provides:
//! - GET `/fan?state=on|off&speed=N&default_on=B` - Control, answers with status JSON
//! - GET `/status` - Current status JSON
//! - GET `/config` - Settings as form fields
//! - POST `/config` - Apply form-encoded settings
//! - GET `/` - Control page
//!
//! Anything else is a plain-text 404 `Not found`.
//!
//! Handlers run the app on tokio's blocking pool: a state publish may
//! reconnect MQTT inline, which blocks for up to the connect timeout.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app::{FanQuery, StatusResponse, INDEX_HTML};
use crate::config::ConfigFields;
use crate::traits::{KeyValueStore, MqttClient, PwmOutput};

use super::shared::SharedFanState;

/// Bounds every handler needs on the app's collaborators.
pub trait ServiceBounds: Send + 'static {}
impl<T: Send + 'static> ServiceBounds for T {}

type SharedState<P, M, S> = Arc<SharedFanState<P, M, S>>;

/// Body of `POST /config`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ConfigUpdateResponse {
    /// Whether any setting differed from before.
    pub changed: bool,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /fan - Apply query parameters
async fn fan<P, M, S>(
    State(state): State<SharedState<P, M, S>>,
    Query(query): Query<FanQuery>,
) -> Response
where
    P: PwmOutput + ServiceBounds,
    M: MqttClient + ServiceBounds,
    S: KeyValueStore + ServiceBounds,
{
    let result = tokio::task::spawn_blocking(move || {
        let now_ms = state.now_ms();
        state.with_app(|app| app.handle_query(&query, now_ms).ok())
    })
    .await;

    match result {
        Ok(Some(status)) => Json(status).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "PWM output error").into_response(),
    }
}

/// GET /status - Current status
async fn status<P, M, S>(State(state): State<SharedState<P, M, S>>) -> Json<StatusResponse>
where
    P: PwmOutput + ServiceBounds,
    M: MqttClient + ServiceBounds,
    S: KeyValueStore + ServiceBounds,
{
    Json(state.status())
}

/// GET /config - Settings as form fields
async fn get_config<P, M, S>(State(state): State<SharedState<P, M, S>>) -> Json<ConfigFields>
where
    P: PwmOutput + ServiceBounds,
    M: MqttClient + ServiceBounds,
    S: KeyValueStore + ServiceBounds,
{
    Json(state.with_app(|app| app.config().fields()))
}

/// POST /config - Apply settings
///
/// On change the MQTT session goes offline; the next tick reconnects with
/// the new settings.
async fn post_config<P, M, S>(
    State(state): State<SharedState<P, M, S>>,
    Form(fields): Form<ConfigFields>,
) -> Response
where
    P: PwmOutput + ServiceBounds,
    M: MqttClient + ServiceBounds,
    S: KeyValueStore + ServiceBounds,
{
    let result = tokio::task::spawn_blocking(move || {
        let now_ms = state.now_ms();
        state.with_app(|app| {
            let changed = app.apply_portal_fields(&fields);
            if changed {
                app.go_offline(now_ms);
            }
            changed
        })
    })
    .await;

    match result {
        Ok(changed) => Json(ConfigUpdateResponse { changed }).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Settings update failed").into_response(),
    }
}

/// GET / - Serve the control page
async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cors_permissive: true,
        }
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }
}

/// Build the Axum router with all routes
pub fn build_router<P, M, S>(state: SharedState<P, M, S>, config: &WebServerConfig) -> Router
where
    P: PwmOutput + ServiceBounds,
    M: MqttClient + ServiceBounds,
    S: KeyValueStore + ServiceBounds,
{
    let mut router = Router::new()
        .route("/fan", get(fan::<P, M, S>))
        .route("/status", get(status::<P, M, S>))
        .route("/config", get(get_config::<P, M, S>).post(post_config::<P, M, S>))
        .route("/", get(index))
        .fallback(not_found)
        .with_state(state);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Start the web server with shared state
///
/// Blocks until the server is shut down. The control loop keeps its own
/// handle to the same state.
///
/// # Example
///
/// ```ignore
/// let state = Arc::new(SharedFanState::new(app));
/// run_server_with_state(state, WebServerConfig::default()).await?;
/// ```
pub async fn run_server_with_state<P, M, S>(
    state: SharedState<P, M, S>,
    config: WebServerConfig,
) -> Result<(), std::io::Error>
where
    P: PwmOutput + ServiceBounds,
    M: MqttClient + ServiceBounds,
    S: KeyValueStore + ServiceBounds,
{
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    log::info!("Web server listening on http://{}", config.addr);

    axum::serve(listener, router).await
}
