use crate::cache::EventProvider;
use crate::delivery::{collect_events, event_frames, Frame};
use crate::observability::metrics;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn EventProvider>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "oslo-events",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn to_sse_event(frame: &Frame) -> SseEvent {
    let event = SseEvent::default().data(frame.data());
    match frame.event_name() {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Streams the event set as it is delivered: one message per batch,
/// `[]` when nothing came back, then a named `end` event.
async fn events_stream(
    State(state): State<AppState>,
) -> (
    [(header::HeaderName, &'static str); 1],
    Sse<impl Stream<Item = Result<SseEvent, Infallible>>>,
) {
    let stream = event_frames(state.provider.clone()).map(|frame| Ok(to_sse_event(&frame)));
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

/// Whole event set as one JSON array
async fn events_json(State(state): State<AppState>) -> impl IntoResponse {
    let (events, delivery) = collect_events(state.provider.as_ref()).await;
    info!(origin = %delivery.origin, "Served {} events as JSON", events.len());
    Json(events)
}

async fn cache_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.provider.status().await)
}

async fn metrics_endpoint() -> impl IntoResponse {
    match metrics::render() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Create the HTTP router with all routes
pub fn create_server(provider: Arc<dyn EventProvider>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/events", get(events_stream))
        .route("/api/events.json", get(events_json))
        .route("/api/status", get(cache_status))
        .route("/metrics", get(metrics_endpoint))
        .with_state(AppState { provider })
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the given address
pub async fn start_server(provider: Arc<dyn EventProvider>, bind: &str) -> anyhow::Result<()> {
    let app = create_server(provider);
    let listener = TcpListener::bind(bind).await?;

    info!("HTTP server running on http://{}", listener.local_addr()?);
    info!("Event stream: /api/events, JSON: /api/events.json, health: /health");

    axum::serve(listener, app).await?;
    Ok(())
}
