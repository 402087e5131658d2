//! HTTP surface: one streaming crawl endpoint
//!
//! `POST /crawl` takes a JSON crawl request and answers with newline-
//! delimited JSON: one progress frame per crawl wave, then a terminal
//! frame. The crawl runs on its own task; dropping the connection drops
//! the channel, which the orchestrator observes as cancellation.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::crawler::{run_crawl, CrawlRequest, ProgressFrame};
use crate::renderer::Renderer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub renderer: Arc<dyn Renderer>,
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/crawl", post(crawl))
        .with_state(state)
}

/// Binds and serves the API until the process is stopped
pub async fn serve(state: AppState, bind_address: &str) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("Listening on {}", bind_address);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn crawl(State(state): State<AppState>, Json(request): Json<CrawlRequest>) -> Response {
    if request.url.trim().is_empty() {
        let frame = serde_json::json!({ "error": "URL is required" });
        return ndjson_response(Body::from(format!("{}\n", frame)));
    }

    let (tx, rx) = mpsc::channel::<ProgressFrame>(32);
    tokio::spawn(run_crawl(
        Arc::clone(&state.config),
        Arc::clone(&state.renderer),
        request,
        tx,
    ));

    let lines = ReceiverStream::new(rx).map(|frame| Ok::<_, Infallible>(ndjson_line(&frame)));
    ndjson_response(Body::from_stream(lines))
}

fn ndjson_line(frame: &ProgressFrame) -> String {
    match serde_json::to_string(frame) {
        Ok(mut line) => {
            line.push('\n');
            line
        }
        Err(e) => {
            tracing::error!("Failed to serialize progress frame: {}", e);
            "{\"error\": \"Internal serialization failure\"}\n".to_string()
        }
    }
}

fn ndjson_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response()
}
