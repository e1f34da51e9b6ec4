//! REST front end.
//!
//! `GET /train` runs the full pipeline in-process on its own task, so a
//! client that disconnects does not cancel the run. One run at a time; a
//! concurrent request gets `409 Conflict`. `POST /predict` summarizes the
//! request body, or the `text` query parameter when the body is empty.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use summaflow::app::SummaflowApp;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const DOCS: &str = "\
summaflow REST API

GET  /          redirect to /docs
GET  /docs      this listing
GET  /train     run the full training pipeline
POST /predict   summarize the request body (or ?text=...)
";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    app: SummaflowApp,
    run_guard: Arc<Mutex<()>>,
}

impl AppState {
    /// Wraps an app for serving.
    pub fn new(app: SummaflowApp) -> Self {
        Self {
            app,
            run_guard: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictQuery {
    text: Option<String>,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/docs") }))
        .route("/docs", get(|| async { DOCS }))
        .route("/train", get(train))
        .route("/predict", post(predict))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn train(State(state): State<AppState>) -> Response {
    let Ok(guard) = state.run_guard.clone().try_lock_owned() else {
        warn!("training requested while a run is in progress");
        return (StatusCode::CONFLICT, "Training already in progress").into_response();
    };

    // The run owns the guard and outlives the request if the client hangs up.
    let app = state.app.clone();
    let run = tokio::spawn(async move {
        let _guard = guard;
        app.train().await
    });

    match run.await {
        Ok(Ok(result)) => {
            info!(run_id = %result.run_id, "training finished");
            (StatusCode::OK, "Training successful !!").into_response()
        }
        Ok(Err(e)) => train_error(&e),
        Err(e) => train_error(&e),
    }
}

fn train_error(e: &dyn std::fmt::Display) -> Response {
    error!(error = %e, "training failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Error Occurred! {e}"),
    )
        .into_response()
}

async fn predict(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
    body: String,
) -> Response {
    let text = if body.trim().is_empty() {
        query.text.unwrap_or_default()
    } else {
        body
    };
    if text.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "No text to summarize").into_response();
    }

    match state.app.predict(&text).await {
        Ok(summary) => (StatusCode::OK, summary).into_response(),
        Err(e) => {
            error!(error = %e, "prediction failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serves the API until the process is stopped.
pub async fn serve(app: SummaflowApp, address: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %address, "summaflow server listening");
    axum::serve(listener, router(AppState::new(app))).await?;
    Ok(())
}
