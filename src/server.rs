//! HTTP surface: `/api/buses` plus the map page and its static assets.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::json;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::error;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::fetch::{HttpClient, fetch_feed};
use crate::pipeline::{BusStatus, active_buses};
use crate::reference::{ReferenceStore, ReferenceTables};

/// Where a request gets its reference tables from.
#[derive(Debug, Clone)]
pub enum ReferenceSource {
    /// Tables loaded at startup and possibly swapped by a background reloader.
    Cached(ReferenceStore),
    /// Tables read from disk inside each request.
    PerRequest,
}

pub struct AppState<C> {
    pub client: C,
    pub config: TrackerConfig,
    pub references: ReferenceSource,
}

/// Loads references, fetches the feed and returns the active buses.
///
/// When references are loaded per request the load and the fetch run
/// concurrently; either failing fails the whole call.
#[tracing::instrument(skip_all, fields(route_id = %config.route.route_id))]
pub async fn track_buses<C: HttpClient + ?Sized>(
    client: &C,
    config: &TrackerConfig,
    references: &ReferenceSource,
) -> Result<Vec<BusStatus>, TrackerError> {
    let (tables, feed) = match references {
        ReferenceSource::Cached(store) => {
            let feed = fetch_feed(client, &config.feed_url).await?;
            (store.snapshot(), feed)
        }
        ReferenceSource::PerRequest => {
            let load = ReferenceTables::load_async(
                config.references.clone(),
                config.route.route_id.clone(),
            );
            let fetch = async {
                fetch_feed(client, &config.feed_url)
                    .await
                    .map_err(TrackerError::from)
            };
            let (tables, feed) = tokio::try_join!(load, fetch)?;
            (Arc::new(tables), feed)
        }
    };

    Ok(active_buses(&feed, &tables, &config.route, Utc::now()))
}

/// Every failure is reported the same way: a 500 with a `detail` message.
#[derive(Debug)]
pub struct ApiError(pub TrackerError);

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        Self(e)
    }
}

fn error_response(message: impl std::fmt::Display) -> Response {
    let body = json!({ "detail": format!("An error occurred: {message}") });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(&self.0)
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected panic".to_string()
    };
    error!(panic = %message, "Request handler panicked");
    error_response(message)
}

async fn list_buses<C: HttpClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<Vec<BusStatus>>, ApiError> {
    let buses = track_buses(&state.client, &state.config, &state.references)
        .await
        .inspect_err(|e| {
            error!(error = %e, feed_outage = e.is_feed_outage(), "Bus lookup failed")
        })?;
    Ok(Json(buses))
}

/// The JSON API on its own.
pub fn api_router<C: HttpClient + 'static>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/api/buses", get(list_buses::<C>))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// The API plus the landing page, `/static`, CORS and request tracing.
pub fn app<C: HttpClient + 'static>(
    state: Arc<AppState<C>>,
    index_file: &Path,
    static_dir: &Path,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    api_router(state)
        .route_service("/", ServeFile::new(index_file))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
