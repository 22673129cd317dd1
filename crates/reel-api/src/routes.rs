//! Route table and middleware layers.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use http::{header, HeaderValue, Method};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, stream, upload, videos};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    // Streaming endpoints are wide open so any HLS player can fetch them;
    // the Range header must be allowed for segment seeks.
    let stream_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::RANGE]);

    let stream_routes = Router::new()
        .route("/api/v1/stream/{id}/master.m3u8", get(stream::master_playlist))
        .route(
            "/api/v1/stream/{id}/{resolution}/playlist.m3u8",
            get(stream::variant_playlist),
        )
        .route("/api/v1/stream/{id}/{resolution}/{segment}", get(stream::segment))
        .route("/api/v1/videos/{id}/thumbnail", get(stream::thumbnail))
        .layer(stream_cors);

    let api_cors = match state.config.cors_origin.as_deref() {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(Any),
            Err(_) => {
                tracing::warn!(origin = %origin, "Invalid CORS_ORIGIN, allowing any origin");
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    };

    let api_routes = Router::new()
        .route("/api/v1/videos/upload", post(upload::upload_video))
        .route("/api/v1/videos", get(videos::list_videos))
        .route(
            "/api/v1/videos/{id}",
            get(videos::get_video).delete(videos::delete_video),
        )
        .route("/api/v1/videos/{id}/status", get(videos::get_video_status))
        .route("/api/v1/videos/{id}/retry", post(videos::retry_video))
        .layer(api_cors);

    let max_upload = state.config.max_upload_size_bytes;

    Router::new()
        .route("/health", get(health::health))
        .merge(stream_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(max_upload + 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
