//! HTTP surface: axum router, enveloped responses and the principal headers.

mod bookings;
pub mod dto;
mod error;
pub mod extract;
mod listings;
mod reviews;

pub use dto::ApiResponse;
pub use error::ApiError;
pub use extract::Caller;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::engine::{Engine, EngineError, Operation};
use crate::observability;
use dto::HealthDto;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Every route, with request tracing and an in-flight request cap.
pub fn router(engine: Arc<Engine>, max_in_flight: usize) -> Router {
    let state = AppState { engine };
    Router::new()
        .route("/health", get(health))
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/my-bookings", get(bookings::my_bookings))
        .route("/bookings/host/bookings", get(bookings::host_bookings))
        .route(
            "/bookings/{id}",
            get(bookings::get_booking).delete(bookings::delete_booking),
        )
        .route("/bookings/{id}/cancel", patch(bookings::cancel_booking))
        .route("/bookings/{id}/status", patch(bookings::update_status))
        .route("/listings", post(listings::create_listing))
        .route(
            "/listings/{id}",
            get(listings::get_listing).delete(listings::delete_listing),
        )
        .route("/listings/{id}/availability", get(listings::availability))
        .route("/listings/{id}/calendar", get(listings::calendar))
        .route("/reviews", post(reviews::post_review))
        .route("/reviews/my-reviews", get(reviews::my_reviews))
        .route("/reviews/listing/{id}", get(reviews::listing_reviews))
        .route(
            "/reviews/{id}",
            put(reviews::edit_review).delete(reviews::delete_review),
        )
        .route("/reviews/{id}/respond", post(reviews::respond))
        .route("/reviews/{id}/flag", post(reviews::flag))
        .fallback(not_found)
        .layer(ConcurrencyLimitLayer::new(max_in_flight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(HealthDto {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        listings: state.engine.listing_count(),
    }))
}

async fn not_found() -> ApiError {
    ApiError::new(axum::http::StatusCode::NOT_FOUND, "no such route")
}

/// Run a handler body and record its outcome against `op`.
async fn timed<T, F>(op: Operation, fut: F) -> Response
where
    T: IntoResponse,
    F: Future<Output = Result<T, ApiError>>,
{
    let start = Instant::now();
    let response = fut.await.into_response();
    observability::record_request(op, response.status().as_u16(), start.elapsed());
    response
}

/// Run an engine mutation on its own task. A dropped client connection
/// cancels the handler, not the commit.
async fn detached<T, F>(fut: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            tracing::error!("engine task failed: {e}");
            Err(ApiError::internal())
        }
    }
}
