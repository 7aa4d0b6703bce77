use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use ulid::Ulid;

use super::dto::{ApiResponse, AvailabilityDto, CalendarDto, CreateListingRequest, RangeQuery};
use super::{ApiError, AppState, Caller, detached, timed};
use crate::engine::{NewListing, Operation};

pub async fn create_listing(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateListingRequest>, JsonRejection>,
) -> Response {
    timed(Operation::CreateListing, async move {
        let principal = caller.authorize(Operation::CreateListing)?;
        let Json(req) = body?;
        let new = NewListing {
            title: req.title,
            price_per_night: req.price_per_night,
            max_guests: req.max_guests,
        };
        let engine = state.engine.clone();
        let listing = detached(async move { engine.create_listing(&principal, new).await }).await?;
        Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(listing))))
    })
    .await
}

pub async fn get_listing(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::ViewListing, async move {
        caller.authorize(Operation::ViewListing)?;
        let Path(id) = id?;
        let listing = state.engine.get_listing(id).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(listing)))
    })
    .await
}

pub async fn delete_listing(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::DeleteListing, async move {
        let principal = caller.authorize(Operation::DeleteListing)?;
        let Path(id) = id?;
        let engine = state.engine.clone();
        detached(async move { engine.delete_listing(&principal, id).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
    })
    .await
}

/// Advisory check; never reserves.
pub async fn availability(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> Response {
    timed(Operation::CheckAvailability, async move {
        caller.authorize(Operation::CheckAvailability)?;
        let Path(listing_id) = id?;
        let Query(q) = query?;
        let available = state.engine.check_availability(listing_id, q.range()).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(AvailabilityDto {
            listing_id,
            start: q.start,
            end: q.end,
            available,
        })))
    })
    .await
}

pub async fn calendar(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> Response {
    timed(Operation::ViewCalendar, async move {
        caller.authorize(Operation::ViewCalendar)?;
        let Path(listing_id) = id?;
        let Query(q) = query?;
        let window = q.range();
        let free = state.engine.free_ranges(listing_id, window).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(CalendarDto {
            listing_id,
            window,
            free,
        })))
    })
    .await
}
