use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use ulid::Ulid;

use super::dto::{ApiResponse, CreateBookingRequest, UpdateStatusRequest};
use super::{ApiError, AppState, Caller, detached, timed};
use crate::engine::Operation;

pub async fn create_booking(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Response {
    timed(Operation::CreateBooking, async move {
        let principal = caller.authorize(Operation::CreateBooking)?;
        let Json(req) = body?;
        let range = req.range();
        let engine = state.engine.clone();
        let booking = detached(async move {
            engine
                .create_booking(&principal, req.listing_id, range, req.guest_count)
                .await
        })
        .await?;
        Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(booking))))
    })
    .await
}

pub async fn my_bookings(State(state): State<AppState>, caller: Caller) -> Response {
    timed(Operation::ListOwnBookings, async move {
        let principal = caller.authorize(Operation::ListOwnBookings)?;
        let bookings = state.engine.guest_bookings(&principal).await;
        Ok::<_, ApiError>(Json(ApiResponse::success(bookings)))
    })
    .await
}

pub async fn host_bookings(State(state): State<AppState>, caller: Caller) -> Response {
    timed(Operation::ListHostBookings, async move {
        let principal = caller.authorize(Operation::ListHostBookings)?;
        let bookings = state.engine.host_bookings(&principal).await;
        Ok::<_, ApiError>(Json(ApiResponse::success(bookings)))
    })
    .await
}

pub async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::ViewBooking, async move {
        let principal = caller.authorize(Operation::ViewBooking)?;
        let Path(id) = id?;
        let booking = state.engine.get_booking(&principal, id).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(booking)))
    })
    .await
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::CancelBooking, async move {
        let principal = caller.authorize(Operation::CancelBooking)?;
        let Path(id) = id?;
        let engine = state.engine.clone();
        let booking = detached(async move { engine.cancel_booking(&principal, id).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(booking)))
    })
    .await
}

pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Response {
    timed(Operation::UpdateBookingStatus, async move {
        let principal = caller.authorize(Operation::UpdateBookingStatus)?;
        let Path(id) = id?;
        let Json(req) = body?;
        let engine = state.engine.clone();
        let booking = detached(async move {
            engine
                .update_status(&principal, id, req.status, req.notes)
                .await
        })
        .await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(booking)))
    })
    .await
}

pub async fn delete_booking(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::DeleteBooking, async move {
        let principal = caller.authorize(Operation::DeleteBooking)?;
        let Path(id) = id?;
        let engine = state.engine.clone();
        detached(async move { engine.delete_booking(&principal, id).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
    })
    .await
}
