use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use ulid::Ulid;

use super::dto::{ApiResponse, EditReviewRequest, ListingReviewsDto, PostReviewRequest, RespondRequest};
use super::{ApiError, AppState, Caller, detached, timed};
use crate::engine::Operation;

pub async fn post_review(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<PostReviewRequest>, JsonRejection>,
) -> Response {
    timed(Operation::PostReview, async move {
        let principal = caller.authorize(Operation::PostReview)?;
        let Json(req) = body?;
        let (booking_id, draft) = req.draft();
        let engine = state.engine.clone();
        let review = detached(async move { engine.post_review(&principal, booking_id, draft).await }).await?;
        Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(review))))
    })
    .await
}

pub async fn listing_reviews(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::ListListingReviews, async move {
        caller.authorize(Operation::ListListingReviews)?;
        let Path(listing_id) = id?;
        let (reviews, average_rating) = state.engine.listing_reviews(listing_id).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(ListingReviewsDto {
            listing_id,
            count: reviews.len(),
            average_rating,
            reviews,
        })))
    })
    .await
}

pub async fn my_reviews(State(state): State<AppState>, caller: Caller) -> Response {
    timed(Operation::ListOwnReviews, async move {
        let principal = caller.authorize(Operation::ListOwnReviews)?;
        let reviews = state.engine.guest_reviews(&principal).await;
        Ok::<_, ApiError>(Json(ApiResponse::success(reviews)))
    })
    .await
}

pub async fn edit_review(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<EditReviewRequest>, JsonRejection>,
) -> Response {
    timed(Operation::EditReview, async move {
        let principal = caller.authorize(Operation::EditReview)?;
        let Path(id) = id?;
        let Json(req) = body?;
        let engine = state.engine.clone();
        let review = detached(async move { engine.edit_review(&principal, id, req.into()).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(review)))
    })
    .await
}

pub async fn delete_review(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::DeleteReview, async move {
        let principal = caller.authorize(Operation::DeleteReview)?;
        let Path(id) = id?;
        let engine = state.engine.clone();
        detached(async move { engine.delete_review(&principal, id).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
    })
    .await
}

pub async fn respond(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Response {
    timed(Operation::RespondToReview, async move {
        let principal = caller.authorize(Operation::RespondToReview)?;
        let Path(id) = id?;
        let Json(req) = body?;
        let engine = state.engine.clone();
        let review = detached(async move { engine.respond_to_review(&principal, id, req.response).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(review)))
    })
    .await
}

pub async fn flag(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Ulid>, PathRejection>,
) -> Response {
    timed(Operation::FlagReview, async move {
        let principal = caller.authorize(Operation::FlagReview)?;
        let Path(id) = id?;
        let engine = state.engine.clone();
        let review = detached(async move { engine.flag_review(&principal, id).await }).await?;
        Ok::<_, ApiError>(Json(ApiResponse::success(review)))
    })
    .await
}
