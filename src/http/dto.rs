//! Request and response bodies.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::ReviewDraft;
use crate::model::{BookingStatus, DateRange, Review};

/// Uniform response envelope.
///
/// Success: `{"success": true, "data": {...}}`,
/// failure: `{"success": false, "message": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub listing_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub guest_count: u32,
}

impl CreateBookingRequest {
    /// Ordering is checked by the engine, not here.
    pub fn range(&self) -> DateRange {
        DateRange::unchecked(self.start_date, self.end_date)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
    #[serde(default, alias = "hostNotes")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    pub title: String,
    pub price_per_night: u64,
    pub max_guests: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReviewRequest {
    pub booking_id: Ulid,
    pub rating: u8,
    pub comment: String,
}

impl PostReviewRequest {
    pub fn draft(self) -> (Ulid, ReviewDraft) {
        (
            self.booking_id,
            ReviewDraft {
                rating: self.rating,
                comment: self.comment,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct EditReviewRequest {
    pub rating: u8,
    pub comment: String,
}

impl From<EditReviewRequest> for ReviewDraft {
    fn from(req: EditReviewRequest) -> Self {
        ReviewDraft {
            rating: req.rating,
            comment: req.comment,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: String,
}

/// `?start=YYYY-MM-DD&end=YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RangeQuery {
    pub fn range(&self) -> DateRange {
        DateRange::unchecked(self.start, self.end)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDto {
    pub listing_id: Ulid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDto {
    pub listing_id: Ulid,
    pub window: DateRange,
    pub free: Vec<DateRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingReviewsDto {
    pub listing_id: Ulid,
    pub count: usize,
    pub average_rating: Option<f64>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub version: &'static str,
    pub listings: usize,
}
