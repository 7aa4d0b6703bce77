use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque identifier handed to us by the auth gateway.
pub type UserId = String;

/// Half-open stay interval `[start, end)`. `end` is the checkout day, so the
/// night of `end` is not part of the stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    /// Build a range without the ordering assertion. Request input goes
    /// through here and is checked by `conflict::validate_range`.
    pub fn unchecked(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_night(&self, night: NaiveDate) -> bool {
        self.start <= night && night < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Active bookings hold their date range in the availability index.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: Ulid,
    pub host_id: UserId,
    pub title: String,
    /// Nightly price in minor currency units.
    pub price_per_night: u64,
    pub max_guests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub guest_id: UserId,
    pub host_id: UserId,
    pub date_range: DateRange,
    pub guest_count: u32,
    pub total_price: u64,
    pub status: BookingStatus,
    pub host_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A guest's verdict on a completed stay. One per booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub listing_id: Ulid,
    pub guest_id: UserId,
    pub host_id: UserId,
    /// 1 to 5 stars.
    pub rating: u8,
    pub comment: String,
    pub host_response: Option<String>,
    /// Reported by another user for moderation.
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Active reservation held by a booking in the per-listing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub booking_id: Ulid,
    pub range: DateRange,
}

/// Everything the engine knows about one listing. Guarded by the listing's lock.
#[derive(Debug, Clone)]
pub struct ListingState {
    pub listing: Listing,
    /// Active reservations, sorted by `range.start`. Never overlapping.
    pub reservations: Vec<Reservation>,
    /// Every booking ever made on the listing, in any status.
    pub bookings: HashMap<Ulid, Booking>,
    pub reviews: HashMap<Ulid, Review>,
}

impl ListingState {
    pub fn new(listing: Listing) -> Self {
        Self {
            listing,
            reservations: Vec::new(),
            bookings: HashMap::new(),
            reviews: HashMap::new(),
        }
    }

    /// Insert reservation keeping sort order by `range.start`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, booking_id: Ulid) -> Option<Reservation> {
        let pos = self
            .reservations
            .iter()
            .position(|r| r.booking_id == booking_id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations overlapping `query`. Binary search skips everything that
    /// starts on or after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end > query.start)
    }

    pub fn active_booking_count(&self) -> usize {
        self.reservations.len()
    }

    pub fn review_for_booking(&self, booking_id: Ulid) -> Option<&Review> {
        self.reviews.values().find(|r| r.booking_id == booking_id)
    }

    /// Mean star rating, `None` before the first review.
    pub fn average_rating(&self) -> Option<f64> {
        if self.reviews.is_empty() {
            return None;
        }
        let total: u32 = self.reviews.values().map(|r| r.rating as u32).sum();
        Some(total as f64 / self.reviews.len() as f64)
    }
}

/// Journal record. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ListingCreated {
        id: Ulid,
        host_id: UserId,
        title: String,
        price_per_night: u64,
        max_guests: u32,
    },
    ListingDeleted {
        id: Ulid,
    },
    BookingRequested {
        id: Ulid,
        listing_id: Ulid,
        guest_id: UserId,
        range: DateRange,
        guest_count: u32,
        total_price: u64,
        created_at: DateTime<Utc>,
    },
    BookingStatusChanged {
        id: Ulid,
        listing_id: Ulid,
        status: BookingStatus,
        host_notes: Option<String>,
    },
    BookingDeleted {
        id: Ulid,
        listing_id: Ulid,
    },
    ReviewPosted {
        id: Ulid,
        booking_id: Ulid,
        listing_id: Ulid,
        rating: u8,
        comment: String,
        created_at: DateTime<Utc>,
    },
    ReviewEdited {
        id: Ulid,
        listing_id: Ulid,
        rating: u8,
        comment: String,
        updated_at: DateTime<Utc>,
    },
    ReviewResponded {
        id: Ulid,
        listing_id: Ulid,
        response: String,
    },
    ReviewFlagged {
        id: Ulid,
        listing_id: Ulid,
    },
    ReviewDeleted {
        id: Ulid,
        listing_id: Ulid,
    },
}

impl Event {
    pub fn listing_id(&self) -> Ulid {
        match self {
            Event::ListingCreated { id, .. } | Event::ListingDeleted { id } => *id,
            Event::BookingRequested { listing_id, .. }
            | Event::BookingStatusChanged { listing_id, .. }
            | Event::BookingDeleted { listing_id, .. }
            | Event::ReviewPosted { listing_id, .. }
            | Event::ReviewEdited { listing_id, .. }
            | Event::ReviewResponded { listing_id, .. }
            | Event::ReviewFlagged { listing_id, .. }
            | Event::ReviewDeleted { listing_id, .. } => *listing_id,
        }
    }
}
