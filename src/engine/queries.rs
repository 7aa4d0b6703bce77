use ulid::Ulid;

use crate::model::*;

use super::access::{self, Operation, Principal};
use super::availability;
use super::conflict::{validate_range, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_listing(&self, id: Ulid) -> Result<Listing, EngineError> {
        let shared = self.get_listing_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = shared.read().await;
        Ok(guard.listing.clone())
    }

    /// Advisory check. Never reserves: only `create_booking` claims dates.
    pub async fn check_availability(&self, listing_id: Ulid, range: DateRange) -> Result<bool, EngineError> {
        validate_range(&range, self.today())?;
        let shared = self
            .get_listing_state(&listing_id)
            .ok_or(EngineError::NotFound(listing_id))?;
        let guard = shared.read().await;
        Ok(availability::is_available(&guard, &range))
    }

    /// Free stretches of `window` on a listing.
    pub async fn free_ranges(&self, listing_id: Ulid, window: DateRange) -> Result<Vec<DateRange>, EngineError> {
        validate_window(&window)?;
        let shared = self
            .get_listing_state(&listing_id)
            .ok_or(EngineError::NotFound(listing_id))?;
        let guard = shared.read().await;
        Ok(availability::free_ranges(&guard, &window))
    }

    /// One booking, visible to its guest, its host, or an admin.
    pub async fn get_booking(&self, principal: &Principal, booking_id: Ulid) -> Result<Booking, EngineError> {
        let listing_id = self
            .listing_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let shared = self
            .get_listing_state(&listing_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let guard = shared.read().await;
        let booking = guard
            .bookings
            .get(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        access::authorize_owner(principal, booking, Operation::ViewBooking)?;
        Ok(booking.clone())
    }

    /// The principal's own trips, newest first.
    pub async fn guest_bookings(&self, principal: &Principal) -> Vec<Booking> {
        let ids: Vec<Ulid> = self
            .guest_bookings
            .get(&principal.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(shared) = self.listing_for_booking(&id).and_then(|l| self.get_listing_state(&l)) else {
                continue;
            };
            let guard = shared.read().await;
            if let Some(b) = guard.bookings.get(&id) {
                out.push(b.clone());
            }
        }
        sort_newest_first(&mut out);
        out
    }

    /// Bookings across every listing the principal hosts, newest first.
    pub async fn host_bookings(&self, principal: &Principal) -> Vec<Booking> {
        let mut out = Vec::new();
        for listing_id in self.listings_hosted_by(&principal.id) {
            let Some(shared) = self.get_listing_state(&listing_id) else {
                continue;
            };
            let guard = shared.read().await;
            out.extend(guard.bookings.values().cloned());
        }
        sort_newest_first(&mut out);
        out
    }

    pub fn listings_hosted_by(&self, host_id: &str) -> Vec<Ulid> {
        self.host_listings
            .get(host_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }
}

fn sort_newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
