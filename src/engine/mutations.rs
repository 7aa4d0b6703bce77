use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::access::{self, Operation, Principal};
use super::conflict::{check_no_conflict, validate_range};
use super::transitions::{self, Party};
use super::{Engine, EngineError, WalCommand};

/// Fields a host supplies when listing a property.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub price_per_night: u64,
    pub max_guests: u32,
}

pub(super) fn check_user_id(principal: &Principal) -> Result<(), EngineError> {
    if principal.id.is_empty() {
        return Err(EngineError::Unauthenticated);
    }
    if principal.id.len() > MAX_USER_ID_LEN {
        return Err(EngineError::LimitExceeded("user id too long"));
    }
    Ok(())
}

/// Trim notes; blank means "leave unchanged".
fn normalize_notes(notes: Option<String>) -> Result<Option<String>, EngineError> {
    let Some(notes) = notes else { return Ok(None) };
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() > MAX_NOTES_LEN {
        return Err(EngineError::LimitExceeded("host notes too long"));
    }
    Ok(Some(trimmed.to_string()))
}

pub(super) fn booking_snapshot(ls: &ListingState, booking_id: Ulid) -> Result<Booking, EngineError> {
    ls.bookings
        .get(&booking_id)
        .cloned()
        .ok_or(EngineError::NotFound(booking_id))
}

impl Engine {
    pub async fn create_listing(&self, principal: &Principal, new: NewListing) -> Result<Listing, EngineError> {
        check_user_id(principal)?;
        let title = new.title.trim();
        if title.is_empty() {
            return Err(EngineError::InvalidInput("title must not be empty"));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(EngineError::LimitExceeded("title too long"));
        }
        if new.price_per_night == 0 {
            return Err(EngineError::InvalidInput("price per night must be positive"));
        }
        if new.max_guests == 0 {
            return Err(EngineError::InvalidInput("listing must allow at least one guest"));
        }
        if new.max_guests > MAX_GUESTS_PER_LISTING {
            return Err(EngineError::LimitExceeded("too many guests for one listing"));
        }

        let _catalog = self.catalog.lock().await;
        if self.listings.len() >= MAX_LISTINGS {
            return Err(EngineError::LimitExceeded("too many listings"));
        }

        let id = Ulid::new();
        let event = Event::ListingCreated {
            id,
            host_id: principal.id.clone(),
            title: title.to_string(),
            price_per_night: new.price_per_night,
            max_guests: new.max_guests,
        };
        self.wal_append(&event).await?;
        self.insert_listing(&event);
        metrics::gauge!(crate::observability::LISTINGS_ACTIVE).set(self.listings.len() as f64);
        tracing::info!("listing {id} created by host {}", principal.id);

        self.get_listing(id).await
    }

    /// Remove a listing. Owning host or admin; refused while any booking is active.
    pub async fn delete_listing(&self, principal: &Principal, id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let shared = self.get_listing_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = shared.write().await;
        access::authorize_owner(principal, &guard.listing, Operation::DeleteListing)?;
        if guard.active_booking_count() > 0 {
            return Err(EngineError::HasActiveBookings(id));
        }

        self.wal_append(&Event::ListingDeleted { id }).await?;
        // Still holding the write lock: anyone queued on it sees the listing gone.
        self.listings.remove(&id);
        self.unindex_listing(&guard);
        metrics::gauge!(crate::observability::LISTINGS_ACTIVE).set(self.listings.len() as f64);
        tracing::info!("listing {id} deleted by {}", principal.id);
        Ok(())
    }

    /// Request a stay. The date range is claimed under the listing lock in the
    /// same critical section that checks it, so two overlapping requests can
    /// never both succeed.
    pub async fn create_booking(
        &self,
        principal: &Principal,
        listing_id: Ulid,
        range: DateRange,
        guest_count: u32,
    ) -> Result<Booking, EngineError> {
        check_user_id(principal)?;
        validate_range(&range, self.today())?;
        if guest_count == 0 {
            return Err(EngineError::InvalidInput("at least one guest is required"));
        }

        let shared = self
            .get_listing_state(&listing_id)
            .ok_or(EngineError::NotFound(listing_id))?;
        let mut guard = shared.write().await;
        // Deleted while we waited for the lock.
        if !self.listings.contains_key(&listing_id) {
            return Err(EngineError::NotFound(listing_id));
        }
        if guard.listing.host_id == principal.id {
            return Err(EngineError::Forbidden("hosts cannot book their own listing"));
        }
        if guest_count > guard.listing.max_guests {
            return Err(EngineError::CapacityExceeded {
                requested: guest_count,
                max: guard.listing.max_guests,
            });
        }
        if guard.active_booking_count() >= MAX_ACTIVE_BOOKINGS_PER_LISTING {
            return Err(EngineError::LimitExceeded("too many active bookings on listing"));
        }
        let total_price = (range.nights() as u64)
            .checked_mul(guard.listing.price_per_night)
            .ok_or(EngineError::LimitExceeded("total price overflow"))?;

        if let Err(e) = check_no_conflict(&guard, &range, None) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            tracing::debug!("booking on {listing_id} for {range} rejected: {e}");
            return Err(e);
        }

        let id = Ulid::new();
        let event = Event::BookingRequested {
            id,
            listing_id,
            guest_id: principal.id.clone(),
            range,
            guest_count,
            total_price,
            created_at: self.clock.now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("booking {id} requested on {listing_id} for {range} by {}", principal.id);

        booking_snapshot(&guard, id)
    }

    /// Move a booking to `target`. The caller's standing is resolved against
    /// this booking (guest or host of it), not from their global role.
    pub async fn update_status(
        &self,
        principal: &Principal,
        booking_id: Ulid,
        target: BookingStatus,
        notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = booking_snapshot(&guard, booking_id)?;
        // Terminal bookings answer IllegalTransition before notes are looked at.
        if !transitions::is_reachable(booking.status, target) {
            return Err(EngineError::IllegalTransition {
                from: booking.status,
                to: target,
            });
        }
        let notes = normalize_notes(notes)?;
        let party = Party::resolve(principal, &booking, Operation::UpdateBookingStatus);
        if notes.is_some() && party == Some(Party::Guest) {
            return Err(EngineError::Forbidden("only the host may add notes"));
        }
        self.apply_transition(&mut guard, &booking, target, party, notes).await
    }

    /// Cancel as the booking's guest or host.
    pub async fn cancel_booking(&self, principal: &Principal, booking_id: Ulid) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = booking_snapshot(&guard, booking_id)?;
        access::authorize_owner(principal, &booking, Operation::CancelBooking)?;
        let party = Party::resolve(principal, &booking, Operation::CancelBooking);
        self.apply_transition(&mut guard, &booking, BookingStatus::Cancelled, party, None)
            .await
    }

    /// Moderation: erase a booking record, releasing its dates if active.
    pub async fn delete_booking(&self, principal: &Principal, booking_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = booking_snapshot(&guard, booking_id)?;
        access::authorize_owner(principal, &booking, Operation::DeleteBooking)?;
        let event = Event::BookingDeleted {
            id: booking_id,
            listing_id: booking.listing_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("booking {booking_id} deleted by {}", principal.id);
        Ok(())
    }

    async fn apply_transition(
        &self,
        guard: &mut ListingState,
        booking: &Booking,
        target: BookingStatus,
        party: Option<Party>,
        notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        let next = transitions::transition(booking, target, party)?;
        if target == BookingStatus::Confirmed {
            // The range was claimed at creation; make sure nothing slipped in since.
            check_no_conflict(guard, &next.date_range, Some(next.id))?;
        }

        let event = Event::BookingStatusChanged {
            id: next.id,
            listing_id: next.listing_id,
            status: target,
            host_notes: notes,
        };
        self.persist_and_apply(guard, &event).await?;
        tracing::info!("booking {} {} -> {}", next.id, booking.status, target);

        booking_snapshot(guard, next.id)
    }

    /// Rewrite the journal as the minimal event list reproducing current state.
    /// Holds the catalog lock and every listing's read lock until the new file
    /// is in place, so no committed change can fall between snapshot and swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;

        let mut ids: Vec<Ulid> = self.listings.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(shared) = self.get_listing_state(id) {
                guards.push(shared.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for ls in &guards {
            let l = &ls.listing;
            events.push(Event::ListingCreated {
                id: l.id,
                host_id: l.host_id.clone(),
                title: l.title.clone(),
                price_per_night: l.price_per_night,
                max_guests: l.max_guests,
            });
        }
        for ls in &guards {
            let mut bookings: Vec<&Booking> = ls.bookings.values().collect();
            // Finished bookings first: each one's request and status change sit
            // side by side, so its dates are free again before an active booking
            // on the same nights is replayed.
            bookings.sort_by_key(|b| (b.status.is_active(), b.created_at, b.id));
            for b in bookings {
                events.push(Event::BookingRequested {
                    id: b.id,
                    listing_id: b.listing_id,
                    guest_id: b.guest_id.clone(),
                    range: b.date_range,
                    guest_count: b.guest_count,
                    total_price: b.total_price,
                    created_at: b.created_at,
                });
                if b.status != BookingStatus::Pending || b.host_notes.is_some() {
                    events.push(Event::BookingStatusChanged {
                        id: b.id,
                        listing_id: b.listing_id,
                        status: b.status,
                        host_notes: b.host_notes.clone(),
                    });
                }
            }
            let mut reviews: Vec<&Review> = ls.reviews.values().collect();
            reviews.sort_by_key(|r| (r.created_at, r.id));
            for r in reviews {
                events.push(Event::ReviewPosted {
                    id: r.id,
                    booking_id: r.booking_id,
                    listing_id: r.listing_id,
                    rating: r.rating,
                    comment: r.comment.clone(),
                    created_at: r.created_at,
                });
                if r.updated_at != r.created_at {
                    events.push(Event::ReviewEdited {
                        id: r.id,
                        listing_id: r.listing_id,
                        rating: r.rating,
                        comment: r.comment.clone(),
                        updated_at: r.updated_at,
                    });
                }
                if let Some(response) = &r.host_response {
                    events.push(Event::ReviewResponded {
                        id: r.id,
                        listing_id: r.listing_id,
                        response: response.clone(),
                    });
                }
                if r.flagged {
                    events.push(Event::ReviewFlagged {
                        id: r.id,
                        listing_id: r.listing_id,
                    });
                }
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Unavailable("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        tracing::info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
