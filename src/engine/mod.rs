pub mod access;
pub mod availability;
mod clock;
mod conflict;
mod error;
mod mutations;
mod queries;
mod reviews;
pub mod transitions;

pub use access::{Operation, Principal, Role};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::EngineError;
pub use mutations::NewListing;
pub use reviews::ReviewDraft;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

/// One listing's state behind its own lock. Reservation check-and-insert and
/// release both happen under the write half.
pub type SharedListingState = Arc<RwLock<ListingState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends:
/// block for the first append, drain whatever else is queued, then one
/// fsync for the whole batch and answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("journal flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after an append error so half-written bytes don't ride
    // along with the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The booking service: listings, their availability index and the booking
/// lifecycle, journaled before every in-memory change.
pub struct Engine {
    pub(super) listings: DashMap<Ulid, SharedListingState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    /// Serializes listing creation/deletion with compaction.
    pub(super) catalog: Mutex<()>,
    /// booking id → listing id
    pub(super) booking_to_listing: DashMap<Ulid, Ulid>,
    /// guest id → booking ids, oldest first
    pub(super) guest_bookings: DashMap<UserId, Vec<Ulid>>,
    /// host id → listing ids
    pub(super) host_listings: DashMap<UserId, Vec<Ulid>>,
    /// review id → listing id
    pub(super) review_to_listing: DashMap<Ulid, Ulid>,
    /// guest id → review ids, oldest first
    pub(super) guest_reviews: DashMap<UserId, Vec<Ulid>>,
}

/// Secondary indexes updated alongside a listing's state.
pub(super) struct Indexes<'a> {
    booking_to_listing: &'a DashMap<Ulid, Ulid>,
    guest_bookings: &'a DashMap<UserId, Vec<Ulid>>,
    review_to_listing: &'a DashMap<Ulid, Ulid>,
    guest_reviews: &'a DashMap<UserId, Vec<Ulid>>,
}

/// Apply a booking event to its listing. Caller holds the listing's write lock.
fn apply_to_listing(ls: &mut ListingState, event: &Event, idx: &Indexes<'_>) {
    match event {
        Event::BookingRequested {
            id,
            listing_id,
            guest_id,
            range,
            guest_count,
            total_price,
            created_at,
        } => {
            // Live requests were checked under this same lock; only a journal
            // that breaks the overlap invariant can fail here.
            if let Err(e) = availability::reserve(ls, *id, *range) {
                tracing::warn!("booking {id} replayed without a reservation: {e}");
            }
            ls.bookings.insert(
                *id,
                Booking {
                    id: *id,
                    listing_id: *listing_id,
                    guest_id: guest_id.clone(),
                    host_id: ls.listing.host_id.clone(),
                    date_range: *range,
                    guest_count: *guest_count,
                    total_price: *total_price,
                    status: BookingStatus::Pending,
                    host_notes: None,
                    created_at: *created_at,
                },
            );
            idx.booking_to_listing.insert(*id, *listing_id);
            idx.guest_bookings.entry(guest_id.clone()).or_default().push(*id);
        }
        Event::BookingStatusChanged {
            id,
            status,
            host_notes,
            ..
        } => {
            if let Some(booking) = ls.bookings.get_mut(id) {
                booking.status = *status;
                if host_notes.is_some() {
                    booking.host_notes = host_notes.clone();
                }
            }
            if !status.is_active() {
                availability::release(ls, *id);
            }
        }
        Event::BookingDeleted { id, .. } => {
            availability::release(ls, *id);
            if let Some(booking) = ls.bookings.remove(id) {
                unindex_booking(idx, &booking);
            }
            let orphaned: Vec<Ulid> = ls.reviews.values().filter(|r| r.booking_id == *id).map(|r| r.id).collect();
            for review_id in orphaned {
                if let Some(review) = ls.reviews.remove(&review_id) {
                    unindex_review(idx, &review);
                }
            }
        }
        Event::ReviewPosted {
            id,
            booking_id,
            listing_id,
            rating,
            comment,
            created_at,
        } => {
            let Some(booking) = ls.bookings.get(booking_id) else {
                tracing::warn!("review {id} replayed for unknown booking {booking_id}");
                return;
            };
            let review = Review {
                id: *id,
                booking_id: *booking_id,
                listing_id: *listing_id,
                guest_id: booking.guest_id.clone(),
                host_id: booking.host_id.clone(),
                rating: *rating,
                comment: comment.clone(),
                host_response: None,
                flagged: false,
                created_at: *created_at,
                updated_at: *created_at,
            };
            idx.review_to_listing.insert(*id, *listing_id);
            idx.guest_reviews.entry(review.guest_id.clone()).or_default().push(*id);
            ls.reviews.insert(*id, review);
        }
        Event::ReviewEdited {
            id,
            rating,
            comment,
            updated_at,
            ..
        } => {
            if let Some(review) = ls.reviews.get_mut(id) {
                review.rating = *rating;
                review.comment = comment.clone();
                review.updated_at = *updated_at;
            }
        }
        Event::ReviewResponded { id, response, .. } => {
            if let Some(review) = ls.reviews.get_mut(id) {
                review.host_response = Some(response.clone());
            }
        }
        Event::ReviewFlagged { id, .. } => {
            if let Some(review) = ls.reviews.get_mut(id) {
                review.flagged = true;
            }
        }
        Event::ReviewDeleted { id, .. } => {
            if let Some(review) = ls.reviews.remove(id) {
                unindex_review(idx, &review);
            }
        }
        // Listing lifecycle is handled at the map level.
        Event::ListingCreated { .. } | Event::ListingDeleted { .. } => {}
    }
}

fn unindex_booking(idx: &Indexes<'_>, booking: &Booking) {
    idx.booking_to_listing.remove(&booking.id);
    if let Some(mut ids) = idx.guest_bookings.get_mut(&booking.guest_id) {
        ids.retain(|b| *b != booking.id);
    }
}

fn unindex_review(idx: &Indexes<'_>, review: &Review) {
    idx.review_to_listing.remove(&review.id);
    if let Some(mut ids) = idx.guest_reviews.get_mut(&review.guest_id) {
        ids.retain(|r| *r != review.id);
    }
}

impl Engine {
    /// Open the engine on a journal, replaying whatever it holds. Must be
    /// called inside a tokio runtime: the journal writer is spawned here.
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if let Some(at) = replay.discarded_from {
            crate::wal::truncate_at(&wal_path, at)?;
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            listings: DashMap::new(),
            wal_tx,
            clock,
            catalog: Mutex::new(()),
            booking_to_listing: DashMap::new(),
            guest_bookings: DashMap::new(),
            host_listings: DashMap::new(),
            review_to_listing: DashMap::new(),
            guest_reviews: DashMap::new(),
        };

        // We are the only owner of these locks during replay, so try_write
        // never fails; blocking_write would panic inside the runtime.
        for event in &replay.events {
            match event {
                Event::ListingCreated { .. } => engine.insert_listing(event),
                Event::ListingDeleted { id } => engine.remove_listing(id),
                other => {
                    let Some(shared) = engine.get_listing_state(&other.listing_id()) else {
                        continue;
                    };
                    if let Ok(mut guard) = shared.try_write() {
                        apply_to_listing(&mut guard, other, &engine.indexes());
                    }
                }
            }
        }

        tracing::info!(
            "journal {} replayed: {} events, {} listings",
            wal_path.display(),
            replay.events.len(),
            engine.listings.len()
        );
        metrics::gauge!(crate::observability::LISTINGS_ACTIVE).set(engine.listings.len() as f64);
        Ok(engine)
    }

    pub(super) fn indexes(&self) -> Indexes<'_> {
        Indexes {
            booking_to_listing: &self.booking_to_listing,
            guest_bookings: &self.guest_bookings,
            review_to_listing: &self.review_to_listing,
            guest_reviews: &self.guest_reviews,
        }
    }

    pub(super) fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    fn insert_listing(&self, event: &Event) {
        let Event::ListingCreated {
            id,
            host_id,
            title,
            price_per_night,
            max_guests,
        } = event
        else {
            return;
        };
        let listing = Listing {
            id: *id,
            host_id: host_id.clone(),
            title: title.clone(),
            price_per_night: *price_per_night,
            max_guests: *max_guests,
        };
        self.listings.insert(*id, Arc::new(RwLock::new(ListingState::new(listing))));
        self.host_listings.entry(host_id.clone()).or_default().push(*id);
    }

    /// Replay path: drop a listing and everything indexed under it.
    fn remove_listing(&self, id: &Ulid) {
        let Some((_, shared)) = self.listings.remove(id) else {
            return;
        };
        if let Ok(guard) = shared.try_read() {
            self.unindex_listing(&guard);
        }
    }

    /// Remove index entries pointing into `ls`. The listing itself must
    /// already be out of `listings`.
    fn unindex_listing(&self, ls: &ListingState) {
        let idx = self.indexes();
        for booking in ls.bookings.values() {
            unindex_booking(&idx, booking);
        }
        for review in ls.reviews.values() {
            unindex_review(&idx, review);
        }
        if let Some(mut ids) = self.host_listings.get_mut(&ls.listing.host_id) {
            ids.retain(|l| *l != ls.listing.id);
        }
    }

    /// Send an event to the journal writer and wait for its fsync.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Unavailable("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Unavailable(e.to_string()))
    }

    pub fn get_listing_state(&self, id: &Ulid) -> Option<SharedListingState> {
        self.listings.get(id).map(|e| e.value().clone())
    }

    pub fn listing_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_listing.get(booking_id).map(|e| *e.value())
    }

    /// Journal, then apply. If the journal write fails nothing changes in memory.
    pub(super) async fn persist_and_apply(&self, ls: &mut ListingState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_listing(ls, event, &self.indexes());
        Ok(())
    }

    /// booking id → listing → write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ListingState>, EngineError> {
        let listing_id = self
            .listing_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let shared = self
            .get_listing_state(&listing_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = shared.write_owned().await;
        // Deleted between the index lookup and the lock.
        if !guard.bookings.contains_key(booking_id) {
            return Err(EngineError::NotFound(*booking_id));
        }
        Ok(guard)
    }

    /// review id → listing → write lock.
    pub(super) async fn resolve_review_write(
        &self,
        review_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ListingState>, EngineError> {
        let shared = self
            .review_to_listing
            .get(review_id)
            .map(|e| *e.value())
            .and_then(|listing_id| self.get_listing_state(&listing_id))
            .ok_or(EngineError::NotFound(*review_id))?;
        let guard = shared.write_owned().await;
        if !guard.reviews.contains_key(review_id) {
            return Err(EngineError::NotFound(*review_id));
        }
        Ok(guard)
    }
}
