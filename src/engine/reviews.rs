use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::access::{self, Operation, Principal};
use super::mutations::{booking_snapshot, check_user_id};
use super::{Engine, EngineError};

/// Star rating and text of a review, as submitted.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub rating: u8,
    pub comment: String,
}

impl ReviewDraft {
    fn validated(self) -> Result<ReviewDraft, EngineError> {
        if !(1..=MAX_RATING).contains(&self.rating) {
            return Err(EngineError::InvalidInput("rating must be between 1 and 5"));
        }
        let comment = self.comment.trim();
        if comment.is_empty() {
            return Err(EngineError::InvalidInput("comment must not be empty"));
        }
        if comment.len() > MAX_COMMENT_LEN {
            return Err(EngineError::LimitExceeded("comment too long"));
        }
        Ok(ReviewDraft {
            rating: self.rating,
            comment: comment.to_string(),
        })
    }
}

fn review_snapshot(ls: &ListingState, review_id: Ulid) -> Result<Review, EngineError> {
    ls.reviews
        .get(&review_id)
        .cloned()
        .ok_or(EngineError::NotFound(review_id))
}

fn sort_newest_first(reviews: &mut [Review]) {
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

impl Engine {
    /// Review a completed stay. Only the stay's guest may, once per booking.
    pub async fn post_review(
        &self,
        principal: &Principal,
        booking_id: Ulid,
        draft: ReviewDraft,
    ) -> Result<Review, EngineError> {
        check_user_id(principal)?;
        let draft = draft.validated()?;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = booking_snapshot(&guard, booking_id)?;
        // The author is always the booking's guest, admins included.
        if booking.guest_id != principal.id {
            return Err(EngineError::Forbidden("only the guest of this stay may review it"));
        }
        if booking.status != BookingStatus::Completed {
            return Err(EngineError::NotReviewable("stay is not completed"));
        }
        if guard.review_for_booking(booking_id).is_some() {
            return Err(EngineError::NotReviewable("stay already reviewed"));
        }

        let id = Ulid::new();
        let event = Event::ReviewPosted {
            id,
            booking_id,
            listing_id: booking.listing_id,
            rating: draft.rating,
            comment: draft.comment,
            created_at: self.clock.now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("review {id} posted on {} for booking {booking_id}", booking.listing_id);

        review_snapshot(&guard, id)
    }

    /// Reviews of a listing, newest first, and their mean rating.
    pub async fn listing_reviews(&self, listing_id: Ulid) -> Result<(Vec<Review>, Option<f64>), EngineError> {
        let shared = self
            .get_listing_state(&listing_id)
            .ok_or(EngineError::NotFound(listing_id))?;
        let guard = shared.read().await;
        let mut reviews: Vec<Review> = guard.reviews.values().cloned().collect();
        sort_newest_first(&mut reviews);
        Ok((reviews, guard.average_rating()))
    }

    /// Reviews the principal has written, newest first.
    pub async fn guest_reviews(&self, principal: &Principal) -> Vec<Review> {
        let ids: Vec<Ulid> = self
            .guest_reviews
            .get(&principal.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(shared) = self
                .review_to_listing
                .get(&id)
                .map(|e| *e.value())
                .and_then(|l| self.get_listing_state(&l))
            else {
                continue;
            };
            let guard = shared.read().await;
            if let Some(r) = guard.reviews.get(&id) {
                out.push(r.clone());
            }
        }
        sort_newest_first(&mut out);
        out
    }

    pub async fn edit_review(
        &self,
        principal: &Principal,
        review_id: Ulid,
        draft: ReviewDraft,
    ) -> Result<Review, EngineError> {
        let draft = draft.validated()?;
        let mut guard = self.resolve_review_write(&review_id).await?;
        let review = review_snapshot(&guard, review_id)?;
        access::authorize_owner(principal, &review, Operation::EditReview)?;

        let event = Event::ReviewEdited {
            id: review_id,
            listing_id: review.listing_id,
            rating: draft.rating,
            comment: draft.comment,
            updated_at: self.clock.now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("review {review_id} edited by {}", principal.id);

        review_snapshot(&guard, review_id)
    }

    /// Author or admin.
    pub async fn delete_review(&self, principal: &Principal, review_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.resolve_review_write(&review_id).await?;
        let review = review_snapshot(&guard, review_id)?;
        access::authorize_owner(principal, &review, Operation::DeleteReview)?;

        let event = Event::ReviewDeleted {
            id: review_id,
            listing_id: review.listing_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("review {review_id} deleted by {}", principal.id);
        Ok(())
    }

    /// The listing's host answers a review. A second answer replaces the first.
    pub async fn respond_to_review(
        &self,
        principal: &Principal,
        review_id: Ulid,
        response: String,
    ) -> Result<Review, EngineError> {
        let response = response.trim();
        if response.is_empty() {
            return Err(EngineError::InvalidInput("response must not be empty"));
        }
        if response.len() > MAX_RESPONSE_LEN {
            return Err(EngineError::LimitExceeded("response too long"));
        }
        let mut guard = self.resolve_review_write(&review_id).await?;
        let review = review_snapshot(&guard, review_id)?;
        access::authorize_owner(principal, &review, Operation::RespondToReview)?;

        let event = Event::ReviewResponded {
            id: review_id,
            listing_id: review.listing_id,
            response: response.to_string(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("review {review_id} answered by {}", principal.id);

        review_snapshot(&guard, review_id)
    }

    /// Report a review for moderation. Flagging twice is a no-op.
    pub async fn flag_review(&self, principal: &Principal, review_id: Ulid) -> Result<Review, EngineError> {
        check_user_id(principal)?;
        let mut guard = self.resolve_review_write(&review_id).await?;
        let review = review_snapshot(&guard, review_id)?;
        if review.guest_id == principal.id {
            return Err(EngineError::Forbidden("cannot flag your own review"));
        }
        if review.flagged {
            return Ok(review);
        }

        let event = Event::ReviewFlagged {
            id: review_id,
            listing_id: review.listing_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::warn!("review {review_id} flagged by {}", principal.id);

        review_snapshot(&guard, review_id)
    }
}
