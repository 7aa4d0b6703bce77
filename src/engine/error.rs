use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    /// No authenticated principal.
    Unauthenticated,
    /// Wrong role, or the principal does not own the record.
    Forbidden(&'static str),
    NotFound(Ulid),
    /// Malformed or past dates.
    InvalidRange(&'static str),
    CapacityExceeded {
        requested: u32,
        max: u32,
    },
    /// Overlaps the active booking with this id.
    Conflict(Ulid),
    IllegalTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    HasActiveBookings(Ulid),
    /// Stay not completed yet, or already reviewed.
    NotReviewable(&'static str),
    /// Malformed request field other than dates.
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    /// The journal could not be written.
    Unavailable(String),
}

impl EngineError {
    /// A conflict means the caller must pick different dates; retrying the
    /// same request cannot succeed.
    pub fn is_retryable_after_reselection(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unauthenticated => write!(f, "authentication required"),
            EngineError::Forbidden(why) => write!(f, "access denied: {why}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidRange(why) => write!(f, "invalid date range: {why}"),
            EngineError::CapacityExceeded { requested, max } => {
                write!(f, "{requested} guests requested but listing allows at most {max}")
            }
            EngineError::Conflict(id) => {
                write!(f, "dates overlap an existing booking ({id}); choose different dates")
            }
            EngineError::IllegalTransition { from, to } => {
                write!(f, "cannot change booking status from {from} to {to}")
            }
            EngineError::HasActiveBookings(id) => {
                write!(f, "listing {id} still has pending or confirmed bookings")
            }
            EngineError::NotReviewable(why) => write!(f, "cannot review this stay: {why}"),
            EngineError::InvalidInput(why) => write!(f, "invalid input: {why}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
