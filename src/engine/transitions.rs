use crate::model::{Booking, BookingStatus};

use super::EngineError;
use super::access::{Operation, OwnershipField, Owned, Principal};

/// Who is acting on a booking, relative to that booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Guest,
    Host,
    /// Admin not hosting the booking, including one who booked it.
    Admin,
}

impl Party {
    /// The principal's standing on `booking`, limited to the owner fields
    /// `op` accepts. Being a host elsewhere does not make you this
    /// booking's host.
    pub fn resolve(principal: &Principal, booking: &Booking, op: Operation) -> Option<Party> {
        let fields = op.capability().ownership;
        let holds = |field: OwnershipField| {
            fields.contains(&field) && booking.owner(field) == Some(principal.id.as_str())
        };
        if holds(OwnershipField::Host) {
            Some(Party::Host)
        } else if principal.is_admin() {
            Some(Party::Admin)
        } else if holds(OwnershipField::Guest) {
            Some(Party::Guest)
        } else {
            None
        }
    }
}

/// Legal next states, regardless of actor.
pub fn successors(from: BookingStatus) -> &'static [BookingStatus] {
    use BookingStatus::*;
    match from {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[Cancelled, Completed],
        Cancelled | Completed => &[],
    }
}

pub fn is_reachable(from: BookingStatus, to: BookingStatus) -> bool {
    successors(from).contains(&to)
}

/// Whether `party` may drive `from -> to`. Only meaningful when reachable.
pub fn actor_permitted(from: BookingStatus, to: BookingStatus, party: Party) -> bool {
    use BookingStatus::*;
    match (from, to) {
        (Pending, Confirmed) | (Confirmed, Completed) => matches!(party, Party::Host | Party::Admin),
        (Pending, Cancelled) | (Confirmed, Cancelled) => true,
        _ => false,
    }
}

/// Validate `booking.status -> target` for `party` and return the updated copy.
/// Reachability is checked first, so terminal bookings report
/// `IllegalTransition` whoever asks.
pub fn transition(booking: &Booking, target: BookingStatus, party: Option<Party>) -> Result<Booking, EngineError> {
    let from = booking.status;
    if !is_reachable(from, target) {
        return Err(EngineError::IllegalTransition { from, to: target });
    }
    let party = party.ok_or(EngineError::Forbidden("not a party to this booking"))?;
    if !actor_permitted(from, target, party) {
        return Err(EngineError::Forbidden("only the host may make this change"));
    }
    let mut next = booking.clone();
    next.status = target;
    Ok(next)
}
