use serde::{Deserialize, Serialize};

use crate::model::{Booking, Listing, Review, UserId};

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Host,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Some(Role::Guest),
            "host" => Some(Role::Host),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller as supplied by the auth gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Which owner of a record a check compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipField {
    Guest,
    Host,
}

/// Records with one or more owners.
pub trait Owned {
    fn owner(&self, field: OwnershipField) -> Option<&str>;
}

impl Owned for Booking {
    fn owner(&self, field: OwnershipField) -> Option<&str> {
        match field {
            OwnershipField::Guest => Some(&self.guest_id),
            OwnershipField::Host => Some(&self.host_id),
        }
    }
}

impl Owned for Review {
    fn owner(&self, field: OwnershipField) -> Option<&str> {
        match field {
            OwnershipField::Guest => Some(&self.guest_id),
            OwnershipField::Host => Some(&self.host_id),
        }
    }
}

impl Owned for Listing {
    fn owner(&self, field: OwnershipField) -> Option<&str> {
        match field {
            OwnershipField::Host => Some(&self.host_id),
            OwnershipField::Guest => None,
        }
    }
}

const TRAVELER: &[Role] = &[Role::Guest, Role::Host, Role::Admin];
const HOST: &[Role] = &[Role::Host, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];
const ANYONE: &[Role] = TRAVELER;

/// Role and ownership requirements of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub roles: &'static [Role],
    /// Owners allowed to act. Empty means admins only. Admins always pass.
    pub ownership: &'static [OwnershipField],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateBooking,
    ListOwnBookings,
    ViewBooking,
    CancelBooking,
    ListHostBookings,
    UpdateBookingStatus,
    DeleteBooking,
    CheckAvailability,
    ViewCalendar,
    CreateListing,
    ViewListing,
    DeleteListing,
    PostReview,
    ListListingReviews,
    ListOwnReviews,
    EditReview,
    DeleteReview,
    RespondToReview,
    FlagReview,
}

impl Operation {
    pub const fn capability(self) -> Capability {
        use OwnershipField::*;
        match self {
            Operation::CreateBooking => Capability { roles: TRAVELER, ownership: &[] },
            Operation::ListOwnBookings => Capability { roles: TRAVELER, ownership: &[] },
            Operation::ViewBooking => Capability { roles: ANYONE, ownership: &[Guest, Host] },
            Operation::CancelBooking => Capability { roles: TRAVELER, ownership: &[Guest, Host] },
            Operation::ListHostBookings => Capability { roles: HOST, ownership: &[] },
            Operation::UpdateBookingStatus => Capability { roles: HOST, ownership: &[Guest, Host] },
            Operation::DeleteBooking => Capability { roles: ADMIN, ownership: &[] },
            Operation::CheckAvailability => Capability { roles: ANYONE, ownership: &[] },
            Operation::ViewCalendar => Capability { roles: ANYONE, ownership: &[] },
            Operation::CreateListing => Capability { roles: HOST, ownership: &[] },
            Operation::ViewListing => Capability { roles: ANYONE, ownership: &[] },
            Operation::DeleteListing => Capability { roles: HOST, ownership: &[Host] },
            Operation::PostReview => Capability { roles: TRAVELER, ownership: &[Guest] },
            Operation::ListListingReviews => Capability { roles: ANYONE, ownership: &[] },
            Operation::ListOwnReviews => Capability { roles: TRAVELER, ownership: &[] },
            Operation::EditReview => Capability { roles: TRAVELER, ownership: &[Guest] },
            Operation::DeleteReview => Capability { roles: TRAVELER, ownership: &[Guest] },
            Operation::RespondToReview => Capability { roles: HOST, ownership: &[Host] },
            Operation::FlagReview => Capability { roles: ANYONE, ownership: &[] },
        }
    }

    /// Short label for metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            Operation::CreateBooking => "create_booking",
            Operation::ListOwnBookings => "list_own_bookings",
            Operation::ViewBooking => "view_booking",
            Operation::CancelBooking => "cancel_booking",
            Operation::ListHostBookings => "list_host_bookings",
            Operation::UpdateBookingStatus => "update_booking_status",
            Operation::DeleteBooking => "delete_booking",
            Operation::CheckAvailability => "check_availability",
            Operation::ViewCalendar => "view_calendar",
            Operation::CreateListing => "create_listing",
            Operation::ViewListing => "view_listing",
            Operation::DeleteListing => "delete_listing",
            Operation::PostReview => "post_review",
            Operation::ListListingReviews => "list_listing_reviews",
            Operation::ListOwnReviews => "list_own_reviews",
            Operation::EditReview => "edit_review",
            Operation::DeleteReview => "delete_review",
            Operation::RespondToReview => "respond_to_review",
            Operation::FlagReview => "flag_review",
        }
    }
}

pub fn has_role(principal: &Principal, roles: &[Role]) -> bool {
    roles.contains(&principal.role)
}

/// Opaque identifier equality on `field`. Admins own everything.
pub fn owns_resource<R: Owned + ?Sized>(principal: &Principal, resource: &R, field: OwnershipField) -> bool {
    principal.is_admin() || resource.owner(field) == Some(principal.id.as_str())
}

/// Role gate for `op`, checked before the engine is invoked.
pub fn authorize(principal: Option<&Principal>, op: Operation) -> Result<&Principal, EngineError> {
    let principal = principal.ok_or(EngineError::Unauthenticated)?;
    if !has_role(principal, op.capability().roles) {
        return Err(EngineError::Forbidden("role not permitted for this operation"));
    }
    Ok(principal)
}

/// Ownership gate for `op` against a loaded record.
pub fn authorize_owner<R: Owned + ?Sized>(principal: &Principal, resource: &R, op: Operation) -> Result<(), EngineError> {
    if principal.is_admin()
        || op
            .capability()
            .ownership
            .iter()
            .any(|&field| owns_resource(principal, resource, field))
    {
        Ok(())
    } else {
        Err(EngineError::Forbidden("not an owner of this resource"))
    }
}
