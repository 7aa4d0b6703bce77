//! Hard limits enforced by the engine. Anything beyond these is rejected with
//! `EngineError::LimitExceeded` before it reaches the journal.

pub const MAX_LISTINGS: usize = 100_000;
/// Pending plus confirmed bookings on one listing. Finished bookings don't count.
pub const MAX_ACTIVE_BOOKINGS_PER_LISTING: usize = 10_000;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 1_000;
pub const MAX_COMMENT_LEN: usize = 2_000;
pub const MAX_RESPONSE_LEN: usize = 1_000;
pub const MAX_USER_ID_LEN: usize = 128;

/// Longest single stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;
/// How far ahead of today a stay may start.
pub const MAX_ADVANCE_DAYS: i64 = 730;
/// Widest window accepted by calendar queries.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 1_095;

pub const MAX_GUESTS_PER_LISTING: u32 = 64;

/// Star ratings run from 1 to this.
pub const MAX_RATING: u8 = 5;
