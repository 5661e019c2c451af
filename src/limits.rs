//! Hard limits and authoring policy. None of these are correctness
//! invariants; they bound resource usage and reject obviously bad input.

/// Rooms a single hotel engine will hold.
pub const MAX_ROOMS_PER_HOTEL: usize = 10_000;

/// Rate rules per room.
pub const MAX_RULES_PER_ROOM: usize = 2_000;

/// Live bookings plus blocked dates per room.
pub const MAX_ENTRIES_PER_ROOM: usize = 50_000;

/// Longest bookable stay.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Widest availability / free-window query.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 1_095;

/// Room and hotel display names.
pub const MAX_NAME_LEN: usize = 256;

/// Rule authoring policy: reject ranges ending more than a year in the
/// past or starting more than five years out.
pub const RULE_MAX_PAST_DAYS: i64 = 365;
pub const RULE_MAX_FUTURE_DAYS: i64 = 1_826;

/// Hotels a single directory will load.
pub const MAX_HOTELS: usize = 1_024;

/// Hotel slug length (becomes the WAL file name).
pub const MAX_HOTEL_SLUG_LEN: usize = 128;
