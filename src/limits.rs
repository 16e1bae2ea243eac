//! Business constants shared by the rules, the slot generator and the store.

/// First bookable hour of the owner's local business day.
pub const BUSINESS_DAY_START_HOUR: u32 = 9;

/// Business day ends at this local hour; no slot may run past it.
pub const BUSINESS_DAY_END_HOUR: u32 = 16;

/// Mandatory gap in minutes between two appointments of the same owner.
pub const BUFFER_MINUTES: i64 = 15;

/// An owner takes at most this many appointments per local day.
pub const MAX_APPOINTMENTS_PER_DAY: usize = 3;

/// How far ahead of "today" a guest may book, in calendar months.
pub const BOOKING_WINDOW_MONTHS: u32 = 2;

/// Longest guest first or last name, in characters, after trimming.
pub const MAX_GUEST_NAME_LEN: usize = 100;

/// Longest normalized owner id, in bytes.
pub const MAX_OWNER_ID_LEN: usize = 450;

/// Largest WAL record payload. Replay stops at a length prefix above this.
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;
