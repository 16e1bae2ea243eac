use crate::store::{CommitError, StoreError};
use crate::zone::ZoneError;

/// Every way a booking (or slot query) can be refused. All recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    InvalidLink,
    LinkAlreadyUsed,
    DayNotAllowed,
    DailyLimitReached,
    SlotConflict,
    /// Lost a race with another booking. The caller may pick another slot.
    ConcurrentConflict,
    InvalidTime(&'static str),
    InvalidGuestName(&'static str),
    Storage(String),
}

impl BookingError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidLink => "invalid_link",
            BookingError::LinkAlreadyUsed => "link_already_used",
            BookingError::DayNotAllowed => "day_not_allowed",
            BookingError::DailyLimitReached => "daily_limit_reached",
            BookingError::SlotConflict => "slot_conflict",
            BookingError::ConcurrentConflict => "concurrent_conflict",
            BookingError::InvalidTime(_) => "invalid_time",
            BookingError::InvalidGuestName(_) => "invalid_guest_name",
            BookingError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidLink => write!(f, "share link is not valid"),
            BookingError::LinkAlreadyUsed => write!(f, "share link has already been used"),
            BookingError::DayNotAllowed => {
                write!(f, "day is outside the booking window, a weekend or a holiday")
            }
            BookingError::DailyLimitReached => {
                write!(f, "the daily meeting limit is already reached")
            }
            BookingError::SlotConflict => {
                write!(f, "slot collides with another meeting or its buffer")
            }
            BookingError::ConcurrentConflict => {
                write!(f, "slot was just taken, try another one")
            }
            BookingError::InvalidTime(msg) => write!(f, "invalid time: {msg}"),
            BookingError::InvalidGuestName(msg) => write!(f, "invalid guest name: {msg}"),
            BookingError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<ZoneError> for BookingError {
    fn from(e: ZoneError) -> Self {
        match e {
            ZoneError::Nonexistent(_) => {
                BookingError::InvalidTime("local time skipped by a daylight saving change")
            }
            ZoneError::OutOfRange(_) => BookingError::InvalidTime("date out of range"),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        BookingError::Storage(e.to_string())
    }
}

impl From<CommitError> for BookingError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::Conflict(_) => BookingError::ConcurrentConflict,
            CommitError::Store(e) => e.into(),
        }
    }
}
