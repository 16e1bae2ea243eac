mod error;
mod mutations;
mod queries;

pub use error::BookingError;
pub use mutations::BookingRequest;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::holidays::HolidayOracle;
use crate::store::AppointmentStore;
use crate::zone;

/// Source of "now". Swapped for a fixed instant in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Slot generation and booking over one appointment store.
///
/// Stateless apart from the holiday memo: every call reads the store fresh,
/// so one `Engine` can be shared across tasks behind an `Arc`.
pub struct Engine<S: AppointmentStore> {
    store: S,
    holidays: HolidayOracle,
    clock: Arc<dyn Clock>,
}

impl<S: AppointmentStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            holidays: HolidayOracle::new(),
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Today's date in the owner zone.
    pub fn today(&self) -> NaiveDate {
        zone::today(self.clock.now())
    }
}
