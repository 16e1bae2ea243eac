use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, Serializer};
use ulid::Ulid;
use uuid::Uuid;

/// Half-open interval `[start, end)` of absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// The span grown by `pad` on both ends.
    pub fn padded(&self, pad: TimeDelta) -> Span {
        Span {
            start: self.start - pad,
            end: self.end + pad,
        }
    }
}

/// Owner keys are normalized e-mail addresses.
pub fn normalize_owner_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A booked meeting. Never mutated once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub owner_id: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub share_link_id: Uuid,
    pub guest_first_name: String,
    pub guest_last_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::new(self.start_utc, self.end_utc)
    }

    pub fn guest_display_name(&self) -> String {
        format!("{} {}", self.guest_first_name, self.guest_last_name)
    }
}

/// Single-use capability granting one booking against an owner's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: Uuid,
    pub owner_id: String,
    pub created_utc: DateTime<Utc>,
    pub is_used: bool,
}

impl ShareLink {
    pub fn new(owner_id: String, created_utc: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            created_utc,
            is_used: false,
        }
    }
}

/// Why a slot cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReason {
    None,
    /// Day is outside the booking window, a weekend or a public holiday.
    Unavailable,
    /// Collides with an existing meeting or its buffer.
    Booked,
    /// The owner's daily cap is already reached.
    LimitExceeded,
}

impl SlotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotReason::None => "",
            SlotReason::Unavailable => "unavailable",
            SlotReason::Booked => "booked",
            SlotReason::LimitExceeded => "limit exceeded",
        }
    }
}

impl Serialize for SlotReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A candidate meeting window in the owner's local time. Recomputed per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub from: NaiveTime,
    pub to: NaiveTime,
    pub available: bool,
    pub reason: SlotReason,
}

/// An owner's appointment rendered in local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaEntry {
    pub appointment_id: Ulid,
    pub day: NaiveDate,
    pub from: NaiveTime,
    pub to: NaiveTime,
    pub guest: String,
}

/// What a guest sees on opening a share link: the link, its owner and how
/// busy the owner is this month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub link: ShareLink,
    pub appointments_this_month: usize,
}

#[derive(Debug, Clone)]
pub struct OwnerState {
    pub owner_id: String,
    /// Committed appointments, sorted by `start_utc`.
    pub appointments: Vec<Appointment>,
    pub links: HashMap<Uuid, ShareLink>,
}

impl OwnerState {
    pub fn new(owner_id: String) -> Self {
        Self {
            owner_id,
            appointments: Vec::new(),
            links: HashMap::new(),
        }
    }

    /// Insert appointment maintaining sort order by start.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.start_utc, |a| a.start_utc)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    /// Appointments whose start lies in `range`, in start order.
    pub fn starting_within(&self, range: &Span) -> impl Iterator<Item = &Appointment> {
        let lo = self
            .appointments
            .partition_point(|a| a.start_utc < range.start);
        let hi = self
            .appointments
            .partition_point(|a| a.start_utc < range.end);
        self.appointments[lo..hi].iter()
    }

    /// Backs the (owner, start) uniqueness constraint.
    pub fn has_start(&self, start: DateTime<Utc>) -> bool {
        self.appointments
            .binary_search_by_key(&start, |a| a.start_utc)
            .is_ok()
    }
}

/// WAL record format. One record per committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    LinkCreated {
        link: ShareLink,
    },
    /// One committed transaction: every insert and link invalidation it staged.
    BookingCommitted {
        owner_id: String,
        appointments: Vec<Appointment>,
        used_links: Vec<Uuid>,
    },
}

impl Event {
    pub fn owner_id(&self) -> &str {
        match self {
            Event::LinkCreated { link } => &link.owner_id,
            Event::BookingCommitted { owner_id, .. } => owner_id,
        }
    }
}
