use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use uuid::Uuid;

use crate::holidays::HolidayTable;
use crate::model::*;
use crate::observability;
use crate::rules;
use crate::store::AppointmentStore;
use crate::zone;

use super::{BookingError, Engine};

/// Local `[from, to)` windows of `duration` starting at opening time, one
/// buffer apart, that end no later than closing time.
fn candidate_windows(
    day: NaiveDate,
    duration: TimeDelta,
) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, BookingError> {
    if duration <= TimeDelta::zero() {
        return Err(BookingError::InvalidTime("duration must be positive"));
    }
    if duration > rules::business_day_length() {
        return Ok(Vec::new());
    }
    let step = duration + rules::buffer();
    let (open, close) = rules::business_hours(day);

    let mut windows = Vec::new();
    let mut start = open;
    while start + duration <= close {
        windows.push((start, start + duration));
        start += step;
    }
    Ok(windows)
}

fn spans_of(appointments: &[Appointment]) -> Vec<Span> {
    appointments.iter().map(Appointment::span).collect()
}

impl<S: AppointmentStore> Engine<S> {
    /// Slots of `duration` on `day` for `owner_id`, each marked available or
    /// not with a reason. Advisory only: booking re-checks everything.
    pub async fn generate_slots(
        &self,
        owner_id: &str,
        day: NaiveDate,
        duration: TimeDelta,
        today: NaiveDate,
    ) -> Result<Vec<Slot>, BookingError> {
        metrics::counter!(observability::SLOT_QUERIES_TOTAL).increment(1);
        let windows = candidate_windows(day, duration)?;

        if !rules::is_bookable_day(day, today, &self.holidays) {
            return Ok(windows
                .into_iter()
                .map(|(from, to)| Slot {
                    from: from.time(),
                    to: to.time(),
                    available: false,
                    reason: SlotReason::Unavailable,
                })
                .collect());
        }

        let owner_id = normalize_owner_id(owner_id);
        let existing = self
            .store
            .query_appointments(&owner_id, zone::day_span_utc(day)?)
            .await?;
        let existing = spans_of(&existing);
        let daily_ok = rules::respects_daily_limit(&existing);

        windows
            .into_iter()
            .map(|(from, to)| -> Result<Slot, BookingError> {
                let candidate = Span::new(zone::local_to_utc(from)?, zone::local_to_utc(to)?);
                let reason = if !daily_ok {
                    SlotReason::LimitExceeded
                } else if !rules::fits_with_buffer(&candidate, &existing) {
                    SlotReason::Booked
                } else {
                    SlotReason::None
                };
                Ok(Slot {
                    from: from.time(),
                    to: to.time(),
                    available: reason == SlotReason::None,
                    reason,
                })
            })
            .collect()
    }

    /// Guest entry point: resolve a link token to its owner, with the owner's
    /// appointment count for the current month. Used links still resolve.
    pub async fn open_link(&self, link_id: Uuid) -> Result<LinkView, BookingError> {
        let link = self
            .store
            .find_share_link_by_token(link_id)
            .await?
            .ok_or(BookingError::InvalidLink)?;
        let appointments_this_month = self
            .count_appointments_in_month(&link.owner_id, self.today())
            .await?;
        Ok(LinkView {
            link,
            appointments_this_month,
        })
    }

    /// The owner's appointments in the local calendar month containing `month`.
    pub async fn month_agenda(
        &self,
        owner_id: &str,
        month: NaiveDate,
    ) -> Result<Vec<AgendaEntry>, BookingError> {
        let owner_id = normalize_owner_id(owner_id);
        let appointments = self
            .store
            .query_appointments(&owner_id, zone::month_span_utc(month)?)
            .await?;
        Ok(appointments
            .iter()
            .map(|a| {
                let from = zone::utc_to_local(a.start_utc);
                let to = zone::utc_to_local(a.end_utc);
                AgendaEntry {
                    appointment_id: a.id,
                    day: from.date(),
                    from: from.time(),
                    to: to.time(),
                    guest: a.guest_display_name(),
                }
            })
            .collect())
    }

    pub async fn count_appointments_in_month(
        &self,
        owner_id: &str,
        month: NaiveDate,
    ) -> Result<usize, BookingError> {
        let owner_id = normalize_owner_id(owner_id);
        let appointments = self
            .store
            .query_appointments(&owner_id, zone::month_span_utc(month)?)
            .await?;
        Ok(appointments.len())
    }

    /// Days of the month a guest can open, as of today.
    pub fn bookable_days(&self, month: NaiveDate) -> Vec<NaiveDate> {
        rules::bookable_days_in_month(month, self.today(), &self.holidays)
    }

    pub fn holidays(&self, year: i32) -> Arc<HolidayTable> {
        self.holidays.table(year)
    }
}
