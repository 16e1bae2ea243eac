use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ulid::Ulid;
use uuid::Uuid;

use crate::limits::MAX_GUEST_NAME_LEN;
use crate::model::*;
use crate::observability;
use crate::rules;
use crate::store::AppointmentStore;
use crate::zone;

use super::{BookingError, Engine};

/// What a guest submits. Times are owner-local wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub owner_id: String,
    pub link_id: Uuid,
    pub day: NaiveDate,
    pub from: NaiveTime,
    pub duration_minutes: i64,
    pub guest_first_name: String,
    pub guest_last_name: String,
}

fn clean_guest_name(raw: &str) -> Result<String, BookingError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(BookingError::InvalidGuestName("name is empty"));
    }
    if name.chars().count() > MAX_GUEST_NAME_LEN {
        return Err(BookingError::InvalidGuestName("name is too long"));
    }
    Ok(name.to_string())
}

/// The requested meeting as UTC instants. Must sit inside business hours.
fn requested_span(request: &BookingRequest) -> Result<Span, BookingError> {
    if request.duration_minutes <= 0 {
        return Err(BookingError::InvalidTime("duration must be positive"));
    }
    if request.duration_minutes > rules::business_day_length().num_minutes() {
        return Err(BookingError::InvalidTime("meeting must fit between 09:00 and 16:00"));
    }
    let start = request.day.and_time(request.from);
    let end = TimeDelta::try_minutes(request.duration_minutes)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or(BookingError::InvalidTime("duration out of range"))?;
    let (open, close) = rules::business_hours(request.day);
    if start < open || end > close {
        return Err(BookingError::InvalidTime("meeting must fit between 09:00 and 16:00"));
    }
    Ok(Span::new(zone::local_to_utc(start)?, zone::local_to_utc(end)?))
}

impl<S: AppointmentStore> Engine<S> {
    /// Issue a fresh single-use link for `owner_id`.
    pub async fn create_share_link(&self, owner_id: &str) -> Result<ShareLink, BookingError> {
        let link = ShareLink::new(normalize_owner_id(owner_id), self.clock.now());
        self.store.insert_share_link(link.clone()).await?;
        info!(owner = %link.owner_id, link = %link.id, "share link created");
        Ok(link)
    }

    /// Validate and commit a booking. On success the link is consumed in the
    /// same atomic write as the appointment insert.
    pub async fn try_book(&self, request: BookingRequest) -> Result<Appointment, BookingError> {
        let started = std::time::Instant::now();
        let result = self.book(request).await;

        let outcome = match &result {
            Ok(_) => "booked",
            Err(e) => e.code(),
        };
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn book(&self, request: BookingRequest) -> Result<Appointment, BookingError> {
        let owner_id = normalize_owner_id(&request.owner_id);

        let link = self
            .store
            .find_share_link(request.link_id, &owner_id)
            .await?
            .ok_or(BookingError::InvalidLink)?;
        if link.is_used {
            return Err(BookingError::LinkAlreadyUsed);
        }

        let now = self.clock.now();
        if !rules::is_bookable_day(request.day, zone::today(now), &self.holidays) {
            return Err(BookingError::DayNotAllowed);
        }

        let span = requested_span(&request)?;
        let guest_first_name = clean_guest_name(&request.guest_first_name)?;
        let guest_last_name = clean_guest_name(&request.guest_last_name)?;

        let mut tx = self.store.begin(&owner_id).await?;
        match tx.find_share_link(link.id).await? {
            None => return Err(BookingError::InvalidLink),
            Some(fresh) if fresh.is_used => return Err(BookingError::LinkAlreadyUsed),
            Some(_) => {}
        }
        let existing: Vec<Span> = tx
            .query_appointments(zone::day_span_utc(request.day)?)
            .await?
            .iter()
            .map(Appointment::span)
            .collect();
        if !rules::respects_daily_limit(&existing) {
            debug!(owner = %owner_id, day = %request.day, "daily limit reached");
            return Err(BookingError::DailyLimitReached);
        }
        if !rules::fits_with_buffer(&span, &existing) {
            debug!(owner = %owner_id, start = %span.start, "slot collides with buffer");
            return Err(BookingError::SlotConflict);
        }

        let appointment = Appointment {
            id: Ulid::new(),
            owner_id,
            start_utc: span.start,
            end_utc: span.end,
            share_link_id: link.id,
            guest_first_name,
            guest_last_name,
            created_utc: now,
        };
        tx.insert_appointment(appointment.clone());
        tx.mark_link_used(link.id);
        if let Err(e) = tx.commit().await {
            debug!(owner = %appointment.owner_id, "booking commit failed: {e}");
            return Err(e.into());
        }

        info!(
            owner = %appointment.owner_id,
            appointment = %appointment.id,
            start = %appointment.start_utc,
            "appointment booked"
        );
        Ok(appointment)
    }
}
