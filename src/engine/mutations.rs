//! The four mutating operations. Each holds the schedule write lock for its
//! entire duration and reports the notification monitors should receive.

use crate::model::{Booking, Span, render_abs};

use super::{Engine, EngineError, MutationOk, Notification};

impl Engine {
    /// Insert a new booking if the interval is valid and conflict-free.
    pub async fn book(
        &self,
        facility: &str,
        start: i32,
        end: i32,
    ) -> Result<MutationOk, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidTime);
        }
        let span = Span::new(start, end);

        let mut sched = self.write().await;
        let Some(fac) = sched.facilities.get_mut(facility) else {
            return Err(EngineError::UnknownFacility(facility.to_string()));
        };
        if fac.find_conflict(&span).is_some() {
            return Err(EngineError::Conflict);
        }

        let id = Self::next_confirmation_id();
        fac.insert_booking(Booking::new(id.clone(), span));

        Ok(MutationOk {
            message: format!(
                "Booked '{facility}' from {} to {}. ID={id}",
                render_abs(start),
                render_abs(end)
            ),
            notification: Some(Notification {
                facility: facility.to_string(),
                message: format!("New booking created: {id}"),
            }),
        })
    }

    /// Shift a booking by a signed minute offset. Transactional: the booking
    /// is removed, the new interval tested against the rest of the facility,
    /// and on any failure the original is restored unchanged.
    pub async fn change(&self, id: &str, offset_min: i32) -> Result<MutationOk, EngineError> {
        let mut sched = self.write().await;
        let Some(fac_name) = sched.host_facility(id) else {
            return Err(EngineError::BookingNotFound(id.to_string()));
        };
        let Some(fac) = sched.facilities.get_mut(&fac_name) else {
            return Err(EngineError::BookingNotFound(id.to_string()));
        };
        let Some(booking) = fac.remove_booking(id) else {
            return Err(EngineError::BookingNotFound(id.to_string()));
        };

        let new_start = booking.span.start.checked_add(offset_min);
        let new_end = booking.span.end.checked_add(offset_min);
        let (Some(new_start), Some(new_end)) = (new_start, new_end) else {
            fac.insert_booking(booking);
            return Err(EngineError::InvalidTime);
        };
        if new_end <= new_start {
            fac.insert_booking(booking);
            return Err(EngineError::InvalidTime);
        }

        let new_span = Span::new(new_start, new_end);
        if fac.find_conflict(&new_span).is_some() {
            fac.insert_booking(booking);
            return Err(EngineError::Conflict);
        }

        let mut updated = booking;
        updated.span = new_span;
        fac.insert_booking(updated);

        Ok(MutationOk {
            message: format!("Changed booking {id} by offset {offset_min} minutes successfully."),
            notification: Some(Notification {
                facility: fac_name,
                message: format!(
                    "Booking {id} changed using offset {offset_min} min: {} -> {}",
                    render_abs(new_start),
                    render_abs(new_end)
                ),
            }),
        })
    }

    /// Remove a booking. Idempotent: an unknown id still succeeds, with a
    /// message suggesting prior cancellation and no notification.
    pub async fn cancel(&self, id: &str) -> MutationOk {
        let mut sched = self.write().await;
        if let Some(fac_name) = sched.host_facility(id)
            && let Some(fac) = sched.facilities.get_mut(&fac_name)
        {
            fac.remove_booking(id);
            return MutationOk {
                message: format!("Canceled booking {id}"),
                notification: Some(Notification {
                    facility: fac_name,
                    message: format!("Booking {id} canceled"),
                }),
            };
        }
        MutationOk {
            message: format!("Booking {id} not found (already canceled?)"),
            notification: None,
        }
    }

    /// Append a participant. Duplicates are allowed — replaying the request
    /// appends again, which is what makes this the canonical workload for
    /// telling the two invocation semantics apart.
    pub async fn add_participant(
        &self,
        id: &str,
        participant: &str,
    ) -> Result<MutationOk, EngineError> {
        let mut sched = self.write().await;
        let Some(fac_name) = sched.host_facility(id) else {
            return Err(EngineError::BookingNotFound(id.to_string()));
        };
        let Some(fac) = sched.facilities.get_mut(&fac_name) else {
            return Err(EngineError::BookingNotFound(id.to_string()));
        };
        let Some(booking) = fac.bookings.iter_mut().find(|b| b.id == id) else {
            return Err(EngineError::BookingNotFound(id.to_string()));
        };

        booking.participants.push(participant.to_string());

        Ok(MutationOk {
            message: format!("Added participant={participant} to booking={id}"),
            notification: Some(Notification {
                facility: fac_name,
                message: format!("Participant {participant} added to booking {id}"),
            }),
        })
    }
}
