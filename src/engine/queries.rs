//! The Query operation: renders per-day bookings and free intervals.

use crate::model::Facility;

use super::availability::{clip_to_day, day_bounds, free_intervals, hhmm, render_free_intervals};
use super::Engine;

impl Engine {
    /// Availability report for the requested days, in request order. A
    /// missing facility yields a single-line error string with status 0 —
    /// the text, not the status integer, carries the diagnosis here.
    pub async fn query(&self, facility: &str, days: &[u8]) -> String {
        let sched = self.read().await;
        let Some(fac) = sched.facility(facility) else {
            return format!("Error: Facility '{facility}' not found");
        };

        let mut out = format!("Facility {facility} availability:\n");
        for &day in days {
            out.push_str(&format!("Day {day}:\n"));
            out.push_str("Current bookings:\n");
            out.push_str(&render_day_bookings(fac, day));
            out.push_str(&format!(
                "Available timings: {}\n\n",
                render_free_intervals(day, &free_intervals(day, &fac.bookings))
            ));
        }
        out
    }
}

/// Every booking intersecting `day`, clipped to the day for display.
fn render_day_bookings(fac: &Facility, day: u8) -> String {
    let base = day_bounds(day).start;
    let mut out = String::new();
    for booking in &fac.bookings {
        let Some(clipped) = clip_to_day(&booking.span, day) else {
            continue;
        };
        out.push_str(&format!(
            "  - {}: {} to {}\n",
            booking.id,
            hhmm(clipped.start - base),
            hhmm(clipped.end - base)
        ));
        if !booking.participants.is_empty() {
            out.push_str(&format!(
                "      Participants: [{}]\n",
                booking.participants.join(", ")
            ));
        }
    }
    if out.is_empty() {
        out.push_str("  None\n");
    }
    out
}
