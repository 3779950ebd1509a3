//! The booking engine: facilities, bookings and the scheduling invariants.
//!
//! All state lives in one [`Schedule`] behind a single `RwLock`. Mutations
//! hold the write lock for their whole duration — Change's
//! remove-test-restore runs under one acquisition — and Query holds the read
//! lock. The lock is always released before any reply reaches the socket.

mod availability;
mod error;
mod mutations;
mod queries;

pub use availability::{clip_to_day, day_bounds, free_intervals, hhmm, render_free_intervals};
pub use error::EngineError;

use std::collections::HashMap;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::{Booking, Facility, Span, WeekTime};

/// A schedule change that monitors of the facility should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub facility: String,
    pub message: String,
}

/// Successful mutation outcome: the reply text plus an optional monitor
/// notification. Cancel of an unknown id succeeds without one.
#[derive(Debug, Clone)]
pub struct MutationOk {
    pub message: String,
    pub notification: Option<Notification>,
}

pub(super) struct Schedule {
    facilities: HashMap<String, Facility>,
}

impl Schedule {
    fn new() -> Self {
        Self {
            facilities: HashMap::new(),
        }
    }

    fn facility(&self, name: &str) -> Option<&Facility> {
        self.facilities.get(name)
    }

    /// Name of the facility holding the booking, if any. Linear scan — the
    /// expected store is small (spec'd secondary index not needed yet).
    fn host_facility(&self, id: &str) -> Option<String> {
        self.facilities
            .iter()
            .find(|(_, f)| f.find_booking(id).is_some())
            .map(|(name, _)| name.clone())
    }
}

pub struct Engine {
    schedule: RwLock<Schedule>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with no facilities. Mostly useful in tests.
    pub fn new() -> Self {
        Self {
            schedule: RwLock::new(Schedule::new()),
        }
    }

    /// The startup store: two facilities with a few bookings so the service
    /// is non-empty from the first request.
    pub fn seeded() -> Self {
        let engine = Self::new();
        {
            let mut sched = engine
                .schedule
                .try_write()
                .expect("seeding: uncontended write");

            let mut room_a = Facility::new("RoomA");
            room_a.insert_booking(Booking::new(
                "BKG-10000".into(),
                span_of((0, 9, 0), (0, 10, 0)),
            ));
            room_a.insert_booking(Booking::new(
                "BKG-10001".into(),
                span_of((1, 14, 0), (1, 15, 30)),
            ));
            sched.facilities.insert(room_a.name.clone(), room_a);

            let mut lab1 = Facility::new("Lab1");
            lab1.insert_booking(Booking::new(
                "BKG-20000".into(),
                span_of((2, 10, 0), (2, 12, 0)),
            ));
            sched.facilities.insert(lab1.name.clone(), lab1);
        }
        engine
    }

    /// Confirmation ids are `BKG-<ulid>`: opaque and unique for the server
    /// process lifetime.
    pub(super) fn next_confirmation_id() -> String {
        format!("BKG-{}", Ulid::new())
    }

    pub async fn facility_exists(&self, name: &str) -> bool {
        self.schedule.read().await.facility(name).is_some()
    }

    /// Locate a booking across all facilities, returning a clone.
    pub async fn booking(&self, id: &str) -> Option<Booking> {
        let sched = self.schedule.read().await;
        sched
            .facilities
            .values()
            .find_map(|f| f.find_booking(id).cloned())
    }

    /// Snapshot of the whole store. Inspection and test helper.
    pub async fn facilities(&self) -> Vec<Facility> {
        self.schedule.read().await.facilities.values().cloned().collect()
    }

    pub(super) async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, Schedule> {
        self.schedule.write().await
    }

    pub(super) async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, Schedule> {
        self.schedule.read().await
    }
}

fn span_of(start: (u8, u8, u8), end: (u8, u8, u8)) -> Span {
    let s = WeekTime {
        day: start.0,
        hour: start.1,
        min: start.2,
    };
    let e = WeekTime {
        day: end.0,
        hour: end.1,
        min: end.2,
    };
    Span::new(s.to_minutes(), e.to_minutes())
}
