mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;

pub use error::BookingError;
pub use slots::{mark_slots, DEFAULT_SLOT_MINUTES};

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::{Wal, WalHandle};

/// One facility's schedule for one calendar date — the unit of mutual
/// exclusion for the conflict-check-then-insert sequence.
pub(crate) type DayKey = (Ulid, NaiveDate);

pub type SharedDaySchedule = Arc<RwLock<DaySchedule>>;

/// The booking engine. Sole mutator of reservation state: every write
/// goes through the WAL and the per-facility-date schedule lock.
pub struct Engine {
    facilities: DashMap<Ulid, Facility>,
    days: DashMap<DayKey, SharedDaySchedule>,
    /// Reverse lookup: reservation id → the facility/date it lives under.
    index: DashMap<Ulid, DayKey>,
    wal: WalHandle,
}

impl Engine {
    pub fn new(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = WalHandle::spawn(Wal::open(wal_path)?);

        let engine = Self {
            facilities: DashMap::new(),
            days: DashMap::new(),
            index: DashMap::new(),
            wal,
        };

        // Replay — we're the sole owner of the schedule Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking
        // acquisition here because this may run inside an async context.
        for event in events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    fn replay_event(&self, event: Event) {
        match event {
            Event::FacilityCreated { facility } | Event::FacilityUpdated { facility } => {
                self.facilities.insert(facility.id, facility);
            }
            Event::FacilityDeleted { id } => {
                self.facilities.remove(&id);
            }
            Event::ReservationCreated { reservation } => {
                let id = reservation.id;
                let key = (reservation.facility_id, reservation.date);
                let day = self.day_entry(key);
                day.try_write()
                    .expect("replay: uncontended write")
                    .insert(reservation);
                self.index.insert(id, key);
            }
            Event::ReservationUpdated { reservation } => {
                let id = reservation.id;
                let new_key = (reservation.facility_id, reservation.date);
                if let Some(old_key) = self.index.get(&id).map(|e| *e.value())
                    && old_key != new_key
                    && let Some(old_day) = self.day_arc(&old_key)
                {
                    old_day
                        .try_write()
                        .expect("replay: uncontended write")
                        .remove(&id);
                }
                let day = self.day_entry(new_key);
                {
                    let mut guard = day.try_write().expect("replay: uncontended write");
                    guard.remove(&id);
                    guard.insert(reservation);
                }
                self.index.insert(id, new_key);
            }
            Event::ReservationCancelled { id } => {
                if let Some(key) = self.index.get(&id).map(|e| *e.value())
                    && let Some(day) = self.day_arc(&key)
                {
                    day.try_write()
                        .expect("replay: uncontended write")
                        .set_status(&id, ReservationStatus::Cancelled);
                }
            }
            Event::ReservationDeleted { id } => {
                if let Some((_, key)) = self.index.remove(&id)
                    && let Some(day) = self.day_arc(&key)
                {
                    day.try_write()
                        .expect("replay: uncontended write")
                        .remove(&id);
                }
            }
        }
    }

    /// Write an event through the background group-commit writer.
    pub(super) async fn wal_append(&self, event: Event) -> Result<(), BookingError> {
        self.wal
            .append(event)
            .await
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    pub(super) fn day_entry(&self, key: DayKey) -> SharedDaySchedule {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DaySchedule::new())))
            .clone()
    }

    pub(super) fn day_arc(&self, key: &DayKey) -> Option<SharedDaySchedule> {
        self.days.get(key).map(|e| e.value().clone())
    }

    /// Lookup reservation → day key, then acquire that day's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: &Ulid,
    ) -> Result<(DayKey, OwnedRwLockWriteGuard<DaySchedule>), BookingError> {
        let key = self
            .index
            .get(id)
            .map(|e| *e.value())
            .ok_or(BookingError::NotFound(*id))?;
        let day = self.day_arc(&key).ok_or(BookingError::NotFound(*id))?;
        let guard = day.write_owned().await;
        Ok((key, guard))
    }

    pub(super) fn day_key_of(&self, id: &Ulid) -> Option<DayKey> {
        self.index.get(id).map(|e| *e.value())
    }

    pub(super) fn facility_in_use(&self, facility_id: &Ulid) -> bool {
        self.index.iter().any(|e| &e.value().0 == facility_id)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}
