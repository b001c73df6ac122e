use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open time interval `[start, end)` on a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeWindow start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Campus operating hours: reservations must fall within 06:00-19:00.
pub fn open_time() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 0, 0).expect("06:00 is a valid wall-clock time")
}

pub fn close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(19, 0, 0).expect("19:00 is a valid wall-clock time")
}

pub fn operating_hours() -> TimeWindow {
    TimeWindow::new(open_time(), close_time())
}

/// Reservation lifecycle state. Only `Confirmed` reservations participate
/// in conflict detection; cancelled and completed rows are history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ReservationStatus::Confirmed)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

impl FromStr for ReservationStatus {
    type Err = ();

    /// Case-insensitive: admin status overrides arrive in arbitrary casing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            "COMPLETED" => Ok(ReservationStatus::Completed),
            _ => Err(()),
        }
    }
}

/// A bookable facility (room, lab, hall).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub capacity: u32,
    pub category: String,
}

/// A single reservation of a facility for a time window on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub facility_id: Ulid,
    /// Free-form requester identity, e.g. a student number.
    pub requester: String,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub status: ReservationStatus,
    pub notes: Option<String>,
}

/// Fields of a create/update request. `status` is honoured only on
/// updates (administrative override); creates always confirm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub facility_id: Ulid,
    pub requester: String,
    pub date: NaiveDate,
    pub window: TimeWindow,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityRequest {
    pub name: String,
    pub location: String,
    pub capacity: u32,
    /// `None` on update means "leave the category unchanged".
    #[serde(default)]
    pub category: Option<String>,
}

/// One cell of the availability grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub booked: bool,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FacilityCreated { facility: Facility },
    FacilityUpdated { facility: Facility },
    FacilityDeleted { id: Ulid },
    ReservationCreated { reservation: Reservation },
    ReservationUpdated { reservation: Reservation },
    ReservationCancelled { id: Ulid },
    ReservationDeleted { id: Ulid },
}

/// All reservations (any status) for one facility on one date,
/// sorted by window start.
#[derive(Debug, Default)]
pub struct DaySchedule {
    reservations: Vec<Reservation>,
}

impl DaySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reservation> {
        self.reservations.iter()
    }

    /// Insert maintaining sort order by window start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.window.start, |r| r.window.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| &r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| &r.id == id)
    }

    pub fn set_status(&mut self, id: &Ulid, status: ReservationStatus) -> Option<&Reservation> {
        let r = self.reservations.iter_mut().find(|r| &r.id == id)?;
        r.status = status;
        Some(r)
    }

    /// Return only reservations whose window overlaps the query window.
    /// Uses binary search to skip rows starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeWindow) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.window.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.window.end > query.start)
    }

    /// Confirmed windows only — the pre-fetched snapshot the slot grid runs over.
    pub fn confirmed_windows(&self) -> Vec<TimeWindow> {
        self.reservations
            .iter()
            .filter(|r| r.status.is_confirmed())
            .map(|r| r.window)
            .collect()
    }
}
