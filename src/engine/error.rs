use ulid::Ulid;

use crate::model::TimeWindow;

#[derive(Debug)]
pub enum BookingError {
    /// Start time is not strictly before end time.
    InvalidRange,
    /// Window falls outside the 06:00-19:00 operating hours.
    OutOfHours,
    /// Unknown facility or reservation id.
    NotFound(Ulid),
    /// A confirmed reservation already occupies part of the window.
    Conflict { with: Ulid, window: TimeWindow },
    AlreadyExists(Ulid),
    /// Facility still referenced by reservations.
    InUse(Ulid),
    /// Unrecognized status override value.
    InvalidStatus(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidRange => write!(f, "start time must be before end time"),
            BookingError::OutOfHours => {
                write!(f, "window falls outside operating hours 06:00-19:00")
            }
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::Conflict { with, window } => {
                write!(f, "conflict with reservation {with} at {window}")
            }
            BookingError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            BookingError::InUse(id) => {
                write!(f, "cannot delete facility {id}: has reservations")
            }
            BookingError::InvalidStatus(s) => write!(f, "unknown reservation status: {s}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}
