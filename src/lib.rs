//! hallpass — facility booking core.
//!
//! The booking engine decides whether a reservation may exist (interval
//! overlap on half-open `[start, end)` windows, per-facility-date
//! serialization of check-then-insert), the slot grid derives the
//! availability view, and the token service + access filter gate the
//! booking API with signed, revocable session tokens. State is
//! rebuilt from an append-only WAL on startup.

pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod session;
pub mod token;
pub mod wal;

pub use engine::{BookingError, Engine, DEFAULT_SLOT_MINUTES};
pub use model::{
    Facility, FacilityRequest, Reservation, ReservationRequest, ReservationStatus, Slot,
    TimeWindow,
};
pub use session::{AccessDecision, AccessFilter, AuthenticatedUser};
pub use token::{Principal, TokenError, TokenService};
