use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_request};
use super::{BookingError, Engine, SharedDaySchedule};

fn validate_facility_request(req: &FacilityRequest) -> Result<(), BookingError> {
    if req.name.is_empty() || req.name.len() > MAX_NAME_LEN {
        return Err(BookingError::LimitExceeded("facility name length"));
    }
    if req.location.len() > MAX_LOCATION_LEN {
        return Err(BookingError::LimitExceeded("facility location too long"));
    }
    if let Some(ref category) = req.category
        && category.len() > MAX_CATEGORY_LEN {
            return Err(BookingError::LimitExceeded("facility category too long"));
        }
    Ok(())
}

fn parse_status_override(
    status: &Option<String>,
) -> Result<Option<ReservationStatus>, BookingError> {
    match status {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|()| BookingError::InvalidStatus(s.clone())),
    }
}

impl Engine {
    pub async fn create_facility(
        &self,
        id: Ulid,
        req: &FacilityRequest,
    ) -> Result<Facility, BookingError> {
        validate_facility_request(req)?;
        if self.facilities.len() >= MAX_FACILITIES {
            return Err(BookingError::LimitExceeded("too many facilities"));
        }
        if self.facilities.contains_key(&id) {
            return Err(BookingError::AlreadyExists(id));
        }

        let facility = Facility {
            id,
            name: req.name.clone(),
            location: req.location.clone(),
            capacity: req.capacity,
            category: req.category.clone().unwrap_or_default(),
        };
        self.wal_append(Event::FacilityCreated {
            facility: facility.clone(),
        })
        .await?;
        self.facilities.insert(id, facility.clone());
        Ok(facility)
    }

    /// Administrative edit. A missing category leaves the stored one
    /// unchanged.
    pub async fn update_facility(
        &self,
        id: Ulid,
        req: &FacilityRequest,
    ) -> Result<Facility, BookingError> {
        validate_facility_request(req)?;
        let current = self
            .get_facility(&id)
            .ok_or(BookingError::NotFound(id))?;

        let facility = Facility {
            id,
            name: req.name.clone(),
            location: req.location.clone(),
            capacity: req.capacity,
            category: req.category.clone().unwrap_or(current.category),
        };
        self.wal_append(Event::FacilityUpdated {
            facility: facility.clone(),
        })
        .await?;
        self.facilities.insert(id, facility.clone());
        Ok(facility)
    }

    /// Removal is blocked while any reservation (whatever its status)
    /// still references the facility.
    pub async fn delete_facility(&self, id: Ulid) -> Result<(), BookingError> {
        if !self.facilities.contains_key(&id) {
            return Err(BookingError::NotFound(id));
        }
        if self.facility_in_use(&id) {
            return Err(BookingError::InUse(id));
        }

        self.wal_append(Event::FacilityDeleted { id }).await?;
        self.facilities.remove(&id);
        self.days.retain(|key, _| key.0 != id);
        Ok(())
    }

    /// Create a reservation. The facility check, conflict scan, WAL
    /// append and insert all happen under the day's write lock, so two
    /// concurrent creates for overlapping windows serialize and exactly
    /// one of them fails with `Conflict`.
    pub async fn create_reservation(
        &self,
        id: Ulid,
        req: &ReservationRequest,
    ) -> Result<Reservation, BookingError> {
        validate_request(req)?;
        if self.index.contains_key(&id) {
            return Err(BookingError::AlreadyExists(id));
        }
        if !self.facilities.contains_key(&req.facility_id) {
            return Err(BookingError::NotFound(req.facility_id));
        }

        let day = self.day_entry((req.facility_id, req.date));
        let mut guard = day.write().await;
        if guard.len() >= MAX_RESERVATIONS_PER_DAY {
            return Err(BookingError::LimitExceeded(
                "too many reservations for facility/date",
            ));
        }
        check_no_conflict(&guard, &req.window, None).inspect_err(|_| {
            metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
        })?;

        let reservation = Reservation {
            id,
            facility_id: req.facility_id,
            requester: req.requester.clone(),
            date: req.date,
            window: req.window,
            status: ReservationStatus::Confirmed,
            notes: req.notes.clone(),
        };
        self.wal_append(Event::ReservationCreated {
            reservation: reservation.clone(),
        })
        .await?;
        guard.insert(reservation.clone());
        self.index.insert(id, (req.facility_id, req.date));
        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        Ok(reservation)
    }

    /// Full-replacement update. The conflict scan excludes the updated
    /// reservation so an unchanged window never conflicts with itself.
    /// `req.status` is an optional admin override, parsed
    /// case-insensitively.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        req: &ReservationRequest,
    ) -> Result<Reservation, BookingError> {
        validate_request(req)?;
        let status_override = parse_status_override(&req.status)?;
        let old_key = self.day_key_of(&id).ok_or(BookingError::NotFound(id))?;
        if !self.facilities.contains_key(&req.facility_id) {
            return Err(BookingError::NotFound(req.facility_id));
        }
        let new_key = (req.facility_id, req.date);

        if new_key == old_key {
            let day = self.day_arc(&old_key).ok_or(BookingError::NotFound(id))?;
            let mut guard = day.write().await;
            let current = guard
                .get(&id)
                .cloned()
                .ok_or(BookingError::NotFound(id))?;
            check_no_conflict(&guard, &req.window, Some(id)).inspect_err(|_| {
                metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            })?;

            let updated = build_update(id, req, current.status, status_override);
            self.wal_append(Event::ReservationUpdated {
                reservation: updated.clone(),
            })
            .await?;
            guard.remove(&id);
            guard.insert(updated.clone());
            Ok(updated)
        } else {
            let old_day = self.day_arc(&old_key).ok_or(BookingError::NotFound(id))?;
            let new_day = self.day_entry(new_key);
            // Acquire both schedule locks in key order so a concurrent
            // move in the opposite direction cannot deadlock with us.
            let (mut old_guard, mut new_guard) =
                lock_pair_ordered(old_key < new_key, old_day, new_day).await;

            if new_guard.len() >= MAX_RESERVATIONS_PER_DAY {
                return Err(BookingError::LimitExceeded(
                    "too many reservations for facility/date",
                ));
            }
            let current = old_guard
                .get(&id)
                .cloned()
                .ok_or(BookingError::NotFound(id))?;
            check_no_conflict(&new_guard, &req.window, Some(id)).inspect_err(|_| {
                metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            })?;

            let updated = build_update(id, req, current.status, status_override);
            self.wal_append(Event::ReservationUpdated {
                reservation: updated.clone(),
            })
            .await?;
            old_guard.remove(&id);
            new_guard.insert(updated.clone());
            self.index.insert(id, new_key);
            Ok(updated)
        }
    }

    /// Idempotent soft delete: the row is kept with status `Cancelled`
    /// and its window becomes bookable again. Cancelling twice is a
    /// no-op success.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let (_, mut guard) = self.resolve_reservation_write(&id).await?;
        let current = guard
            .get(&id)
            .cloned()
            .ok_or(BookingError::NotFound(id))?;
        if current.status == ReservationStatus::Cancelled {
            return Ok(current);
        }

        self.wal_append(Event::ReservationCancelled { id }).await?;
        let cancelled = guard
            .set_status(&id, ReservationStatus::Cancelled)
            .cloned()
            .expect("row present under write lock");
        metrics::counter!(observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        Ok(cancelled)
    }

    /// Hard removal — the record is gone from listings and history.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<(), BookingError> {
        let (_, mut guard) = self.resolve_reservation_write(&id).await?;
        if guard.get(&id).is_none() {
            return Err(BookingError::NotFound(id));
        }

        self.wal_append(Event::ReservationDeleted { id }).await?;
        guard.remove(&id);
        self.index.remove(&id);
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let mut events = Vec::new();
        for entry in self.facilities.iter() {
            events.push(Event::FacilityCreated {
                facility: entry.value().clone(),
            });
        }
        let days: Vec<SharedDaySchedule> =
            self.days.iter().map(|e| e.value().clone()).collect();
        for day in days {
            let guard = day.read().await;
            for reservation in guard.iter() {
                events.push(Event::ReservationCreated {
                    reservation: reservation.clone(),
                });
            }
        }
        self.wal
            .compact(events)
            .await
            .map_err(|e| BookingError::WalError(e.to_string()))
    }
}

fn build_update(
    id: Ulid,
    req: &ReservationRequest,
    current_status: ReservationStatus,
    status_override: Option<ReservationStatus>,
) -> Reservation {
    Reservation {
        id,
        facility_id: req.facility_id,
        requester: req.requester.clone(),
        date: req.date,
        window: req.window,
        status: status_override.unwrap_or(current_status),
        notes: req.notes.clone(),
    }
}

async fn lock_pair_ordered(
    first_is_old: bool,
    old_day: SharedDaySchedule,
    new_day: SharedDaySchedule,
) -> (
    tokio::sync::OwnedRwLockWriteGuard<DaySchedule>,
    tokio::sync::OwnedRwLockWriteGuard<DaySchedule>,
) {
    if first_is_old {
        let old_guard = old_day.write_owned().await;
        let new_guard = new_day.write_owned().await;
        (old_guard, new_guard)
    } else {
        let new_guard = new_day.write_owned().await;
        let old_guard = old_day.write_owned().await;
        (old_guard, new_guard)
    }
}
