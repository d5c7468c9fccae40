// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vehicle and booking operations of the signed-in user.

use crate::error::{AppError, ErrorKind};
use crate::models::{Booking, CreateBookingInput, Vehicle, VehicleInput, VehicleUpdate};
use crate::services::backend::AccountBackend;
use crate::services::parking::ParkingService;
use crate::services::session::SessionManager;
use std::sync::Arc;

/// Default page size for `my_bookings`.
pub const DEFAULT_BOOKING_PAGE: u32 = 20;

/// Account service.
///
/// Every call goes through [`SessionManager::authorized`], so a rejected
/// session is re-verified once before the call fails.
#[derive(Clone)]
pub struct AccountService {
    backend: Arc<dyn AccountBackend>,
    session: Arc<SessionManager>,
    parking: ParkingService,
}

impl AccountService {
    pub fn new(
        backend: Arc<dyn AccountBackend>,
        session: Arc<SessionManager>,
        parking: ParkingService,
    ) -> Self {
        Self {
            backend,
            session,
            parking,
        }
    }

    fn current_user_id(&self) -> Result<String, AppError> {
        self.session
            .user()
            .map(|u| u.id)
            .ok_or(AppError::NoCurrentIdentity)
    }

    fn require_id(kind: &str, id: &str) -> Result<String, AppError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::InvalidInput(format!("{kind} id is required")));
        }
        Ok(id.to_string())
    }

    // ─── Vehicles ───────────────────────────────────────────────

    pub async fn vehicles(&self) -> Result<Vec<Vehicle>, AppError> {
        let user_id = self.current_user_id()?;
        self.session
            .authorized(|| self.backend.user_vehicles(&user_id))
            .await
    }

    pub async fn add_vehicle(&self, input: &VehicleInput) -> Result<Vehicle, AppError> {
        if input.license_plate.trim().is_empty() {
            return Err(AppError::InvalidInput("license plate is required".to_string()));
        }
        let vehicle = self
            .session
            .authorized(|| self.backend.add_vehicle(input))
            .await?;
        tracing::info!(vehicle_id = %vehicle.id, "Vehicle added");
        Ok(vehicle)
    }

    pub async fn update_vehicle(&self, id: &str, update: &VehicleUpdate) -> Result<Vehicle, AppError> {
        let id = Self::require_id("vehicle", id)?;
        self.session
            .authorized(|| self.backend.update_vehicle(&id, update))
            .await
    }

    pub async fn delete_vehicle(&self, id: &str) -> Result<(), AppError> {
        let id = Self::require_id("vehicle", id)?;
        let response = self
            .session
            .authorized(|| self.backend.delete_vehicle(&id))
            .await?;
        if !response.success {
            return Err(AppError::backend(
                ErrorKind::BackendError,
                response
                    .message
                    .unwrap_or_else(|| format!("vehicle {id} was not deleted")),
            ));
        }
        tracing::info!(vehicle_id = %id, "Vehicle deleted");
        Ok(())
    }

    pub async fn set_default_vehicle(&self, id: &str) -> Result<Vehicle, AppError> {
        let id = Self::require_id("vehicle", id)?;
        self.session
            .authorized(|| self.backend.set_default_vehicle(&id))
            .await
    }

    // ─── Bookings ───────────────────────────────────────────────

    pub async fn my_bookings(&self, offset: u32, limit: u32) -> Result<Vec<Booking>, AppError> {
        let limit = if limit == 0 { DEFAULT_BOOKING_PAGE } else { limit };
        self.session
            .authorized(|| self.backend.my_bookings(offset, limit))
            .await
    }

    /// Create a booking. Cached availability is dropped afterwards.
    pub async fn create_booking(&self, input: &CreateBookingInput) -> Result<Booking, AppError> {
        Self::require_id("parking", &input.parking_id)?;
        let booking = self
            .session
            .authorized(|| self.backend.create_booking(input))
            .await?;
        self.parking.invalidate_availability();
        tracing::info!(booking_id = %booking.id, "Booking created");
        Ok(booking)
    }

    pub async fn cancel_booking(&self, id: &str) -> Result<Booking, AppError> {
        let id = Self::require_id("booking", id)?;
        let booking = self
            .session
            .authorized(|| self.backend.cancel_booking(&id))
            .await?;
        self.parking.invalidate_availability();
        tracing::info!(booking_id = %id, "Booking cancelled");
        Ok(booking)
    }

    pub async fn extend_booking(&self, id: &str, new_end_time: &str) -> Result<Booking, AppError> {
        let id = Self::require_id("booking", id)?;
        if new_end_time.trim().is_empty() {
            return Err(AppError::InvalidInput("new end time is required".to_string()));
        }
        let booking = self
            .session
            .authorized(|| self.backend.extend_booking(&id, new_end_time))
            .await?;
        self.parking.invalidate_availability();
        Ok(booking)
    }
}
