// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod booking;
pub mod parking;
pub mod token;
pub mod user;
pub mod vehicle;

pub use booking::{Booking, CreateBookingInput, MutationResponse, VehicleInfo};
pub use parking::{
    parse_coordinates, Capacity, CoordinateError, Coordinates, LegacyParkingSpot, NearbyQuery,
    Parking, ParkingAddress, ParkingListing,
};
pub use token::{BackendSession, IdentityToken, PhoneChallenge, ProviderSession};
pub use user::{RegistrationProfile, User};
pub use vehicle::{Vehicle, VehicleInput, VehicleUpdate};
