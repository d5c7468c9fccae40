// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GraphQL operation documents.

const USER_FIELDS: &str = "
      id
      firstName
      lastName
      email
      phoneNumber
      role
      isVerified
      isActive
      profilePicture
      lastLoginAt
      address { street city state zipCode country }
      preferences { notifications emailNotifications smsNotifications }";

const PARKING_FIELDS: &str = "
      id
      name
      description
      totalSpaces
      availableSpaces
      coordinates
      address { street city state zipCode country }";

const VEHICLE_FIELDS: &str = "
      id
      userId
      make
      model
      year
      color
      licensePlate
      isDefault";

const BOOKING_FIELDS: &str = "
      id
      userId
      parkingId
      bookingReference
      startTime
      endTime
      status
      totalAmount
      vehicleInfo { licensePlate vehicleType color make model }";

// ─── Session ─────────────────────────────────────────────────────────────────

pub fn verify_identity_token() -> String {
    "mutation VerifyIdentityToken($token: String!) {
    verifyFirebaseToken(token: $token) {
      success
      message
      userExists
    }
  }"
    .to_string()
}

pub fn login_with_identity() -> String {
    format!(
        "mutation LoginWithIdentity($input: FirebaseLoginInput!) {{
    loginWithFirebase(input: $input) {{
      success
      message
      token
      user {{{USER_FIELDS}
      }}
    }}
  }}"
    )
}

pub fn register_with_identity() -> String {
    format!(
        "mutation RegisterWithIdentity($input: FirebaseRegisterInput!) {{
    registerWithFirebase(input: $input) {{
      success
      message
      token
      user {{{USER_FIELDS}
      }}
    }}
  }}"
    )
}

pub fn me() -> String {
    format!(
        "query GetMe {{
    me {{{USER_FIELDS}
    }}
  }}"
    )
}

// ─── Parkings ────────────────────────────────────────────────────────────────

pub fn all_parkings() -> String {
    format!(
        "query GetAllParkings {{
    parkings {{{PARKING_FIELDS}
    }}
  }}"
    )
}

pub fn parking_by_id() -> String {
    format!(
        "query GetParkingById($id: ID!) {{
    parking(id: $id) {{{PARKING_FIELDS}
    }}
  }}"
    )
}

pub fn nearby_parkings() -> String {
    format!(
        "query GetNearbyParkings($maxDistance: Float!, $longitude: Float!, $latitude: Float!) {{
    nearbyParkings(maxDistance: $maxDistance, longitude: $longitude, latitude: $latitude) {{{PARKING_FIELDS}
    }}
  }}"
    )
}

pub fn parkings_by_city() -> String {
    format!(
        "query GetParkingsByCity($city: String!) {{
    parkingsByCity(city: $city) {{{PARKING_FIELDS}
    }}
  }}"
    )
}

// ─── Vehicles ────────────────────────────────────────────────────────────────

pub fn user_vehicles() -> String {
    format!(
        "query GetUserVehicles($userId: ID!) {{
    userVehicles(userId: $userId) {{{VEHICLE_FIELDS}
    }}
  }}"
    )
}

pub fn add_vehicle() -> String {
    format!(
        "mutation AddVehicle($input: AddVehicleInput!) {{
    addVehicle(input: $input) {{{VEHICLE_FIELDS}
    }}
  }}"
    )
}

pub fn update_vehicle() -> String {
    format!(
        "mutation UpdateVehicle($vehicleId: ID!, $input: UpdateVehicleInput!) {{
    updateVehicle(id: $vehicleId, input: $input) {{{VEHICLE_FIELDS}
    }}
  }}"
    )
}

pub fn delete_vehicle() -> String {
    "mutation DeleteVehicle($vehicleId: ID!) {
    deleteVehicle(id: $vehicleId) {
      success
      message
    }
  }"
    .to_string()
}

pub fn set_default_vehicle() -> String {
    format!(
        "mutation SetDefaultVehicle($vehicleId: ID!) {{
    setDefaultVehicle(id: $vehicleId) {{{VEHICLE_FIELDS}
    }}
  }}"
    )
}

// ─── Bookings ────────────────────────────────────────────────────────────────

pub fn my_bookings() -> String {
    format!(
        "query GetMyBookings($offset: Int, $limit: Int) {{
    myBookings(offset: $offset, limit: $limit) {{{BOOKING_FIELDS}
    }}
  }}"
    )
}

pub fn create_booking() -> String {
    format!(
        "mutation CreateBooking($input: CreateBookingInput!) {{
    createBooking(input: $input) {{{BOOKING_FIELDS}
    }}
  }}"
    )
}

pub fn cancel_booking() -> String {
    "mutation CancelBooking($bookingId: ID!) {
    cancelBooking(id: $bookingId) {
      id
      status
    }
  }"
    .to_string()
}

pub fn extend_booking() -> String {
    "mutation ExtendBooking($bookingId: ID!, $newEndTime: DateTime!) {
    extendBooking(id: $bookingId, newEndTime: $newEndTime) {
      id
      endTime
      status
      totalAmount
    }
  }"
    .to_string()
}
