// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend API: operation traits and the GraphQL implementation.
//!
//! The traits are the seams the session manager, parking service and
//! account service depend on; [`GraphQlBackend`] implements all three over
//! a single reqwest client.

use crate::error::{AppError, ErrorKind};
use crate::models::{
    Booking, CreateBookingInput, MutationResponse, NearbyQuery, User, Vehicle, VehicleInput,
    VehicleUpdate,
};
use crate::services::queries;
use crate::store::TokenStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ─── Envelopes ───────────────────────────────────────────────────────────────

/// Answer of `verifyFirebaseToken`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Whether a backend user record exists for the token's subject
    #[serde(default)]
    pub user_exists: bool,
}

/// Answer of the login and register mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl SessionResponse {
    fn rejected(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            token: None,
            user: None,
        }
    }
}

/// Input of `loginWithFirebase`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityLogin {
    pub firebase_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Input of `registerWithFirebase`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRegistration {
    pub firebase_uid: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Session-establishing operations.
///
/// A `success=false` answer is returned as `Ok`; `Err` means the call itself
/// failed (transport, unreadable answer).
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn verify_identity_token(&self, id_token: &str) -> Result<VerifyResponse, AppError>;

    async fn login_with_identity(&self, input: &IdentityLogin) -> Result<SessionResponse, AppError>;

    async fn register_with_identity(
        &self,
        input: &IdentityRegistration,
    ) -> Result<SessionResponse, AppError>;

    /// Current user, using the stored backend session token.
    async fn current_user(&self) -> Result<User, AppError>;
}

/// Parking reads. Payloads are returned raw and converted by the caller.
#[async_trait]
pub trait ParkingBackend: Send + Sync {
    async fn all_parkings(&self) -> Result<Value, AppError>;

    async fn parking_by_id(&self, id: &str) -> Result<Value, AppError>;

    async fn nearby_parkings(&self, query: &NearbyQuery) -> Result<Value, AppError>;

    async fn parkings_by_city(&self, city: &str) -> Result<Value, AppError>;
}

/// Vehicle and booking operations of the signed-in user.
#[async_trait]
pub trait AccountBackend: Send + Sync {
    async fn user_vehicles(&self, user_id: &str) -> Result<Vec<Vehicle>, AppError>;

    async fn add_vehicle(&self, input: &VehicleInput) -> Result<Vehicle, AppError>;

    async fn update_vehicle(&self, id: &str, update: &VehicleUpdate) -> Result<Vehicle, AppError>;

    async fn delete_vehicle(&self, id: &str) -> Result<MutationResponse, AppError>;

    async fn set_default_vehicle(&self, id: &str) -> Result<Vehicle, AppError>;

    async fn my_bookings(&self, offset: u32, limit: u32) -> Result<Vec<Booking>, AppError>;

    async fn create_booking(&self, input: &CreateBookingInput) -> Result<Booking, AppError>;

    async fn cancel_booking(&self, id: &str) -> Result<Booking, AppError>;

    async fn extend_booking(&self, id: &str, new_end_time: &str) -> Result<Booking, AppError>;
}

// ─── GraphQL implementation ──────────────────────────────────────────────────

/// GraphQL client for the parking backend.
#[derive(Clone)]
pub struct GraphQlBackend {
    http: reqwest::Client,
    endpoint: String,
    tokens: TokenStore,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphQlError {
    fn is_unauthenticated(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .is_some_and(|code| code == "UNAUTHENTICATED")
    }
}

impl GraphQlBackend {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, tokens: TokenStore) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            tokens,
        }
    }

    /// Run an operation and return its `data` object.
    ///
    /// The stored backend session token is attached when `authenticated`.
    async fn execute(
        &self,
        query: &str,
        variables: Value,
        authenticated: bool,
    ) -> Result<Value, AppError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));

        if authenticated {
            if let Some(token) = self.tokens.current_session_token().await? {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await.map_err(AppError::network)?;
        let status = response.status();

        if status.as_u16() == 401 {
            return Err(AppError::Unauthorized);
        }
        if status.is_server_error() {
            return Err(AppError::Network(format!("backend HTTP {}", status)));
        }

        let body = response.text().await.map_err(AppError::network)?;
        let parsed: GraphQlResponse = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                AppError::backend(ErrorKind::BackendError, format!("unreadable response: {e}"))
            } else {
                AppError::backend(ErrorKind::BackendError, format!("HTTP {}: {}", status, body))
            }
        })?;

        if !parsed.errors.is_empty() {
            if parsed.errors.iter().any(GraphQlError::is_unauthenticated) {
                return Err(AppError::Unauthorized);
            }
            let message = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AppError::backend(ErrorKind::BackendError, message));
        }

        parsed
            .data
            .ok_or_else(|| AppError::backend(ErrorKind::BackendError, "response has no data"))
    }

    /// Run an operation and deserialize one top-level field of its data.
    async fn field<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        name: &str,
        authenticated: bool,
    ) -> Result<T, AppError> {
        let mut data = self.execute(query, variables, authenticated).await?;
        let value = data.get_mut(name).map(Value::take).unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            AppError::backend(ErrorKind::BackendError, format!("unexpected {name} payload: {e}"))
        })
    }

    /// Like [`Self::field`], but returns the raw value.
    async fn raw_field(&self, query: &str, variables: Value, name: &str) -> Result<Value, AppError> {
        let mut data = self.execute(query, variables, true).await?;
        Ok(data.get_mut(name).map(Value::take).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl AuthBackend for GraphQlBackend {
    async fn verify_identity_token(&self, id_token: &str) -> Result<VerifyResponse, AppError> {
        let result = self
            .field(
                &queries::verify_identity_token(),
                json!({ "token": id_token }),
                "verifyFirebaseToken",
                false,
            )
            .await;
        match result {
            Err(AppError::Backend { message, .. }) => Ok(VerifyResponse {
                success: false,
                message: Some(message),
                user_exists: false,
            }),
            other => other,
        }
    }

    async fn login_with_identity(&self, input: &IdentityLogin) -> Result<SessionResponse, AppError> {
        let result = self
            .field(
                &queries::login_with_identity(),
                json!({ "input": input }),
                "loginWithFirebase",
                false,
            )
            .await;
        match result {
            Err(AppError::Backend { message, .. }) => Ok(SessionResponse::rejected(message)),
            other => other,
        }
    }

    async fn register_with_identity(
        &self,
        input: &IdentityRegistration,
    ) -> Result<SessionResponse, AppError> {
        let result = self
            .field(
                &queries::register_with_identity(),
                json!({ "input": input }),
                "registerWithFirebase",
                false,
            )
            .await;
        match result {
            Err(AppError::Backend { message, .. }) => Ok(SessionResponse::rejected(message)),
            other => other,
        }
    }

    async fn current_user(&self) -> Result<User, AppError> {
        let user: Option<User> = self.field(&queries::me(), json!({}), "me", true).await?;
        user.ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl ParkingBackend for GraphQlBackend {
    async fn all_parkings(&self) -> Result<Value, AppError> {
        self.raw_field(&queries::all_parkings(), json!({}), "parkings")
            .await
    }

    async fn parking_by_id(&self, id: &str) -> Result<Value, AppError> {
        self.raw_field(&queries::parking_by_id(), json!({ "id": id }), "parking")
            .await
    }

    async fn nearby_parkings(&self, query: &NearbyQuery) -> Result<Value, AppError> {
        let variables = serde_json::to_value(query)
            .map_err(|e| AppError::Internal(format!("nearby variables: {e}")))?;
        self.raw_field(&queries::nearby_parkings(), variables, "nearbyParkings")
            .await
    }

    async fn parkings_by_city(&self, city: &str) -> Result<Value, AppError> {
        self.raw_field(
            &queries::parkings_by_city(),
            json!({ "city": city }),
            "parkingsByCity",
        )
        .await
    }
}

#[async_trait]
impl AccountBackend for GraphQlBackend {
    async fn user_vehicles(&self, user_id: &str) -> Result<Vec<Vehicle>, AppError> {
        let vehicles: Option<Vec<Vehicle>> = self
            .field(
                &queries::user_vehicles(),
                json!({ "userId": user_id }),
                "userVehicles",
                true,
            )
            .await?;
        Ok(vehicles.unwrap_or_default())
    }

    async fn add_vehicle(&self, input: &VehicleInput) -> Result<Vehicle, AppError> {
        self.field(
            &queries::add_vehicle(),
            json!({ "input": input }),
            "addVehicle",
            true,
        )
        .await
    }

    async fn update_vehicle(&self, id: &str, update: &VehicleUpdate) -> Result<Vehicle, AppError> {
        self.field(
            &queries::update_vehicle(),
            json!({ "vehicleId": id, "input": update }),
            "updateVehicle",
            true,
        )
        .await
    }

    async fn delete_vehicle(&self, id: &str) -> Result<MutationResponse, AppError> {
        self.field(
            &queries::delete_vehicle(),
            json!({ "vehicleId": id }),
            "deleteVehicle",
            true,
        )
        .await
    }

    async fn set_default_vehicle(&self, id: &str) -> Result<Vehicle, AppError> {
        self.field(
            &queries::set_default_vehicle(),
            json!({ "vehicleId": id }),
            "setDefaultVehicle",
            true,
        )
        .await
    }

    async fn my_bookings(&self, offset: u32, limit: u32) -> Result<Vec<Booking>, AppError> {
        let bookings: Option<Vec<Booking>> = self
            .field(
                &queries::my_bookings(),
                json!({ "offset": offset, "limit": limit }),
                "myBookings",
                true,
            )
            .await?;
        Ok(bookings.unwrap_or_default())
    }

    async fn create_booking(&self, input: &CreateBookingInput) -> Result<Booking, AppError> {
        self.field(
            &queries::create_booking(),
            json!({ "input": input }),
            "createBooking",
            true,
        )
        .await
    }

    async fn cancel_booking(&self, id: &str) -> Result<Booking, AppError> {
        self.field(
            &queries::cancel_booking(),
            json!({ "bookingId": id }),
            "cancelBooking",
            true,
        )
        .await
    }

    async fn extend_booking(&self, id: &str, new_end_time: &str) -> Result<Booking, AppError> {
        self.field(
            &queries::extend_booking(),
            json!({ "bookingId": id, "newEndTime": new_end_time }),
            "extendBooking",
            true,
        )
        .await
    }
}
