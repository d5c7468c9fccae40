// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use parkeasy_client::error::{AppError, ErrorKind};
use parkeasy_client::models::{
    Booking, CreateBookingInput, IdentityToken, MutationResponse, NearbyQuery, PhoneChallenge,
    ProviderSession, User, Vehicle, VehicleInput, VehicleUpdate,
};
use parkeasy_client::services::backend::{
    AccountBackend, AuthBackend, IdentityLogin, IdentityRegistration, ParkingBackend,
    SessionResponse, VerifyResponse,
};
use parkeasy_client::services::identity::IdentityProvider;
use parkeasy_client::services::{RetryPolicy, SessionManager};
use parkeasy_client::store::TokenStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Code accepted by the fake phone challenge.
#[allow(dead_code)]
pub const GOOD_CODE: &str = "123456";

#[allow(dead_code)]
pub fn uid_for(identifier: &str) -> String {
    format!("uid-{identifier}")
}

#[allow(dead_code)]
pub fn test_user(id: &str) -> User {
    serde_json::from_value(json!({
        "id": id,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "user@example.com",
    }))
    .expect("valid user")
}

// ─── Identity provider ───────────────────────────────────────────────────────

/// In-memory identity provider with call counters.
#[derive(Default)]
pub struct FakeIdentityProvider {
    accounts: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    /// Transport failures to return from `refresh` before succeeding
    pub refresh_network_failures: AtomicU32,
    pub refresh_rejected: AtomicBool,
    pub refresh_calls: AtomicUsize,
    refresh_gated: AtomicBool,
    refresh_gate: Notify,
    pub email_verified: AtomicBool,
    pub verification_emails: AtomicUsize,
    minted: AtomicUsize,
}

#[allow(dead_code)]
impl FakeIdentityProvider {
    pub fn with_account(email: &str, secret: &str) -> Self {
        let provider = Self::default();
        provider.add_account(email, secret);
        provider
    }

    pub fn add_account(&self, email: &str, secret: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), secret.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Hold every refresh until [`Self::release_refresh`] is called.
    pub fn gate_refresh(&self) {
        self.refresh_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_refresh(&self) {
        self.refresh_gated.store(false, Ordering::SeqCst);
        self.refresh_gate.notify_waiters();
        self.refresh_gate.notify_one();
    }

    pub fn mint(&self, subject: &str, email: Option<String>) -> ProviderSession {
        let n = self.minted.fetch_add(1, Ordering::SeqCst);
        ProviderSession {
            id_token: IdentityToken::from_parts(
                format!("idtoken-{subject}-{n}"),
                subject,
                3600,
                email,
            ),
            refresh_token: format!("refresh-{subject}"),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<ProviderSession, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let matches = self.accounts.lock().unwrap().get(email).map(|s| s == secret);
        match matches {
            Some(true) => Ok(self.mint(&uid_for(email), Some(email.to_string()))),
            _ => Err(AppError::identity(
                ErrorKind::InvalidCredentials,
                "INVALID_LOGIN_CREDENTIALS",
            )),
        }
    }

    async fn register_with_password(
        &self,
        email: &str,
        secret: &str,
        _display_name: &str,
    ) -> Result<ProviderSession, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(AppError::identity(
                ErrorKind::IdentifierAlreadyInUse,
                "EMAIL_EXISTS",
            ));
        }
        accounts.insert(email.to_string(), secret.to_string());
        drop(accounts);
        Ok(self.mint(&uid_for(email), Some(email.to_string())))
    }

    async fn send_email_verification(&self, _id_token: &str) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verification_emails.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_phone_challenge(&self, phone_number: &str) -> Result<PhoneChallenge, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PhoneChallenge {
            verification_id: format!("vid-{phone_number}"),
            phone_number: phone_number.to_string(),
        })
    }

    async fn confirm_phone_challenge(
        &self,
        challenge: &PhoneChallenge,
        code: &str,
    ) -> Result<ProviderSession, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if code != GOOD_CODE {
            return Err(AppError::identity(ErrorKind::InvalidChallengeCode, "INVALID_CODE"));
        }
        let mut session = self.mint(&uid_for(&challenge.phone_number), None);
        session.id_token.phone_number = Some(challenge.phone_number.clone());
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_gated.load(Ordering::SeqCst) {
            self.refresh_gate.notified().await;
        }
        if self.refresh_rejected.load(Ordering::SeqCst) {
            return Err(AppError::identity(
                ErrorKind::UnknownIdentityError,
                "TOKEN_EXPIRED",
            ));
        }
        let pending = self.refresh_network_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.refresh_network_failures.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::Network("connection reset".to_string()));
        }
        let subject = refresh_token.trim_start_matches("refresh-");
        Ok(self.mint(subject, None))
    }

    async fn email_verified(&self, _id_token: &str) -> Result<bool, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.email_verified.load(Ordering::SeqCst))
    }

    async fn delete_account(&self, id_token: &str) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.deleted.lock().unwrap().push(id_token.to_string());
        Ok(())
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// In-memory backend with call counters and a gate on verification.
pub struct FakeBackend {
    users: Mutex<HashMap<String, User>>,
    pub verify_ok: AtomicBool,
    pub login_ok: AtomicBool,
    pub register_ok: AtomicBool,
    pub register_network_error: AtomicBool,
    /// Report registration success without issuing a session
    pub register_without_session: AtomicBool,
    /// Report registration success with a session but no user record
    pub register_without_user: AtomicBool,
    verify_gated: AtomicBool,
    verify_gate: Semaphore,
    pub verify_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub parking_calls: AtomicUsize,
    pub account_calls: AtomicUsize,
    pub parking_delay: Mutex<Option<Duration>>,
    pub parking_fail: AtomicBool,
    pub parkings: Mutex<Value>,
    /// Number of upcoming account calls to answer with `Unauthorized`
    pub unauthorized_responses: AtomicU32,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            verify_ok: AtomicBool::new(true),
            login_ok: AtomicBool::new(true),
            register_ok: AtomicBool::new(true),
            register_network_error: AtomicBool::new(false),
            register_without_session: AtomicBool::new(false),
            register_without_user: AtomicBool::new(false),
            verify_gated: AtomicBool::new(false),
            verify_gate: Semaphore::new(0),
            verify_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            parking_calls: AtomicUsize::new(0),
            account_calls: AtomicUsize::new(0),
            parking_delay: Mutex::new(None),
            parking_fail: AtomicBool::new(false),
            parkings: Mutex::new(sample_parkings()),
            unauthorized_responses: AtomicU32::new(0),
        }
    }
}

#[allow(dead_code)]
impl FakeBackend {
    pub fn add_user(&self, subject: &str, user: User) {
        self.users.lock().unwrap().insert(subject.to_string(), user);
    }

    pub fn has_user(&self, subject: &str) -> bool {
        self.users.lock().unwrap().contains_key(subject)
    }

    /// Hold every verification until [`Self::release_verify`] is called.
    pub fn gate_verify(&self) {
        self.verify_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_verify(&self, permits: usize) {
        self.verify_gate.add_permits(permits);
    }

    pub fn total_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
            + self.login_calls.load(Ordering::SeqCst)
            + self.register_calls.load(Ordering::SeqCst)
            + self.parking_calls.load(Ordering::SeqCst)
            + self.account_calls.load(Ordering::SeqCst)
    }

    pub fn parking_calls(&self) -> usize {
        self.parking_calls.load(Ordering::SeqCst)
    }

    pub fn set_parking_delay(&self, delay: Duration) {
        *self.parking_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_parkings(&self, value: Value) {
        *self.parkings.lock().unwrap() = value;
    }

    fn subject_of(token: &str) -> String {
        // "idtoken-<subject>-<n>"
        let rest = token.trim_start_matches("idtoken-");
        match rest.rfind('-') {
            Some(i) => rest[..i].to_string(),
            None => rest.to_string(),
        }
    }

    async fn parking_call(&self) -> Result<Value, AppError> {
        self.parking_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.parking_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.parking_fail.load(Ordering::SeqCst) {
            return Err(AppError::Network("backend unreachable".to_string()));
        }
        Ok(self.parkings.lock().unwrap().clone())
    }

    fn account_call(&self) -> Result<(), AppError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.unauthorized_responses.load(Ordering::SeqCst);
        if pending > 0 {
            self.unauthorized_responses.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn verify_identity_token(&self, id_token: &str) -> Result<VerifyResponse, AppError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.verify_gated.load(Ordering::SeqCst) {
            if let Ok(permit) = self.verify_gate.acquire().await {
                permit.forget();
            }
        }
        if !self.verify_ok.load(Ordering::SeqCst) {
            return Ok(VerifyResponse {
                success: false,
                message: Some("Invalid token".to_string()),
                user_exists: false,
            });
        }
        Ok(VerifyResponse {
            success: true,
            message: None,
            user_exists: self.has_user(&Self::subject_of(id_token)),
        })
    }

    async fn login_with_identity(&self, input: &IdentityLogin) -> Result<SessionResponse, AppError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if !self.login_ok.load(Ordering::SeqCst) {
            return Ok(SessionResponse {
                success: false,
                message: Some("Account pending approval".to_string()),
                token: None,
                user: None,
            });
        }
        let user = self.users.lock().unwrap().get(&input.firebase_uid).cloned();
        Ok(SessionResponse {
            success: user.is_some(),
            message: None,
            token: Some(format!("session-{}", input.firebase_uid)),
            user,
        })
    }

    async fn register_with_identity(
        &self,
        input: &IdentityRegistration,
    ) -> Result<SessionResponse, AppError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.register_network_error.load(Ordering::SeqCst) {
            return Err(AppError::Network("timed out".to_string()));
        }
        if !self.register_ok.load(Ordering::SeqCst) {
            return Ok(SessionResponse {
                success: false,
                message: Some("Phone number already registered".to_string()),
                token: None,
                user: None,
            });
        }
        if self.register_without_session.load(Ordering::SeqCst) {
            return Ok(SessionResponse {
                success: true,
                message: None,
                token: None,
                user: None,
            });
        }
        if self.register_without_user.load(Ordering::SeqCst) {
            return Ok(SessionResponse {
                success: true,
                message: None,
                token: Some(format!("session-{}", input.firebase_uid)),
                user: None,
            });
        }
        let mut user = test_user(&format!("user-{}", input.firebase_uid));
        user.first_name = input.first_name.clone();
        user.last_name = input.last_name.clone();
        user.email = input.email.clone();
        user.phone_number = input.phone_number.clone();
        self.add_user(&input.firebase_uid, user.clone());
        Ok(SessionResponse {
            success: true,
            message: None,
            token: Some(format!("session-{}", input.firebase_uid)),
            user: Some(user),
        })
    }

    async fn current_user(&self) -> Result<User, AppError> {
        self.account_call()?;
        self.users
            .lock()
            .unwrap()
            .values()
            .next()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl ParkingBackend for FakeBackend {
    async fn all_parkings(&self) -> Result<Value, AppError> {
        self.parking_call().await
    }

    async fn parking_by_id(&self, id: &str) -> Result<Value, AppError> {
        let all = self.parking_call().await?;
        Ok(all
            .as_array()
            .and_then(|items| items.iter().find(|p| p["id"] == id).cloned())
            .unwrap_or(Value::Null))
    }

    async fn nearby_parkings(&self, _query: &NearbyQuery) -> Result<Value, AppError> {
        self.parking_call().await
    }

    async fn parkings_by_city(&self, city: &str) -> Result<Value, AppError> {
        let all = self.parking_call().await?;
        let matching: Vec<Value> = all
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|p| p["address"]["city"] == city)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(matching))
    }
}

#[async_trait]
impl AccountBackend for FakeBackend {
    async fn user_vehicles(&self, user_id: &str) -> Result<Vec<Vehicle>, AppError> {
        self.account_call()?;
        Ok(vec![serde_json::from_value(json!({
            "id": "veh-1",
            "userId": user_id,
            "make": "Volvo",
            "model": "XC40",
            "licensePlate": "ABC123",
            "isDefault": true,
        }))
        .expect("valid vehicle")])
    }

    async fn add_vehicle(&self, input: &VehicleInput) -> Result<Vehicle, AppError> {
        self.account_call()?;
        Ok(Vehicle {
            id: "veh-2".to_string(),
            user_id: None,
            make: Some(input.make.clone()),
            model: Some(input.model.clone()),
            year: Some(input.year),
            color: Some(input.color.clone()),
            license_plate: Some(input.license_plate.clone()),
            is_default: input.is_default.unwrap_or(false),
        })
    }

    async fn update_vehicle(&self, id: &str, update: &VehicleUpdate) -> Result<Vehicle, AppError> {
        self.account_call()?;
        Ok(Vehicle {
            id: id.to_string(),
            user_id: None,
            make: update.make.clone(),
            model: update.model.clone(),
            year: update.year,
            color: update.color.clone(),
            license_plate: update.license_plate.clone(),
            is_default: update.is_default.unwrap_or(false),
        })
    }

    async fn delete_vehicle(&self, id: &str) -> Result<MutationResponse, AppError> {
        self.account_call()?;
        Ok(MutationResponse {
            success: id == "veh-1",
            message: (id != "veh-1").then(|| "Vehicle not found".to_string()),
        })
    }

    async fn set_default_vehicle(&self, id: &str) -> Result<Vehicle, AppError> {
        self.account_call()?;
        Ok(Vehicle {
            id: id.to_string(),
            user_id: None,
            make: None,
            model: None,
            year: None,
            color: None,
            license_plate: None,
            is_default: true,
        })
    }

    async fn my_bookings(&self, _offset: u32, _limit: u32) -> Result<Vec<Booking>, AppError> {
        self.account_call()?;
        Ok(vec![booking("bk-1", "CONFIRMED")])
    }

    async fn create_booking(&self, input: &CreateBookingInput) -> Result<Booking, AppError> {
        self.account_call()?;
        let mut created = booking("bk-2", "PENDING");
        created.parking_id = Some(input.parking_id.clone());
        Ok(created)
    }

    async fn cancel_booking(&self, id: &str) -> Result<Booking, AppError> {
        self.account_call()?;
        Ok(booking(id, "CANCELLED"))
    }

    async fn extend_booking(&self, id: &str, new_end_time: &str) -> Result<Booking, AppError> {
        self.account_call()?;
        let mut extended = booking(id, "CONFIRMED");
        extended.end_time = Some(new_end_time.to_string());
        Ok(extended)
    }
}

fn booking(id: &str, status: &str) -> Booking {
    serde_json::from_value(json!({ "id": id, "status": status })).expect("valid booking")
}

/// Two current-shape listings and one legacy listing.
#[allow(dead_code)]
pub fn sample_parkings() -> Value {
    json!([
        {
            "id": "p-far",
            "name": "Arlanda P2",
            "description": "Long-term parking",
            "totalSpaces": 500,
            "availableSpaces": 120,
            "coordinates": [17.9186, 59.6519],
            "address": {
                "street": "Terminalvägen 1",
                "city": "Sigtuna",
                "state": "Stockholm",
                "zipCode": "190 45",
                "country": "Sweden"
            }
        },
        {
            "id": "p-near",
            "name": "Sergels torg",
            "description": "City centre garage",
            "totalSpaces": 200,
            "availableSpaces": 0,
            "coordinates": "18.0649,59.3326",
            "address": {
                "street": "Sergels torg 1",
                "city": "Stockholm",
                "state": "Stockholm",
                "zipCode": "111 57",
                "country": "Sweden"
            }
        },
        {
            "id": "s-legacy",
            "name": "Old Town Lot",
            "address": "Gamla stan, Stockholm",
            "latitude": 59.3251,
            "longitude": 18.0711,
            "pricePerHour": 45.0,
            "isAvailable": true,
            "totalSpots": 40,
            "availableSpots": 12
        }
    ])
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Poll `cond` until it holds; panics after five seconds.
#[allow(dead_code)]
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[allow(dead_code)]
pub struct Harness {
    pub session: Arc<SessionManager>,
    pub provider: Arc<FakeIdentityProvider>,
    pub backend: Arc<FakeBackend>,
    pub store: TokenStore,
}

/// Session manager over in-memory fakes.
#[allow(dead_code)]
pub fn harness(provider: FakeIdentityProvider, backend: FakeBackend) -> Harness {
    restart(
        Arc::new(provider),
        Arc::new(backend),
        TokenStore::in_memory(),
    )
}

/// New session manager over existing fakes and store, as after a restart.
#[allow(dead_code)]
pub fn restart(
    provider: Arc<FakeIdentityProvider>,
    backend: Arc<FakeBackend>,
    store: TokenStore,
) -> Harness {
    let session = SessionManager::start(
        provider.clone(),
        backend.clone(),
        store.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
    );
    Harness {
        session,
        provider,
        backend,
        store,
    }
}

/// Backend with a user for `email`, and a provider that knows its secret.
#[allow(dead_code)]
pub fn existing_account(email: &str, secret: &str) -> Harness {
    let backend = FakeBackend::default();
    backend.add_user(&uid_for(email), test_user("user-1"));
    harness(FakeIdentityProvider::with_account(email, secret), backend)
}
