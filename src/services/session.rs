// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend session reconciler.
//!
//! Turns identity events into backend sessions:
//!
//! ```text
//! Unauthenticated ──identity──> IdentityPendingVerification ──verify ok, user──> Authenticated
//!                                        │                   └─verify ok, no user─> AwaitingRegistration
//!                                        └─verify rejected──> Error(BackendVerificationFailed)
//! any ──no identity──> Unauthenticated
//! ```
//!
//! Events are consumed by a single task and handled one at a time under
//! `reconcile_lock`. Every state or store write of a run first checks that
//! the run's generation is still the adapter's latest; superseded runs stop
//! without further writes, and the newer event's handler runs after them.

use crate::config::Config;
use crate::error::{AppError, AuthFailure, ErrorKind};
use crate::models::{BackendSession, PhoneChallenge, ProviderSession, RegistrationProfile, User};
use crate::services::backend::{AuthBackend, IdentityLogin, IdentityRegistration, SessionResponse};
use crate::services::identity::{
    classify_identifier, Identifier, IdentityAdapter, IdentityChange, IdentityEvent,
    IdentityProvider, MIN_SECRET_LEN,
};
use crate::store::TokenStore;
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use validator::Validate;

/// Reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Unauthenticated,
    IdentityPendingVerification,
    AwaitingRegistration,
    Authenticated,
    Error(ErrorKind),
}

/// Published view of the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<User>,
    pub last_error: Option<AuthFailure>,
    /// Latest identity event whose handling has finished
    pub processed_generation: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            user: None,
            last_error: None,
            processed_generation: 0,
        }
    }
}

/// Backoff for forced token refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.token_refresh_attempts.max(1),
            base_delay: config.token_refresh_backoff,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base, 2×base, 4×base, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Outcome of a public session operation. Never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AuthFailure>,
    /// Set when a phone challenge was sent and awaits its code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<PhoneChallenge>,
}

impl AuthResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            challenge: None,
        }
    }

    pub fn failed(failure: AuthFailure) -> Self {
        Self {
            success: false,
            error: Some(failure),
            challenge: None,
        }
    }

    pub fn challenge(challenge: PhoneChallenge) -> Self {
        Self {
            success: true,
            error: None,
            challenge: Some(challenge),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl From<&AppError> for AuthResult {
    fn from(err: &AppError) -> Self {
        AuthResult::failed(AuthFailure::from(err))
    }
}

/// Session manager: owns the reconciler state machine and the token store.
///
/// Built once at start-up and shared by reference.
pub struct SessionManager {
    identity: IdentityAdapter,
    backend: Arc<dyn AuthBackend>,
    store: TokenStore,
    policy: RetryPolicy,
    snapshot: watch::Sender<SessionSnapshot>,
    reconcile_lock: Mutex<()>,
}

impl SessionManager {
    /// Create the manager and spawn its event loop.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<dyn AuthBackend>,
        store: TokenStore,
        policy: RetryPolicy,
    ) -> Arc<Self> {
        let (identity, events) = IdentityAdapter::new(provider);
        let (snapshot, _) = watch::channel(SessionSnapshot::default());

        let manager = Arc::new(Self {
            identity,
            backend,
            store,
            policy,
            snapshot,
            reconcile_lock: Mutex::new(()),
        });

        tokio::spawn(Self::run(Arc::downgrade(&manager), events));
        manager
    }

    async fn run(manager: Weak<Self>, mut events: mpsc::UnboundedReceiver<IdentityEvent>) {
        while let Some(event) = events.recv().await {
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.handle_event(event).await;
        }
        tracing::debug!("Identity event loop stopped");
    }

    // ─── Accessors ──────────────────────────────────────────────

    pub fn identity(&self) -> &IdentityAdapter {
        &self.identity
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn user(&self) -> Option<User> {
        self.snapshot.borrow().user.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// `Authenticated` and both credentials present for the same subject.
    /// Computed on every call.
    pub async fn is_authenticated(&self) -> bool {
        if self.state() != SessionState::Authenticated {
            return false;
        }
        matches!(self.store.session_pair().await, Ok(Some(_)))
    }

    // ─── Event handling ─────────────────────────────────────────

    async fn handle_event(&self, event: IdentityEvent) {
        let _guard = self.reconcile_lock.lock().await;
        let generation = event.generation;

        match event.change {
            IdentityChange::SignedOut => self.apply_sign_out().await,
            IdentityChange::SignedIn(session) => self.reconcile(generation, session).await,
            IdentityChange::TokenRefreshed(session) => {
                self.apply_token_refresh(generation, session).await
            }
        }

        self.snapshot.send_modify(|s| {
            s.processed_generation = s.processed_generation.max(generation);
        });
    }

    fn ensure_current(&self, generation: u64) -> Result<(), AppError> {
        let current = self.identity.generation();
        if current == generation {
            Ok(())
        } else {
            Err(AppError::StaleGeneration {
                started: generation,
                current,
            })
        }
    }

    /// Apply `update` to the snapshot if `generation` is still current.
    fn commit(
        &self,
        generation: u64,
        update: impl FnOnce(&mut SessionSnapshot),
    ) -> Result<(), AppError> {
        self.ensure_current(generation)?;
        self.snapshot.send_modify(update);
        let state = self.snapshot.borrow().state;
        tracing::info!(?state, generation, "Session state changed");
        Ok(())
    }

    fn commit_state(&self, generation: u64, state: SessionState) -> Result<(), AppError> {
        self.commit(generation, |s| {
            s.state = state;
            s.last_error = None;
        })
    }

    /// Record the failure of a run, unless the run was superseded.
    fn record_failure(&self, generation: u64, err: &AppError) {
        if let AppError::StaleGeneration { started, current } = err {
            tracing::debug!(started, current, "Discarding superseded reconciliation");
            return;
        }
        let failure = AuthFailure::from(err);
        let kind = failure.kind;
        if self
            .commit(generation, |s| {
                s.state = SessionState::Error(kind);
                s.last_error = Some(failure);
            })
            .is_err()
        {
            tracing::debug!(generation, "Discarding failure of superseded reconciliation");
        }
    }

    async fn apply_sign_out(&self) {
        if let Err(e) = self.store.clear_all().await {
            tracing::error!(error = %e, "Failed to clear credentials on sign-out");
        }
        self.snapshot.send_modify(|s| {
            s.state = SessionState::Unauthenticated;
            s.user = None;
            s.last_error = None;
        });
        tracing::info!("Session cleared");
    }

    async fn apply_token_refresh(&self, generation: u64, session: ProviderSession) {
        let linked = self.state() == SessionState::Authenticated
            && matches!(
                self.store.session().await,
                Ok(Some(ref s)) if s.identity_subject == session.subject()
            );
        if !linked {
            self.reconcile(generation, session).await;
            return;
        }

        let result = match self.ensure_current(generation) {
            Ok(()) => self.store.put_identity(&session).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::debug!(subject = %session.subject(), "Refreshed identity token stored"),
            Err(e) => self.record_failure(generation, &e),
        }
    }

    async fn reconcile(&self, generation: u64, session: ProviderSession) {
        if let Err(e) = self.try_reconcile(generation, &session).await {
            self.record_failure(generation, &e);
        }
    }

    async fn try_reconcile(&self, generation: u64, session: &ProviderSession) -> Result<(), AppError> {
        let subject = session.subject().to_string();

        // Credentials of a different identity are purged before the new one is stored.
        let previous = self.store.identity().await.ok().flatten();
        let same_identity = previous.as_ref().is_some_and(|p| p.subject() == subject);
        self.ensure_current(generation)?;
        match self.store.session().await {
            Ok(Some(s)) if s.identity_subject == subject => {}
            Ok(None) => {}
            _ => self.store.delete_session().await?,
        }
        if !same_identity {
            self.store.delete_user().await?;
        }

        self.commit(generation, |s| {
            s.state = SessionState::IdentityPendingVerification;
            s.last_error = None;
            if !same_identity {
                s.user = None;
            }
        })?;
        self.store.put_identity(session).await?;

        let verify = self
            .backend
            .verify_identity_token(&session.id_token.raw)
            .await?;
        self.ensure_current(generation)?;

        if !verify.success {
            self.store.delete_session().await?;
            return Err(AppError::backend(
                ErrorKind::BackendVerificationFailed,
                verify.message.unwrap_or_default(),
            ));
        }

        if !verify.user_exists {
            self.store.delete_session().await?;
            tracing::info!(subject = %subject, "No backend user for identity, registration required");
            return self.commit_state(generation, SessionState::AwaitingRegistration);
        }

        let login = IdentityLogin {
            firebase_uid: subject,
            email: session.id_token.email.clone(),
            phone_number: session.id_token.phone_number.clone(),
        };
        let response = self.backend.login_with_identity(&login).await?;
        self.establish(generation, session, response, ErrorKind::BackendLoginFailed)
            .await
    }

    /// Persist the backend session from a login/register answer and move to
    /// `Authenticated`.
    async fn establish(
        &self,
        generation: u64,
        session: &ProviderSession,
        response: SessionResponse,
        failure_kind: ErrorKind,
    ) -> Result<(), AppError> {
        self.ensure_current(generation)?;
        if !response.success {
            return Err(AppError::backend(
                failure_kind,
                response.message.unwrap_or_default(),
            ));
        }
        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::backend(failure_kind, "backend issued no session token"))?;

        let mut backend_session = BackendSession {
            token,
            user_id: response.user.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
            identity_subject: session.subject().to_string(),
            issued_at: Utc::now(),
        };
        self.store.put_session(&backend_session).await?;

        let user = match response.user {
            Some(user) => user,
            None => self.backend.current_user().await?,
        };
        self.ensure_current(generation)?;
        if backend_session.user_id != user.id {
            backend_session.user_id = user.id.clone();
            self.store.put_session(&backend_session).await?;
        }
        self.store.put_user(&user).await?;

        tracing::info!(user_id = %user.id, "Backend session established");
        self.commit(generation, |s| {
            s.state = SessionState::Authenticated;
            s.user = Some(user);
            s.last_error = None;
        })
    }

    // ─── Public operations ──────────────────────────────────────

    async fn wait_for_generation(&self, generation: u64) -> SessionSnapshot {
        let mut rx = self.snapshot.subscribe();
        let snapshot = match rx.wait_for(|s| s.processed_generation >= generation).await {
            Ok(s) => s.clone(),
            Err(_) => self.snapshot.borrow().clone(),
        };
        snapshot
    }

    fn result_from(snapshot: &SessionSnapshot) -> AuthResult {
        match snapshot.state {
            SessionState::Authenticated => AuthResult::ok(),
            SessionState::AwaitingRegistration => AuthResult::failed(AuthFailure::new(
                ErrorKind::RegistrationRequired,
                ErrorKind::RegistrationRequired.user_message(),
            )),
            SessionState::Error(kind) => AuthResult::failed(
                snapshot
                    .last_error
                    .clone()
                    .unwrap_or_else(|| AuthFailure::new(kind, kind.user_message())),
            ),
            SessionState::Unauthenticated | SessionState::IdentityPendingVerification => {
                AuthResult::failed(AuthFailure::new(
                    ErrorKind::NoCurrentIdentity,
                    "Session changed before the operation completed",
                ))
            }
        }
    }

    async fn outcome(&self, generation: u64) -> AuthResult {
        let snapshot = self.wait_for_generation(generation).await;
        Self::result_from(&snapshot)
    }

    /// Report a failure that happened before any identity event. The state
    /// moves to `Error` only when no session is active.
    fn fail(&self, err: &AppError) -> AuthResult {
        let failure = AuthFailure::from(err);
        let kind = failure.kind;
        let recorded = failure.clone();
        self.snapshot.send_if_modified(|s| match s.state {
            SessionState::Unauthenticated | SessionState::Error(_) => {
                s.state = SessionState::Error(kind);
                s.last_error = Some(recorded);
                true
            }
            _ => false,
        });
        tracing::info!(?kind, "Session operation failed");
        AuthResult::failed(failure)
    }

    /// Sign in with an email and secret, or start a phone challenge.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> AuthResult {
        let identifier = match classify_identifier(identifier) {
            Ok(identifier) => identifier,
            Err(e) => return self.fail(&e),
        };

        match identifier {
            Identifier::Email(email) => {
                match self.identity.sign_in_with_password(&email, secret).await {
                    Ok(generation) => self.outcome(generation).await,
                    Err(e) => self.fail(&e),
                }
            }
            Identifier::Phone(phone) => {
                match self.identity.sign_in_with_phone_challenge(&phone).await {
                    Ok(challenge) => AuthResult::challenge(challenge),
                    Err(e) => self.fail(&e),
                }
            }
        }
    }

    /// Finish a phone challenge. A pending phone sign-up is completed
    /// automatically when the identity has no backend user yet.
    pub async fn confirm_challenge(&self, challenge: &PhoneChallenge, code: &str) -> AuthResult {
        let generation = match self.identity.confirm_challenge(challenge, code).await {
            Ok(generation) => generation,
            Err(e) => return self.fail(&e),
        };

        let snapshot = self.wait_for_generation(generation).await;
        if snapshot.state == SessionState::AwaitingRegistration {
            match self.store.pending_signup().await {
                Ok(Some(mut profile)) => {
                    if profile.phone_number.is_none() {
                        profile.phone_number = Some(challenge.phone_number.clone());
                    }
                    return self.complete_registration(profile).await;
                }
                Ok(None) => {}
                Err(e) => return AuthResult::from(&e),
            }
        }
        Self::result_from(&snapshot)
    }

    /// Create an account.
    ///
    /// Email identifiers register with the provider and then with the
    /// backend. Phone identifiers store the profile and start a challenge;
    /// `secret` is not used for them.
    pub async fn sign_up(
        &self,
        identifier: &str,
        secret: &str,
        mut profile: RegistrationProfile,
    ) -> AuthResult {
        let identifier = match classify_identifier(identifier) {
            Ok(identifier) => identifier,
            Err(e) => return self.fail(&e),
        };
        if let Err(e) = profile.validate() {
            return self.fail(&AppError::InvalidInput(e.to_string()));
        }

        match identifier {
            Identifier::Email(email) => {
                if secret.chars().count() < MIN_SECRET_LEN {
                    return self.fail(&AppError::identity(
                        ErrorKind::WeakSecret,
                        format!("secret must be at least {MIN_SECRET_LEN} characters"),
                    ));
                }
                if profile.email.is_none() {
                    profile.email = Some(email.clone());
                }

                let generation = match self
                    .identity
                    .register_with_password(&email, secret, &profile.display_name())
                    .await
                {
                    Ok(generation) => generation,
                    Err(e) => return self.fail(&e),
                };

                let snapshot = self.wait_for_generation(generation).await;
                if snapshot.state == SessionState::AwaitingRegistration {
                    return self.complete_registration(profile).await;
                }
                Self::result_from(&snapshot)
            }
            Identifier::Phone(phone) => {
                if profile.phone_number.is_none() {
                    profile.phone_number = Some(phone.clone());
                }
                if let Err(e) = self.store.put_pending_signup(&profile).await {
                    return self.fail(&e);
                }
                match self.identity.sign_in_with_phone_challenge(&phone).await {
                    Ok(challenge) => AuthResult::challenge(challenge),
                    Err(e) => {
                        if let Err(e) = self.store.delete_pending_signup().await {
                            tracing::warn!(error = %e, "Failed to drop pending sign-up");
                        }
                        self.fail(&e)
                    }
                }
            }
        }
    }

    /// Register the current identity with the backend.
    ///
    /// A `success=false` answer deletes the just-created provider identity
    /// and signs out. A transport failure keeps `AwaitingRegistration` so the
    /// call can be retried.
    pub async fn complete_registration(&self, profile: RegistrationProfile) -> AuthResult {
        if let Err(e) = profile.validate() {
            return AuthResult::from(&AppError::InvalidInput(e.to_string()));
        }

        let guard = self.reconcile_lock.lock().await;
        let generation = self.identity.generation();

        if self.state() != SessionState::AwaitingRegistration {
            return AuthResult::from(&AppError::InvalidInput(
                "no registration is pending".to_string(),
            ));
        }
        let Some(session) = self.identity.current_session().await else {
            return AuthResult::from(&AppError::NoCurrentIdentity);
        };

        if let Err(e) = self.commit_state(generation, SessionState::IdentityPendingVerification) {
            return AuthResult::from(&e);
        }

        let input = IdentityRegistration {
            firebase_uid: session.subject().to_string(),
            first_name: profile.first_name.trim().to_string(),
            last_name: profile.last_name.trim().to_string(),
            email: profile.email.clone().or_else(|| session.id_token.email.clone()),
            phone_number: profile
                .phone_number
                .clone()
                .or_else(|| session.id_token.phone_number.clone()),
        };

        let response = match self.backend.register_with_identity(&input).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Backend registration call failed");
                let failure = AuthFailure::from(&e);
                let recorded = failure.clone();
                let committed = self.commit(generation, |s| {
                    s.state = SessionState::AwaitingRegistration;
                    s.last_error = Some(recorded);
                });
                if let Err(stale) = committed {
                    tracing::debug!(error = %stale, "Discarding failure of superseded registration");
                }
                return AuthResult::failed(failure);
            }
        };

        if !response.success {
            let failure = AuthFailure::new(
                ErrorKind::BackendRegistrationFailed,
                response.message.clone().unwrap_or_default(),
            );
            tracing::warn!(message = %failure.message, "Backend registration rejected, rolling back");
            return self.roll_back_registration(guard, failure).await;
        }

        match self
            .establish(generation, &session, response, ErrorKind::BackendRegistrationFailed)
            .await
        {
            Ok(()) => {
                if let Err(e) = self.store.delete_pending_signup().await {
                    tracing::warn!(error = %e, "Failed to drop pending sign-up");
                }
                AuthResult::ok()
            }
            Err(e @ AppError::StaleGeneration { .. }) => {
                tracing::debug!(error = %e, "Discarding superseded registration");
                AuthResult::from(&e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend session not established after registration, rolling back");
                let failure = match e {
                    AppError::Backend { message, .. } => {
                        AuthFailure::new(ErrorKind::BackendRegistrationFailed, message)
                    }
                    other => AuthFailure::new(ErrorKind::BackendRegistrationFailed, other.to_string()),
                };
                self.roll_back_registration(guard, failure).await
            }
        }
    }

    /// Delete the just-created provider identity and sign out, so a failed
    /// registration leaves no provider account without a backend user.
    /// Cleanup failures are logged; `failure` is always returned.
    async fn roll_back_registration(
        &self,
        guard: MutexGuard<'_, ()>,
        failure: AuthFailure,
    ) -> AuthResult {
        if let Err(e) = self.identity.delete_current_account().await {
            tracing::error!(error = %e, "Failed to delete orphaned provider identity");
        }
        if let Err(e) = self.store.delete_pending_signup().await {
            tracing::warn!(error = %e, "Failed to drop pending sign-up");
        }

        let sign_out = self.identity.sign_out().await;
        drop(guard);
        self.wait_for_generation(sign_out).await;
        AuthResult::failed(failure)
    }

    /// Sign out. Always succeeds.
    pub async fn sign_out(&self) -> AuthResult {
        let generation = self.identity.sign_out().await;
        self.wait_for_generation(generation).await;
        AuthResult::ok()
    }

    /// Force a new identity token, retrying transport failures with
    /// exponential backoff. The backend linkage is not re-verified.
    pub async fn refresh_token(&self) -> AuthResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = self.identity.generation();
            match self.identity.refresh_current_token(true).await {
                Ok((_, generation)) => return self.outcome(generation).await,
                Err(AppError::NoCurrentIdentity) => {
                    return AuthResult::from(&AppError::NoCurrentIdentity)
                }
                Err(e @ AppError::StaleGeneration { .. }) => {
                    tracing::debug!(error = %e, "Discarding superseded token refresh");
                    return AuthResult::from(&e);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(attempt, ?delay, error = %e, "Token refresh failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let failure = AuthFailure::new(ErrorKind::TokenRefreshFailed, e.to_string());
                    let recorded = failure.clone();
                    let _guard = self.reconcile_lock.lock().await;
                    let committed = self.commit(started, |s| {
                        s.state = SessionState::Error(ErrorKind::TokenRefreshFailed);
                        s.last_error = Some(recorded);
                    });
                    if let Err(stale) = committed {
                        tracing::debug!(error = %stale, "Discarding failure of superseded token refresh");
                        return AuthResult::from(&stale);
                    }
                    return AuthResult::failed(failure);
                }
            }
        }
    }

    /// Reconcile the current identity from scratch.
    pub async fn reverify(&self) -> AuthResult {
        match self.identity.reverify().await {
            Ok(generation) => self.outcome(generation).await,
            Err(e) => AuthResult::from(&e),
        }
    }

    /// Run a backend operation; on `Unauthorized`, re-verify the identity
    /// and retry once if that lands in `Authenticated`.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match op().await {
            Err(e) if e.is_unauthorized() => {
                tracing::info!("Backend rejected session, re-verifying identity");
                let result = self.reverify().await;
                if result.success {
                    op().await
                } else {
                    Err(AppError::Unauthorized)
                }
            }
            other => other,
        }
    }

    /// Replace the cached user record (profile-update flow).
    pub async fn update_user(&self, user: User) -> Result<(), AppError> {
        let _guard = self.reconcile_lock.lock().await;
        if self.state() != SessionState::Authenticated {
            return Err(AppError::NoCurrentIdentity);
        }
        self.store.put_user(&user).await?;
        self.snapshot.send_modify(|s| s.user = Some(user));
        Ok(())
    }

    /// Fetch the user record again from the backend.
    pub async fn reload_user(&self) -> Result<User, AppError> {
        let backend = Arc::clone(&self.backend);
        let user = self
            .authorized(|| {
                let backend = Arc::clone(&backend);
                async move { backend.current_user().await }
            })
            .await?;
        self.update_user(user.clone()).await?;
        Ok(user)
    }

    /// Drop a backend session and user record left without an identity.
    async fn purge_orphaned_session(&self) {
        let _guard = self.reconcile_lock.lock().await;
        if self.identity.current_session().await.is_some() {
            return;
        }
        if !matches!(self.store.identity().await, Ok(None)) {
            return;
        }
        if let Ok(Some(session)) = self.store.session().await {
            tracing::warn!(
                session_subject = %session.identity_subject,
                "Purging session token without identity"
            );
            if let Err(e) = self.store.delete_session().await {
                tracing::error!(error = %e, "Failed to purge orphaned session token");
            }
            if let Err(e) = self.store.delete_user().await {
                tracing::error!(error = %e, "Failed to purge orphaned user record");
            }
        }
    }

    /// Resume the persisted identity, if any, and reconcile it.
    pub async fn restore(&self) -> AuthResult {
        let stored = match self.store.identity().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Stored identity unreadable, clearing credentials");
                if let Err(e) = self.store.clear_all().await {
                    tracing::error!(error = %e, "Failed to clear credentials");
                }
                return AuthResult::from(&e);
            }
        };

        let Some(stored) = stored else {
            self.purge_orphaned_session().await;
            return AuthResult::from(&AppError::NoCurrentIdentity);
        };

        if let Ok(Some(user)) = self.store.user().await {
            self.snapshot.send_modify(|s| s.user = Some(user));
        }

        match self.identity.restore(stored).await {
            Ok(generation) => self.outcome(generation).await,
            Err(e) if e.is_transient() => AuthResult::from(&e),
            Err(e) => {
                tracing::warn!(error = %e, "Stored identity could not be refreshed");
                let generation = self.identity.sign_out().await;
                self.wait_for_generation(generation).await;
                AuthResult::failed(AuthFailure::new(ErrorKind::TokenRefreshFailed, e.to_string()))
            }
        }
    }
}
