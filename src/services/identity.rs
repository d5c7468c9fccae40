// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider adapter.
//!
//! Wraps an [`IdentityProvider`] transport and publishes every change of the
//! current identity on a single channel. Events carry a generation number
//! that increases by one per event; events are sent while the adapter's
//! state lock is held, so they arrive in generation order.

use crate::error::{AppError, ErrorKind};
use crate::models::{IdentityToken, PhoneChallenge, ProviderSession};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Minimum secret length accepted by the provider.
pub const MIN_SECRET_LEN: usize = 6;

/// Length of the one-time code sent for phone challenges.
pub const CHALLENGE_CODE_LEN: usize = 6;

/// Tokens expiring within this window are refreshed even without `force`.
const REFRESH_MARGIN_SECS: i64 = 300;

// ─── Identifier classification ───────────────────────────────────────────────

/// A free-text identifier after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Phone(String),
}

/// Classify an identifier as an email address or an E.164-style phone number.
///
/// Fails with `InvalidIdentifierFormat` for anything else.
pub fn classify_identifier(raw: &str) -> Result<Identifier, AppError> {
    let value = raw.trim();

    if is_email_shaped(value) {
        return Ok(Identifier::Email(value.to_string()));
    }
    if is_phone_shaped(value) {
        return Ok(Identifier::Phone(value.to_string()));
    }

    Err(AppError::identity(
        ErrorKind::InvalidIdentifierFormat,
        format!("{value:?} is neither an email address nor a phone number"),
    ))
}

fn is_email_shaped(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn is_phone_shaped(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Whether `code` has the shape of a one-time challenge code.
pub fn is_valid_challenge_code(code: &str) -> bool {
    code.len() == CHALLENGE_CODE_LEN && code.chars().all(|c| c.is_ascii_digit())
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Network operations of an identity provider.
///
/// Implementations map provider-specific failures onto [`ErrorKind`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<ProviderSession, AppError>;

    async fn register_with_password(
        &self,
        email: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<ProviderSession, AppError>;

    async fn send_email_verification(&self, id_token: &str) -> Result<(), AppError>;

    async fn start_phone_challenge(&self, phone_number: &str) -> Result<PhoneChallenge, AppError>;

    async fn confirm_phone_challenge(
        &self,
        challenge: &PhoneChallenge,
        code: &str,
    ) -> Result<ProviderSession, AppError>;

    /// Mint a new identity token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession, AppError>;

    async fn email_verified(&self, id_token: &str) -> Result<bool, AppError>;

    async fn delete_account(&self, id_token: &str) -> Result<(), AppError>;
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// What happened to the current identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    SignedIn(ProviderSession),
    TokenRefreshed(ProviderSession),
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEvent {
    pub generation: u64,
    pub change: IdentityChange,
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

/// Single source of truth for the current identity.
#[derive(Clone)]
pub struct IdentityAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    provider: Arc<dyn IdentityProvider>,
    current: Mutex<Option<ProviderSession>>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<IdentityEvent>,
}

impl IdentityAdapter {
    /// Create an adapter and the receiving end of its event stream.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> (Self, mpsc::UnboundedReceiver<IdentityEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = Self {
            inner: Arc::new(AdapterInner {
                provider,
                current: Mutex::new(None),
                generation: AtomicU64::new(0),
                events: tx,
            }),
        };
        (adapter, rx)
    }

    /// Generation of the most recent event.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub async fn current_session(&self) -> Option<ProviderSession> {
        self.inner.current.lock().await.clone()
    }

    /// Replace the current identity and publish the change. Must be called
    /// with the state lock held.
    fn publish(&self, current: &mut Option<ProviderSession>, change: IdentityChange) -> u64 {
        *current = match &change {
            IdentityChange::SignedIn(s) | IdentityChange::TokenRefreshed(s) => Some(s.clone()),
            IdentityChange::SignedOut => None,
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .inner
            .events
            .send(IdentityEvent { generation, change })
            .is_err()
        {
            tracing::debug!(generation, "Identity event dropped (no subscriber)");
        }
        generation
    }

    async fn sign_in_with(&self, session: ProviderSession) -> u64 {
        let mut current = self.inner.current.lock().await;
        tracing::info!(subject = %session.subject(), "Identity signed in");
        self.publish(&mut current, IdentityChange::SignedIn(session))
    }

    /// Email/password sign-in. Returns the generation of the sign-in event.
    pub async fn sign_in_with_password(&self, identifier: &str, secret: &str) -> Result<u64, AppError> {
        let email = match classify_identifier(identifier)? {
            Identifier::Email(email) => email,
            Identifier::Phone(_) => {
                return Err(AppError::identity(
                    ErrorKind::InvalidIdentifierFormat,
                    "phone numbers sign in with a challenge code",
                ))
            }
        };

        let session = self.inner.provider.sign_in_with_password(&email, secret).await?;
        Ok(self.sign_in_with(session).await)
    }

    /// Send a one-time code to a phone number.
    pub async fn sign_in_with_phone_challenge(&self, phone_number: &str) -> Result<PhoneChallenge, AppError> {
        let phone = match classify_identifier(phone_number)? {
            Identifier::Phone(phone) => phone,
            Identifier::Email(_) => {
                return Err(AppError::identity(
                    ErrorKind::InvalidIdentifierFormat,
                    "expected a phone number",
                ))
            }
        };

        let challenge = self.inner.provider.start_phone_challenge(&phone).await?;
        tracing::info!(phone = %challenge.phone_number, "Phone challenge sent");
        Ok(challenge)
    }

    /// Complete a phone challenge.
    pub async fn confirm_challenge(&self, challenge: &PhoneChallenge, code: &str) -> Result<u64, AppError> {
        let code = code.trim();
        if !is_valid_challenge_code(code) {
            return Err(AppError::identity(
                ErrorKind::InvalidChallengeCode,
                format!("code must be {CHALLENGE_CODE_LEN} digits"),
            ));
        }

        let session = self
            .inner
            .provider
            .confirm_phone_challenge(challenge, code)
            .await?;
        Ok(self.sign_in_with(session).await)
    }

    /// Create a new email identity and sign it in.
    ///
    /// An email verification is dispatched afterwards; its failure is only
    /// logged.
    pub async fn register_with_password(
        &self,
        identifier: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<u64, AppError> {
        let email = match classify_identifier(identifier)? {
            Identifier::Email(email) => email,
            Identifier::Phone(_) => {
                return Err(AppError::identity(
                    ErrorKind::InvalidIdentifierFormat,
                    "phone numbers register with a challenge code",
                ))
            }
        };
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(AppError::identity(
                ErrorKind::WeakSecret,
                format!("secret must be at least {MIN_SECRET_LEN} characters"),
            ));
        }

        let session = self
            .inner
            .provider
            .register_with_password(&email, secret, display_name)
            .await?;
        let raw = session.id_token.raw.clone();
        let generation = self.sign_in_with(session).await;

        if let Err(e) = self.inner.provider.send_email_verification(&raw).await {
            tracing::warn!(error = %e, "Failed to send verification email");
        }

        Ok(generation)
    }

    /// Forget the current identity. Always publishes `SignedOut`.
    pub async fn sign_out(&self) -> u64 {
        let mut current = self.inner.current.lock().await;
        tracing::info!("Identity signed out");
        self.publish(&mut current, IdentityChange::SignedOut)
    }

    /// Re-mint the identity token of the current identity.
    ///
    /// Without `force`, a token that is not close to expiry is returned
    /// unchanged and no event is published. Returns the token and the
    /// generation it belongs to.
    pub async fn refresh_current_token(&self, force: bool) -> Result<(IdentityToken, u64), AppError> {
        let (before, generation) = {
            let current = self.inner.current.lock().await;
            let session = current.clone().ok_or(AppError::NoCurrentIdentity)?;
            (session, self.generation())
        };

        let expiring = before
            .id_token
            .is_expired(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS));
        if !force && !expiring {
            return Ok((before.id_token, generation));
        }

        let refreshed = self
            .inner
            .provider
            .refresh(&before.refresh_token)
            .await
            .map_err(|e| match e {
                AppError::Network(_) => e,
                other => AppError::TokenRefresh(other.to_string()),
            })?;

        let mut current = self.inner.current.lock().await;
        match current.as_ref() {
            Some(now) if now.subject() == before.subject() => {}
            Some(_) => {
                return Err(AppError::StaleGeneration {
                    started: generation,
                    current: self.generation(),
                })
            }
            None => return Err(AppError::NoCurrentIdentity),
        }

        let token = refreshed.id_token.clone();
        tracing::debug!(subject = %token.subject, "Identity token refreshed");
        let generation = self.publish(&mut current, IdentityChange::TokenRefreshed(refreshed));
        Ok((token, generation))
    }

    /// Whether the current identity's email address is verified.
    pub async fn current_verification_state(&self) -> Result<bool, AppError> {
        let session = self.current_session().await.ok_or(AppError::NoCurrentIdentity)?;
        if session.id_token.phone_number.is_some() && session.id_token.email.is_none() {
            // Phone identities are verified by the challenge itself.
            return Ok(true);
        }
        self.inner.provider.email_verified(&session.id_token.raw).await
    }

    /// Delete the current identity at the provider. Does not sign out.
    pub async fn delete_current_account(&self) -> Result<(), AppError> {
        let session = self.current_session().await.ok_or(AppError::NoCurrentIdentity)?;
        self.inner.provider.delete_account(&session.id_token.raw).await?;
        tracing::info!(subject = %session.subject(), "Identity deleted at provider");
        Ok(())
    }

    /// Adopt a previously persisted identity and announce it. An identity
    /// token close to expiry is refreshed first.
    pub async fn restore(&self, stored: ProviderSession) -> Result<u64, AppError> {
        let expiring = stored
            .id_token
            .is_expired(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS));
        let session = if expiring {
            self.inner
                .provider
                .refresh(&stored.refresh_token)
                .await
                .map_err(|e| match e {
                    AppError::Network(_) => e,
                    other => AppError::TokenRefresh(other.to_string()),
                })?
        } else {
            stored
        };

        tracing::info!(subject = %session.subject(), "Restoring stored identity");
        Ok(self.sign_in_with(session).await)
    }

    /// Announce the current identity again so it is reconciled from scratch.
    pub async fn reverify(&self) -> Result<u64, AppError> {
        let mut current = self.inner.current.lock().await;
        let session = current.clone().ok_or(AppError::NoCurrentIdentity)?;
        Ok(self.publish(&mut current, IdentityChange::SignedIn(session)))
    }
}
