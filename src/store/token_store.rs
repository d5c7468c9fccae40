// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed access to the credentials, user record and parking preferences
//! kept in a [`KeyValueStore`].

use super::{keys, KeyValueStore, MemoryStore};
use crate::error::AppError;
use crate::models::{BackendSession, ProviderSession, RegistrationProfile, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Typed token store shared by the session manager and the backend client.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Store backed by memory only (offline mode, tests).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    // ─── Raw operations ─────────────────────────────────────────

    pub async fn put(&self, name: &str, value: &str) -> Result<(), AppError> {
        self.inner.put(name, value).await
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>, AppError> {
        self.inner.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), AppError> {
        self.inner.delete(name).await
    }

    async fn put_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), AppError> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::StorageWrite(format!("{name}: {e}")))?;
        self.inner.put(name, &json).await
    }

    async fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        match self.inner.get(name).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AppError::StorageRead(format!("{name} is corrupt: {e}"))),
            None => Ok(None),
        }
    }

    // ─── Identity token ─────────────────────────────────────────

    pub async fn put_identity(&self, session: &ProviderSession) -> Result<(), AppError> {
        self.put_json(keys::IDENTITY_TOKEN, session).await
    }

    pub async fn identity(&self) -> Result<Option<ProviderSession>, AppError> {
        self.get_json(keys::IDENTITY_TOKEN).await
    }

    pub async fn delete_identity(&self) -> Result<(), AppError> {
        self.inner.delete(keys::IDENTITY_TOKEN).await
    }

    // ─── Backend session token ──────────────────────────────────

    pub async fn put_session(&self, session: &BackendSession) -> Result<(), AppError> {
        self.put_json(keys::SESSION_TOKEN, session).await
    }

    pub async fn session(&self) -> Result<Option<BackendSession>, AppError> {
        self.get_json(keys::SESSION_TOKEN).await
    }

    pub async fn delete_session(&self) -> Result<(), AppError> {
        self.inner.delete(keys::SESSION_TOKEN).await
    }

    // ─── User record ────────────────────────────────────────────

    pub async fn put_user(&self, user: &User) -> Result<(), AppError> {
        self.put_json(keys::USER, user).await
    }

    pub async fn user(&self) -> Result<Option<User>, AppError> {
        self.get_json(keys::USER).await
    }

    pub async fn delete_user(&self) -> Result<(), AppError> {
        self.inner.delete(keys::USER).await
    }

    // ─── Pending phone sign-up ──────────────────────────────────

    pub async fn put_pending_signup(&self, profile: &RegistrationProfile) -> Result<(), AppError> {
        self.put_json(keys::PENDING_SIGNUP, profile).await
    }

    pub async fn pending_signup(&self) -> Result<Option<RegistrationProfile>, AppError> {
        self.get_json(keys::PENDING_SIGNUP).await
    }

    pub async fn delete_pending_signup(&self) -> Result<(), AppError> {
        self.inner.delete(keys::PENDING_SIGNUP).await
    }

    // ─── Parking preferences ────────────────────────────────────

    pub async fn put_favorites(&self, ids: &[String]) -> Result<(), AppError> {
        self.put_json(keys::FAVORITES, &ids).await
    }

    /// Favorite parking ids; empty when none were saved.
    pub async fn favorites(&self) -> Result<Vec<String>, AppError> {
        Ok(self.get_json(keys::FAVORITES).await?.unwrap_or_default())
    }

    pub async fn put_recent_searches(&self, queries: &[String]) -> Result<(), AppError> {
        self.put_json(keys::RECENT_SEARCHES, &queries).await
    }

    pub async fn recent_searches(&self) -> Result<Vec<String>, AppError> {
        Ok(self.get_json(keys::RECENT_SEARCHES).await?.unwrap_or_default())
    }

    // ─── Combined views ─────────────────────────────────────────

    /// Identity and backend session, when both are present and belong to
    /// the same subject.
    pub async fn session_pair(
        &self,
    ) -> Result<Option<(ProviderSession, BackendSession)>, AppError> {
        let identity = self.identity().await?;
        let session = self.session().await?;
        Ok(match (identity, session) {
            (Some(identity), Some(session)) if session.identity_subject == identity.subject() => {
                Some((identity, session))
            }
            _ => None,
        })
    }

    /// Backend session token to attach to an outgoing request.
    ///
    /// Only a token minted for the stored identity is returned. Nothing is
    /// deleted here: the session manager owns the credentials and purges a
    /// stale pair when it reconciles the next identity.
    pub async fn current_session_token(&self) -> Result<Option<String>, AppError> {
        let Some(session) = self.session().await? else {
            return Ok(None);
        };

        match self.identity().await? {
            Some(identity) if identity.subject() == session.identity_subject => {
                Ok(Some(session.token))
            }
            Some(identity) => {
                tracing::debug!(
                    identity_subject = %identity.subject(),
                    session_subject = %session.identity_subject,
                    "Session token belongs to another identity, not attaching"
                );
                Ok(None)
            }
            None => {
                tracing::debug!(
                    session_subject = %session.identity_subject,
                    "Session token without identity, not attaching"
                );
                Ok(None)
            }
        }
    }

    /// Remove every credential, the user record and any pending sign-up.
    /// Parking preferences belong to the device and are kept.
    ///
    /// All deletes are attempted; the first failure is returned.
    pub async fn clear_all(&self) -> Result<(), AppError> {
        let mut first_error = None;
        for name in [
            keys::SESSION_TOKEN,
            keys::IDENTITY_TOKEN,
            keys::USER,
            keys::PENDING_SIGNUP,
        ] {
            if let Err(e) = self.inner.delete(name).await {
                tracing::error!(key = name, error = %e, "Failed to clear stored value");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
