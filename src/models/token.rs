// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity and session credentials.

use crate::error::{AppError, ErrorKind};
use crate::time_utils::from_unix_secs;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Short-lived identity credential minted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    /// Raw token as issued (attached to backend verification calls)
    pub raw: String,
    /// Provider subject identifier (uid)
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub email_verified: bool,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

/// Claims carried by provider-issued ID tokens.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    phone_number: Option<String>,
}

impl IdentityToken {
    /// Read the claims of a provider-issued JWT.
    ///
    /// The signature is not checked here; the backend verifies the token.
    pub fn from_jwt(raw: &str) -> Result<Self, AppError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<IdTokenClaims>(raw, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| {
                AppError::identity(
                    ErrorKind::UnknownIdentityError,
                    format!("unreadable identity token: {e}"),
                )
            })?;
        let claims = data.claims;

        Ok(Self {
            raw: raw.to_string(),
            subject: claims.sub,
            issued_at: from_unix_secs(claims.iat),
            expires_at: from_unix_secs(claims.exp),
            email_verified: claims.email_verified.unwrap_or(false),
            email: claims.email,
            phone_number: claims.phone_number,
        })
    }

    /// Build a token from the loose fields of a provider response, used when
    /// the raw token cannot be decoded.
    pub fn from_parts(
        raw: impl Into<String>,
        subject: impl Into<String>,
        expires_in_secs: i64,
        email: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            raw: raw.into(),
            subject: subject.into(),
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            email_verified: false,
            email,
            phone_number: None,
        }
    }

    /// Whether the token is expired (or expires within `margin`).
    pub fn is_expired(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

/// Everything the provider hands back for a signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub id_token: IdentityToken,
    pub refresh_token: String,
}

impl ProviderSession {
    pub fn subject(&self) -> &str {
        &self.id_token.subject
    }
}

/// Backend-issued credential tying a verified identity to a backend user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSession {
    pub token: String,
    pub user_id: String,
    /// Subject of the identity token this session was minted for
    pub identity_subject: String,
    pub issued_at: DateTime<Utc>,
}

/// Pending phone challenge, returned after a verification code was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneChallenge {
    pub verification_id: String,
    pub phone_number: String,
}
