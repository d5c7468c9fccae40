// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication REST client.
//!
//! Handles:
//! - Email/password sign-in and sign-up (Identity Toolkit `accounts:*`)
//! - Phone challenges (`sendVerificationCode` / `signInWithPhoneNumber`)
//! - Token refresh (Secure Token `/token`)
//! - Mapping provider error codes onto [`ErrorKind`]

use crate::config::Config;
use crate::error::{AppError, ErrorKind};
use crate::models::{IdentityToken, PhoneChallenge, ProviderSession};
use crate::services::identity::IdentityProvider;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// Firebase Authentication client.
#[derive(Clone)]
pub struct FirebaseAuthClient {
    http: reqwest::Client,
    api_key: String,
    identity_base_url: String,
    secure_token_base_url: String,
    recaptcha_token: Option<String>,
}

impl FirebaseAuthClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.firebase_api_key.clone(),
            identity_base_url: config.identity_base_url.trim_end_matches('/').to_string(),
            secure_token_base_url: config.secure_token_base_url.trim_end_matches('/').to_string(),
            recaptcha_token: config.recaptcha_token.clone(),
        }
    }

    /// POST to an Identity Toolkit `accounts:*` method.
    async fn accounts<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, AppError> {
        let url = format!("{}/accounts:{}", self.identity_base_url, method);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(AppError::network)?;

        check_response_json(response).await
    }
}

/// Check response status and parse JSON body, mapping provider errors.
async fn check_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if status.is_server_error() {
            return Err(AppError::Network(format!("identity provider HTTP {}", status)));
        }

        let code = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status));
        let kind = map_provider_error(&code);
        tracing::debug!(%status, code = %code, ?kind, "Identity provider rejected request");
        return Err(AppError::identity(kind, code));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::identity(ErrorKind::UnknownIdentityError, format!("JSON parse error: {}", e)))
}

/// Map a provider error code onto the stable taxonomy.
///
/// Accepts REST codes (`EMAIL_NOT_FOUND`, `WEAK_PASSWORD : ...`) and SDK-style
/// codes (`auth/wrong-password`).
pub fn map_provider_error(code: &str) -> ErrorKind {
    let code = code
        .split([' ', ':'])
        .next()
        .unwrap_or_default()
        .trim();

    match code {
        "EMAIL_NOT_FOUND"
        | "INVALID_PASSWORD"
        | "INVALID_LOGIN_CREDENTIALS"
        | "auth/user-not-found"
        | "auth/wrong-password"
        | "auth/invalid-credential" => ErrorKind::InvalidCredentials,

        "INVALID_EMAIL" | "INVALID_PHONE_NUMBER" | "MISSING_PHONE_NUMBER" | "auth/invalid-email"
        | "auth/invalid-phone-number" => ErrorKind::InvalidIdentifierFormat,

        "USER_DISABLED" | "auth/user-disabled" => ErrorKind::AccountDisabled,

        "TOO_MANY_ATTEMPTS_TRY_LATER" | "QUOTA_EXCEEDED" | "auth/too-many-requests" => {
            ErrorKind::TooManyAttempts
        }

        "EMAIL_EXISTS" | "PHONE_NUMBER_EXISTS" | "auth/email-already-in-use" => {
            ErrorKind::IdentifierAlreadyInUse
        }

        "WEAK_PASSWORD" | "auth/weak-password" => ErrorKind::WeakSecret,

        "INVALID_CODE"
        | "INVALID_SESSION_INFO"
        | "SESSION_EXPIRED"
        | "CODE_EXPIRED"
        | "auth/invalid-verification-code"
        | "auth/code-expired" => ErrorKind::InvalidChallengeCode,

        _ => ErrorKind::UnknownIdentityError,
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Response of sign-in, sign-up and phone sign-in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    id_token: String,
    refresh_token: String,
    local_id: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

/// Response of the Secure Token endpoint (snake_case).
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    session_info: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    email_verified: bool,
}

/// Build a session from a provider response, reading the JWT claims when
/// possible and falling back to the loose response fields.
fn session_from(
    id_token: String,
    refresh_token: String,
    local_id: &str,
    expires_in: Option<&str>,
    email: Option<String>,
    phone_number: Option<String>,
) -> ProviderSession {
    let id_token = match IdentityToken::from_jwt(&id_token) {
        Ok(token) => token,
        Err(e) => {
            tracing::debug!(error = %e, "Identity token claims unreadable, using response fields");
            let expires_in = expires_in
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(3600);
            let mut token = IdentityToken::from_parts(id_token, local_id, expires_in, email);
            token.phone_number = phone_number;
            token
        }
    };
    ProviderSession {
        id_token,
        refresh_token,
    }
}

impl From<AuthResponse> for ProviderSession {
    fn from(r: AuthResponse) -> Self {
        session_from(
            r.id_token,
            r.refresh_token,
            &r.local_id,
            r.expires_in.as_deref(),
            r.email,
            r.phone_number,
        )
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<ProviderSession, AppError> {
        let response: AuthResponse = self
            .accounts(
                "signInWithPassword",
                json!({ "email": email, "password": secret, "returnSecureToken": true }),
            )
            .await?;
        Ok(response.into())
    }

    async fn register_with_password(
        &self,
        email: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<ProviderSession, AppError> {
        let response: AuthResponse = self
            .accounts(
                "signUp",
                json!({ "email": email, "password": secret, "returnSecureToken": true }),
            )
            .await?;
        let session = ProviderSession::from(response);

        if !display_name.trim().is_empty() {
            let update: Result<serde_json::Value, AppError> = self
                .accounts(
                    "update",
                    json!({
                        "idToken": session.id_token.raw,
                        "displayName": display_name.trim(),
                        "returnSecureToken": false,
                    }),
                )
                .await;
            if let Err(e) = update {
                tracing::warn!(error = %e, "Failed to set display name");
            }
        }

        Ok(session)
    }

    async fn send_email_verification(&self, id_token: &str) -> Result<(), AppError> {
        let _: serde_json::Value = self
            .accounts(
                "sendOobCode",
                json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }),
            )
            .await?;
        Ok(())
    }

    async fn start_phone_challenge(&self, phone_number: &str) -> Result<PhoneChallenge, AppError> {
        let mut body = json!({ "phoneNumber": phone_number });
        if let Some(token) = &self.recaptcha_token {
            body["recaptchaToken"] = json!(token);
        }

        let response: SendCodeResponse = self.accounts("sendVerificationCode", body).await?;
        Ok(PhoneChallenge {
            verification_id: response.session_info,
            phone_number: phone_number.to_string(),
        })
    }

    async fn confirm_phone_challenge(
        &self,
        challenge: &PhoneChallenge,
        code: &str,
    ) -> Result<ProviderSession, AppError> {
        let mut response: AuthResponse = self
            .accounts(
                "signInWithPhoneNumber",
                json!({ "sessionInfo": challenge.verification_id, "code": code }),
            )
            .await?;
        if response.phone_number.is_none() {
            response.phone_number = Some(challenge.phone_number.clone());
        }
        Ok(response.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession, AppError> {
        let url = format!("{}/token", self.secure_token_base_url);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(AppError::network)?;

        let r: RefreshResponse = check_response_json(response).await?;
        Ok(session_from(
            r.id_token,
            r.refresh_token,
            &r.user_id,
            r.expires_in.as_deref(),
            None,
            None,
        ))
    }

    async fn email_verified(&self, id_token: &str) -> Result<bool, AppError> {
        let response: LookupResponse = self
            .accounts("lookup", json!({ "idToken": id_token }))
            .await?;
        Ok(response.users.first().is_some_and(|u| u.email_verified))
    }

    async fn delete_account(&self, id_token: &str) -> Result<(), AppError> {
        let _: serde_json::Value = self
            .accounts("delete", json!({ "idToken": id_token }))
            .await?;
        Ok(())
    }
}
