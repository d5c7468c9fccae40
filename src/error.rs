// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with a stable, provider-independent taxonomy.
//!
//! Every failure the library can produce maps onto an [`ErrorKind`]. Callers
//! branch on the kind, never on provider- or backend-specific strings.

use serde::{Deserialize, Serialize};

/// Stable error taxonomy surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    StorageWriteError,
    StorageReadError,
    InvalidIdentifierFormat,
    InvalidCredentials,
    AccountDisabled,
    TooManyAttempts,
    IdentifierAlreadyInUse,
    WeakSecret,
    InvalidChallengeCode,
    UnknownIdentityError,
    BackendVerificationFailed,
    BackendLoginFailed,
    BackendRegistrationFailed,
    RegistrationRequired,
    NoCurrentIdentity,
    TokenRefreshFailed,
    NetworkError,
    Unauthorized,
    InvalidInput,
    NotFound,
    BackendError,
    /// Internal-only: a reconciliation result was superseded by a newer identity change.
    StaleGenerationDiscarded,
    Internal,
}

impl ErrorKind {
    /// Short human-readable copy for this kind of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifierFormat => {
                "Enter a valid email address or a phone number starting with +"
            }
            ErrorKind::InvalidCredentials => "Incorrect email or password",
            ErrorKind::AccountDisabled => "This account has been disabled",
            ErrorKind::TooManyAttempts => "Too many attempts. Please wait and try again later",
            ErrorKind::IdentifierAlreadyInUse => "An account with this email or phone already exists",
            ErrorKind::WeakSecret => "Password must be at least 6 characters long",
            ErrorKind::InvalidChallengeCode => "Invalid verification code. Please try again",
            ErrorKind::RegistrationRequired => "Complete your profile to finish signing up",
            ErrorKind::NoCurrentIdentity => "You are signed out. Please sign in again",
            ErrorKind::NetworkError => "Network problem. Check your connection and try again",
            _ => "Something went wrong. Please try again",
        }
    }

    /// Whether the failure is credential-shaped (gets specific copy in the UI).
    pub fn is_credential_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidIdentifierFormat
                | ErrorKind::InvalidCredentials
                | ErrorKind::AccountDisabled
                | ErrorKind::TooManyAttempts
                | ErrorKind::IdentifierAlreadyInUse
                | ErrorKind::WeakSecret
                | ErrorKind::InvalidChallengeCode
        )
    }
}

/// Application error type.
///
/// `Clone` so that a single coalesced fetch can hand the same failure to
/// every waiting caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    #[error("Storage read failed: {0}")]
    StorageRead(String),

    #[error("Identity provider error: {message}")]
    Identity { kind: ErrorKind, message: String },

    #[error("Backend rejected request: {message}")]
    Backend { kind: ErrorKind, message: String },

    #[error("No identity is currently signed in")]
    NoCurrentIdentity,

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Superseded by identity change (started at generation {started}, now {current})")]
    StaleGeneration { started: u64, current: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for identity-provider failures.
    pub fn identity(kind: ErrorKind, message: impl Into<String>) -> Self {
        AppError::Identity {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for backend `success=false` envelopes.
    pub fn backend(kind: ErrorKind, message: impl Into<String>) -> Self {
        AppError::Backend {
            kind,
            message: message.into(),
        }
    }

    /// Map this error onto the stable taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::StorageWrite(_) => ErrorKind::StorageWriteError,
            AppError::StorageRead(_) => ErrorKind::StorageReadError,
            AppError::Identity { kind, .. } | AppError::Backend { kind, .. } => *kind,
            AppError::NoCurrentIdentity => ErrorKind::NoCurrentIdentity,
            AppError::TokenRefresh(_) => ErrorKind::TokenRefreshFailed,
            AppError::Network(_) => ErrorKind::NetworkError,
            AppError::Unauthorized => ErrorKind::Unauthorized,
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::StaleGeneration { .. } => ErrorKind::StaleGenerationDiscarded,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this is a `401`-class rejection from the backend.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Unauthorized)
    }

    /// Transport-level failures that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }

    /// Convert a transport failure into `AppError::Network`.
    pub fn network(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Network(format!("request timed out: {}", err))
        } else {
            AppError::Network(err.to_string())
        }
    }
}

/// Structured failure returned by the session manager's public operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl AuthFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Text suitable for display.
    ///
    /// Backend messages are passed through; everything else uses the
    /// kind's copy.
    pub fn display_message(&self) -> &str {
        match self.kind {
            ErrorKind::BackendVerificationFailed
            | ErrorKind::BackendLoginFailed
            | ErrorKind::BackendRegistrationFailed
                if !self.message.is_empty() =>
            {
                &self.message
            }
            kind => kind.user_message(),
        }
    }
}

impl From<&AppError> for AuthFailure {
    fn from(err: &AppError) -> Self {
        match err {
            // Never surfaced: a superseded run looks like a session that went away.
            AppError::StaleGeneration { .. } => AuthFailure::new(
                ErrorKind::NoCurrentIdentity,
                "Session changed before the operation completed",
            ),
            AppError::Identity { kind, message } | AppError::Backend { kind, message } => {
                AuthFailure::new(*kind, message.clone())
            }
            other => AuthFailure::new(other.kind(), other.to_string()),
        }
    }
}
