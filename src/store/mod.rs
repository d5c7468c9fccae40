// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable key-value storage for credentials, the cached user record and
//! parking preferences.

pub mod file_store;
pub mod memory;
pub mod token_store;

pub use file_store::FileStore;
pub use memory::MemoryStore;
pub use token_store::TokenStore;

use crate::error::AppError;
use async_trait::async_trait;

/// Key names as constants.
pub mod keys {
    /// Current provider session (identity token plus refresh token)
    pub const IDENTITY_TOKEN: &str = "identityToken";
    /// Backend session token
    pub const SESSION_TOKEN: &str = "authToken";
    pub const USER: &str = "user";
    /// Registration profile held while a phone challenge is pending
    pub const PENDING_SIGNUP: &str = "pendingSignup";
    /// Favorite parking ids, in the order they were added
    pub const FAVORITES: &str = "favoriteParkings";
    /// Recent search queries, most recent first
    pub const RECENT_SEARCHES: &str = "recentSearches";
}

/// Bare durable string storage.
///
/// Calls may interleave; callers serialize writes to the same key
/// themselves when ordering matters.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Durable, idempotent write.
    async fn put(&self, name: &str, value: &str) -> Result<(), AppError>;

    /// Stored value, or `None` if absent. Absence is not an error.
    async fn get(&self, name: &str) -> Result<Option<String>, AppError>;

    /// Idempotent removal.
    async fn delete(&self, name: &str) -> Result<(), AppError>;
}
