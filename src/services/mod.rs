// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - identity, session, backend and cache layers.

pub mod account;
pub mod backend;
pub mod cache;
pub mod firebase;
pub mod identity;
pub mod parking;
pub mod queries;
pub mod session;

pub use account::AccountService;
pub use backend::{AccountBackend, AuthBackend, GraphQlBackend, ParkingBackend};
pub use cache::{CacheKey, KeyPattern, QueryCache, QueryShape, TtlClass};
pub use firebase::FirebaseAuthClient;
pub use identity::{IdentityAdapter, IdentityProvider};
pub use parking::{ParkingService, SearchResults};
pub use session::{AuthResult, RetryPolicy, SessionManager, SessionState};
