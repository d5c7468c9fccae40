// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! ParkEasy client core: authenticated sessions and cached parking data.
//!
//! This crate bridges a Firebase identity with the ParkEasy GraphQL backend
//! and serves parking reads through a read-through cache.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod time_utils;

use config::Config;
use error::AppError;
use services::{
    AccountService, FirebaseAuthClient, GraphQlBackend, ParkingService, RetryPolicy,
    SessionManager,
};
use std::sync::Arc;
use store::{FileStore, TokenStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub parking: ParkingService,
    pub account: AccountService,
}

impl AppState {
    /// Wire the production stack: file-backed token store, Firebase identity
    /// provider and GraphQL backend.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let tokens = TokenStore::new(Arc::new(FileStore::new(&config.token_store_dir)));
        let identity = Arc::new(FirebaseAuthClient::new(http.clone(), &config));
        let backend = Arc::new(GraphQlBackend::new(
            http,
            config.graphql_endpoint.clone(),
            tokens.clone(),
        ));

        let session = SessionManager::start(
            identity,
            backend.clone(),
            tokens.clone(),
            RetryPolicy::from_config(&config),
        );
        let parking = ParkingService::new(backend.clone(), tokens, config.nearby_radius_meters);
        let account = AccountService::new(backend, session.clone(), parking.clone());

        tracing::info!(
            endpoint = %config.graphql_endpoint,
            store = %config.token_store_dir.display(),
            "Client initialized"
        );

        Ok(Self {
            config,
            session,
            parking,
            account,
        })
    }
}
