// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured for local development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Backend ---
    /// GraphQL endpoint of the parking backend
    pub graphql_endpoint: String,

    // --- Identity provider ---
    /// Web API key of the identity provider project
    pub firebase_api_key: String,
    /// Base URL of the account (Identity Toolkit) REST API
    pub identity_base_url: String,
    /// Base URL of the token refresh (Secure Token) REST API
    pub secure_token_base_url: String,
    /// Verification token forwarded with phone challenges, if the project requires one
    pub recaptcha_token: Option<String>,

    // --- Local state ---
    /// Directory holding the durable token store
    pub token_store_dir: PathBuf,

    // --- Tuning ---
    /// Timeout applied by the HTTP transport to every request
    pub http_timeout: Duration,
    /// Maximum attempts for a forced token refresh
    pub token_refresh_attempts: u32,
    /// Base delay of the exponential refresh backoff
    pub token_refresh_backoff: Duration,
    /// Default radius for nearby searches, in meters
    pub nearby_radius_meters: f64,
}

const DEFAULT_GRAPHQL_ENDPOINT: &str = "http://localhost:4000/graphql";
const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_SECURE_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/v1";

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            graphql_endpoint: DEFAULT_GRAPHQL_ENDPOINT.to_string(),
            firebase_api_key: "test_api_key".to_string(),
            identity_base_url: DEFAULT_IDENTITY_BASE_URL.to_string(),
            secure_token_base_url: DEFAULT_SECURE_TOKEN_BASE_URL.to_string(),
            recaptcha_token: None,
            token_store_dir: PathBuf::from(".parkeasy"),
            http_timeout: Duration::from_secs(15),
            token_refresh_attempts: 3,
            token_refresh_backoff: Duration::from_millis(250),
            nearby_radius_meters: 5000.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            graphql_endpoint: env::var("GRAPHQL_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_GRAPHQL_ENDPOINT.to_string()),
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            identity_base_url: env::var("IDENTITY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_BASE_URL.to_string()),
            secure_token_base_url: env::var("SECURE_TOKEN_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SECURE_TOKEN_BASE_URL.to_string()),
            recaptcha_token: env::var("RECAPTCHA_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            token_store_dir: env::var("TOKEN_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".parkeasy")),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 15)?),
            token_refresh_attempts: parse_var("TOKEN_REFRESH_ATTEMPTS", 3)?,
            token_refresh_backoff: Duration::from_millis(parse_var(
                "TOKEN_REFRESH_BACKOFF_MS",
                250,
            )?),
            nearby_radius_meters: parse_var("NEARBY_RADIUS_METERS", 5000.0)?,
        })
    }

    /// Required keys that are present but empty.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.graphql_endpoint.trim().is_empty() {
            missing.push("GRAPHQL_ENDPOINT");
        }
        if self.firebase_api_key.trim().is_empty() {
            missing.push("FIREBASE_API_KEY");
        }
        missing
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
