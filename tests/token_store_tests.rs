// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token store over the file-backed and in-memory stores.

use chrono::Utc;
use parkeasy_client::error::ErrorKind;
use parkeasy_client::models::{BackendSession, IdentityToken, ProviderSession, RegistrationProfile};
use parkeasy_client::store::{keys, FileStore, KeyValueStore, MemoryStore, TokenStore};
use std::sync::Arc;
use tempfile::TempDir;

mod common;
use common::test_user;

fn provider_session(subject: &str) -> ProviderSession {
    ProviderSession {
        id_token: IdentityToken::from_parts(format!("idtoken-{subject}"), subject, 3600, None),
        refresh_token: format!("refresh-{subject}"),
    }
}

fn backend_session(subject: &str) -> BackendSession {
    BackendSession {
        token: format!("session-{subject}"),
        user_id: "user-1".to_string(),
        identity_subject: subject.to_string(),
        issued_at: Utc::now(),
    }
}

fn file_store() -> (TokenStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(Arc::new(FileStore::new(dir.path().join("tokens"))));
    (store, dir)
}

#[tokio::test]
async fn test_file_store_round_trip_and_delete() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path().join("nested"));

    assert_eq!(store.get("authToken").await.unwrap(), None);
    store.put("authToken", "v1").await.unwrap();
    store.put("authToken", "v2").await.unwrap();
    assert_eq!(store.get("authToken").await.unwrap().as_deref(), Some("v2"));

    store.delete("authToken").await.unwrap();
    store.delete("authToken").await.unwrap();
    assert_eq!(store.get("authToken").await.unwrap(), None);

    let leftovers: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn test_file_store_rejects_path_like_keys() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path());

    for bad in ["", "../escape", "a/b", "dot.name"] {
        let err = store.put(bad, "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{bad:?}");
    }
}

#[tokio::test]
async fn test_file_store_unwritable_directory() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let store = FileStore::new(&blocker);

    let err = store.put("user", "{}").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageWriteError);
}

#[tokio::test]
async fn test_typed_values_survive_reopen() {
    let (store, dir) = file_store();
    store.put_identity(&provider_session("uid-1")).await.unwrap();
    store.put_session(&backend_session("uid-1")).await.unwrap();
    store.put_user(&test_user("user-1")).await.unwrap();

    let reopened = TokenStore::new(Arc::new(FileStore::new(dir.path().join("tokens"))));

    assert_eq!(
        reopened.identity().await.unwrap(),
        store.identity().await.unwrap()
    );
    let (identity, session) = reopened.session_pair().await.unwrap().unwrap();
    assert_eq!(identity.subject(), "uid-1");
    assert_eq!(session.token, "session-uid-1");
    assert_eq!(reopened.user().await.unwrap().unwrap().id, "user-1");
}

#[tokio::test]
async fn test_corrupt_value_is_a_read_error() {
    let (store, _dir) = file_store();
    store.put(keys::USER, "{\"id\":").await.unwrap();

    let err = store.user().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageReadError);
}

#[tokio::test]
async fn test_session_pair_requires_matching_subjects() {
    let store = TokenStore::in_memory();
    store.put_identity(&provider_session("uid-1")).await.unwrap();
    assert!(store.session_pair().await.unwrap().is_none());

    store.put_session(&backend_session("uid-2")).await.unwrap();
    assert!(store.session_pair().await.unwrap().is_none());

    store.put_session(&backend_session("uid-1")).await.unwrap();
    assert!(store.session_pair().await.unwrap().is_some());
}

#[tokio::test]
async fn test_mismatched_session_token_is_not_attached() {
    let store = TokenStore::in_memory();
    store.put_session(&backend_session("uid-1")).await.unwrap();
    store.put_identity(&provider_session("uid-2")).await.unwrap();

    assert_eq!(store.current_session_token().await.unwrap(), None);

    // The newer identity survives a request that saw the older session.
    assert_eq!(store.identity().await.unwrap().unwrap().subject(), "uid-2");
    assert!(store.session().await.unwrap().is_some());
}

#[tokio::test]
async fn test_orphaned_session_token_is_not_attached() {
    let store = TokenStore::in_memory();
    store.put_session(&backend_session("uid-1")).await.unwrap();

    assert_eq!(store.current_session_token().await.unwrap(), None);
    assert!(store.session().await.unwrap().is_some());
}

#[tokio::test]
async fn test_current_session_token_for_matching_pair() {
    let store = TokenStore::in_memory();
    store.put_identity(&provider_session("uid-1")).await.unwrap();
    store.put_session(&backend_session("uid-1")).await.unwrap();

    assert_eq!(
        store.current_session_token().await.unwrap().as_deref(),
        Some("session-uid-1")
    );
}

#[tokio::test]
async fn test_clear_all_removes_everything() {
    let memory = Arc::new(MemoryStore::new());
    let store = TokenStore::new(memory.clone());
    store.put_identity(&provider_session("uid-1")).await.unwrap();
    store.put_session(&backend_session("uid-1")).await.unwrap();
    store.put_user(&test_user("user-1")).await.unwrap();
    store
        .put_pending_signup(&RegistrationProfile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: None,
            phone_number: Some("+46701234567".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(memory.len(), 4);

    store.clear_all().await.unwrap();

    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_failed_write_is_reported() {
    let memory = Arc::new(MemoryStore::new());
    let store = TokenStore::new(memory.clone());
    memory.set_fail_writes(true);

    let err = store.put_user(&test_user("user-1")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageWriteError);
    assert!(!memory.contains(keys::USER));
}
