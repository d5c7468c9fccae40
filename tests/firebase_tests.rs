// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication REST client against a mock HTTP server.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use parkeasy_client::config::Config;
use parkeasy_client::error::ErrorKind;
use parkeasy_client::models::PhoneChallenge;
use parkeasy_client::services::{FirebaseAuthClient, IdentityProvider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, recaptcha: Option<&str>) -> FirebaseAuthClient {
    let config = Config {
        identity_base_url: format!("{}/v1/", server.uri()),
        secure_token_base_url: format!("{}/st", server.uri()),
        recaptcha_token: recaptcha.map(str::to_string),
        ..Config::default()
    };
    FirebaseAuthClient::new(reqwest::Client::new(), &config)
}

fn id_token(subject: &str, email: Option<&str>) -> String {
    let now = Utc::now().timestamp();
    encode(
        &Header::default(),
        &json!({ "sub": subject, "iat": now, "exp": now + 3600, "email": email }),
        &EncodingKey::from_secret(b"unused"),
    )
    .unwrap()
}

fn provider_error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": { "code": status, "message": message }
    }))
}

#[tokio::test]
async fn test_sign_in_reads_token_claims() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(query_param("key", "test_api_key"))
        .and(body_partial_json(json!({
            "email": "user@example.com",
            "password": "correctpw",
            "returnSecureToken": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": id_token("uid-1", Some("user@example.com")),
            "refreshToken": "refresh-1",
            "localId": "uid-1",
            "expiresIn": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server, None)
        .sign_in_with_password("user@example.com", "correctpw")
        .await
        .unwrap();

    assert_eq!(session.subject(), "uid-1");
    assert_eq!(session.refresh_token, "refresh-1");
    assert_eq!(session.id_token.email.as_deref(), Some("user@example.com"));
}

#[tokio::test]
async fn test_opaque_token_falls_back_to_response_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "opaque",
            "refreshToken": "refresh-1",
            "localId": "uid-opaque",
            "expiresIn": "120",
            "email": "user@example.com"
        })))
        .mount(&server)
        .await;

    let session = client(&server, None)
        .sign_in_with_password("user@example.com", "correctpw")
        .await
        .unwrap();

    assert_eq!(session.id_token.raw, "opaque");
    assert_eq!(session.subject(), "uid-opaque");
    let lifetime = session.id_token.expires_at - session.id_token.issued_at;
    assert_eq!(lifetime.num_seconds(), 120);
}

#[tokio::test]
async fn test_provider_error_codes_are_mapped() {
    let cases = [
        ("INVALID_LOGIN_CREDENTIALS", ErrorKind::InvalidCredentials),
        ("USER_DISABLED", ErrorKind::AccountDisabled),
        ("TOO_MANY_ATTEMPTS_TRY_LATER : Access temporarily disabled", ErrorKind::TooManyAttempts),
        ("INVALID_EMAIL", ErrorKind::InvalidIdentifierFormat),
        ("OPERATION_NOT_ALLOWED", ErrorKind::UnknownIdentityError),
    ];

    for (code, kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(provider_error(400, code))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .sign_in_with_password("user@example.com", "pw")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), kind, "{code}");
    }
}

#[tokio::test]
async fn test_provider_outage_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .sign_in_with_password("user@example.com", "pw")
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_sign_up_sets_display_name_best_effort() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signUp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": id_token("uid-new", Some("new@example.com")),
            "refreshToken": "refresh-new",
            "localId": "uid-new"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:update"))
        .and(body_partial_json(json!({ "displayName": "Ada Lovelace" })))
        .respond_with(provider_error(400, "INVALID_ID_TOKEN"))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server, None)
        .register_with_password("new@example.com", "secret1", "Ada Lovelace")
        .await
        .unwrap();

    assert_eq!(session.subject(), "uid-new");
}

#[tokio::test]
async fn test_sign_up_weak_password() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signUp"))
        .respond_with(provider_error(
            400,
            "WEAK_PASSWORD : Password should be at least 6 characters",
        ))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .register_with_password("new@example.com", "abc", "")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WeakSecret);
}

#[tokio::test]
async fn test_refresh_posts_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/st/token"))
        .and(query_param("key", "test_api_key"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": id_token("uid-1", None),
            "refresh_token": "refresh-2",
            "user_id": "uid-1",
            "expires_in": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server, None).refresh("refresh-1").await.unwrap();

    assert_eq!(session.subject(), "uid-1");
    assert_eq!(session.refresh_token, "refresh-2");
}

#[tokio::test]
async fn test_phone_challenge_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:sendVerificationCode"))
        .and(body_partial_json(json!({
            "phoneNumber": "+46701234567",
            "recaptchaToken": "captcha"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sessionInfo": "vid-1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPhoneNumber"))
        .and(body_partial_json(json!({ "sessionInfo": "vid-1", "code": "123456" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "opaque-phone",
            "refreshToken": "refresh-phone",
            "localId": "uid-phone"
        })))
        .mount(&server)
        .await;
    let client = client(&server, Some("captcha"));

    let challenge = client.start_phone_challenge("+46701234567").await.unwrap();
    assert_eq!(
        challenge,
        PhoneChallenge {
            verification_id: "vid-1".to_string(),
            phone_number: "+46701234567".to_string(),
        }
    );

    let session = client
        .confirm_phone_challenge(&challenge, "123456")
        .await
        .unwrap();
    assert_eq!(session.subject(), "uid-phone");
    assert_eq!(session.id_token.phone_number.as_deref(), Some("+46701234567"));
}

#[tokio::test]
async fn test_expired_challenge_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPhoneNumber"))
        .respond_with(provider_error(400, "SESSION_EXPIRED"))
        .mount(&server)
        .await;
    let challenge = PhoneChallenge {
        verification_id: "vid-old".to_string(),
        phone_number: "+46701234567".to_string(),
    };

    let err = client(&server, None)
        .confirm_phone_challenge(&challenge, "123456")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidChallengeCode);
}

#[tokio::test]
async fn test_lookup_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .and(body_partial_json(json!({ "idToken": "tok" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "localId": "uid-1", "emailVerified": true }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:delete"))
        .and(body_partial_json(json!({ "idToken": "tok" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:sendOobCode"))
        .and(body_partial_json(json!({ "requestType": "VERIFY_EMAIL" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": "user@example.com" })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client(&server, None);

    assert!(client.email_verified("tok").await.unwrap());
    client.delete_account("tok").await.unwrap();
    client.send_email_verification("tok").await.unwrap();
}
