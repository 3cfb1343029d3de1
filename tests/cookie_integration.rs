//! Integration tests for cookie retention and `Set-Cookie` normalization.
//!
//! The session must keep cookies from the sign-in handshake and attach them
//! to every later request, even when the server quotes the `Version`
//! attribute the way some legacy backends do.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tfinvite_core::{NormalizingJar, Session, SessionOptions};

// ---- Jar-level behavior through a plain reqwest client ----

#[tokio::test]
async fn test_quoted_version_cookie_is_stored_and_replayed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/set"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", r#"myacinfo=deadbeef; Version="1"; Path=/"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/echo"))
        .and(header("cookie", "myacinfo=deadbeef"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = reqwest::Client::builder()
        .cookie_provider(Arc::new(NormalizingJar::new()))
        .build()
        .unwrap();

    client
        .get(format!("{}/set", server.uri()))
        .send()
        .await
        .unwrap();
    let response = client
        .get(format!("{}/echo", server.uri()))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

// ---- Session-level behavior: sign-in cookies ride on later requests ----

#[tokio::test]
async fn test_signin_cookies_authenticate_subsequent_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/itc/static-resources/controllers/login_cntrl.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("itcServiceKey = 'KEY';"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/appleauth/auth/signin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", r#"myacinfo=deadbeef; Version="1"; Path=/"#),
        )
        .mount(&server)
        .await;
    // The profile fetch only matches when the session cookie rides along;
    // without it the inference request 404s and login fails.
    Mock::given(method("GET"))
        .and(path("/WebObjects/iTunesConnect.woa/ra/user/detail"))
        .and(header("cookie", "myacinfo=deadbeef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "associatedAccounts": [
                    {"contentProvider": {"contentProviderId": "11142800"}}
                ],
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/testflight/v2/providers/11142800/apps/12345/groups"))
        .and(header("cookie", "myacinfo=deadbeef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "g-ext", "isDefaultExternalGroup": true}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::with_base_urls(
        "dev@example.com",
        "secret-password",
        "12345",
        SessionOptions::default(),
        server.uri(),
        server.uri(),
    )
    .unwrap();

    session.login().await.unwrap();
    assert!(session.is_logged_in());
    assert_eq!(session.group_id(), Some("g-ext"));
}
