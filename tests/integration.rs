//! Integration tests for the signed relay service

mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use common::{flip_hex_char, public_key_pem, register_form, sign_hex, spawn_test_server, spawn_with};
use sig_relay::audit_log::Actor;

#[tokio::test]
async fn test_health_endpoint() {
    let server = spawn_test_server().await;

    let resp = server.get("/health", None).await;
    assert!(resp.status().is_success());

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "OK");
    assert_eq!(body["data"]["identities_count"], 0);
}

#[tokio::test]
async fn test_alice_verifies_hello() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;
    let token = server.login("alice").await;

    let sig = sign_hex(&alice, b"hello");
    let resp = server
        .post_form(
            "/verify-text",
            &[("sender", "alice"), ("message", "hello"), ("signature_hex", &sig)],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "VALID");
    assert_eq!(body["data"]["signed_by"], "alice");
    assert_eq!(body["data"]["verified_by"], "alice");

    let tampered = flip_hex_char(&sig, 10);
    let resp = server
        .post_form(
            "/verify-text",
            &[("sender", "alice"), ("message", "hello"), ("signature_hex", &tampered)],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "INVALID SIGNATURE");
}

#[tokio::test]
async fn test_third_party_verification() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;
    server.register("bob").await;
    let bob_token = server.login("bob").await;

    let sig = sign_hex(&alice, b"signed by alice");
    let resp = server
        .post_form(
            "/verify-text",
            &[
                ("sender", "alice"),
                ("message", "signed by alice"),
                ("signature_hex", &sig),
            ],
            Some(&bob_token),
        )
        .await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["signed_by"], "alice");
    assert_eq!(body["data"]["verified_by"], "bob");

    // Malformed and unknown sender are reported differently from a bad signature
    let resp = server
        .post_form(
            "/verify-text",
            &[
                ("sender", "alice"),
                ("message", "signed by alice"),
                ("signature_hex", &sig[..64]),
            ],
            Some(&bob_token),
        )
        .await;
    assert_eq!(resp.status(), 422);

    let resp = server
        .post_form(
            "/verify-text",
            &[("sender", "carol"), ("message", "x"), ("signature_hex", &sig)],
            Some(&bob_token),
        )
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_verify_requires_session() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;
    let sig = sign_hex(&alice, b"hello");
    let fields = [("sender", "alice"), ("message", "hello"), ("signature_hex", sig.as_str())];

    let resp = server.post_form("/verify-text", &fields, None).await;
    assert_eq!(resp.status(), 401);

    let resp = server
        .post_form("/verify-text", &fields, Some("not.a.token"))
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_session_checked_before_form_body() {
    let server = spawn_test_server().await;
    server.register("bob").await;

    // Incomplete body and no session: the session failure wins
    let resp = server
        .post_form("/relay-text", &[("message", "hi")], None)
        .await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid / expired token");
    assert!(body["hint"].is_string());

    let resp = server
        .post_form("/verify-text", &[("sender", "bob")], Some("bogus"))
        .await;
    assert_eq!(resp.status(), 401);

    assert_eq!(server.state.mailbox.total(), 0);
}

#[tokio::test]
async fn test_incomplete_form_is_bad_request() {
    let server = spawn_test_server().await;
    server.register("alice").await;
    server.register("bob").await;
    let token = server.login("alice").await;

    // Missing signature is reported apart from a malformed one
    let resp = server
        .post_form(
            "/verify-text",
            &[("sender", "alice"), ("message", "hello")],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("signature_hex"));

    let resp = server
        .post_form("/relay-text", &[("message", "hi")], Some(&token))
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    let resp = server.post_form("/token", &[], None).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_registration_errors() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;

    // Second registration cannot replace the key
    let other = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    let resp = server
        .post_multipart("/register", register_form("alice", &public_key_pem(&other)), None)
        .await;
    assert_eq!(resp.status(), 409);

    // Taken username wins over a bad key
    let resp = server
        .post_multipart("/register", register_form("alice", "not a pem"), None)
        .await;
    assert_eq!(resp.status(), 409);

    let resp = server
        .post_multipart("/register", register_form("mallory", "not a pem"), None)
        .await;
    assert_eq!(resp.status(), 400);

    let resp = server
        .post_multipart(
            "/register",
            Form::new().text("username", "nokey"),
            None,
        )
        .await;
    assert_eq!(resp.status(), 400);

    // Original key still verifies
    let token = server.login("alice").await;
    let sig = sign_hex(&alice, b"still mine");
    let resp = server
        .post_form(
            "/verify-text",
            &[("sender", "alice"), ("message", "still mine"), ("signature_hex", &sig)],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_token_for_unknown_user() {
    let server = spawn_test_server().await;
    let resp = server.post_form("/token", &[("username", "ghost")], None).await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_unauthenticated_relay_is_rejected() {
    let server = spawn_test_server().await;
    server.register("alice").await;
    let bob = server.register("bob").await;

    let sig = sign_hex(&bob, b"hi alice");
    let resp = server
        .post_form(
            "/relay-text",
            &[("to", "alice"), ("message", "hi alice"), ("signature_hex", &sig)],
            None,
        )
        .await;
    assert_eq!(resp.status(), 401);

    assert_eq!(server.state.mailbox.total(), 0);
    let alice_token = server.login("alice").await;
    let body: Value = server
        .get("/inbox", Some(&alice_token))
        .await
        .json()
        .await
        .unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_relay_text_sender_comes_from_session() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;
    server.register("bob").await;
    server.register("carol").await;
    let alice_token = server.login("alice").await;

    // A body-supplied sender is ignored
    let sig = sign_hex(&alice, b"first");
    let resp = server
        .post_form(
            "/relay-text",
            &[
                ("to", "bob"),
                ("sender", "carol"),
                ("message", "first"),
                ("signature_hex", &sig),
            ],
            Some(&alice_token),
        )
        .await;
    assert_eq!(resp.status(), 201);

    let sig = sign_hex(&alice, b"second");
    let resp = server
        .post_form(
            "/relay-text",
            &[("to", "bob"), ("message", "second"), ("signature_hex", &sig)],
            Some(&alice_token),
        )
        .await;
    assert_eq!(resp.status(), 201);

    let bob_token = server.login("bob").await;
    let first: Value = server.get("/inbox", Some(&bob_token)).await.json().await.unwrap();
    let second: Value = server.get("/inbox", Some(&bob_token)).await.json().await.unwrap();
    assert_eq!(first, second);

    let entries = first["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["message"], "first");
    assert_eq!(entries[1]["message"], "second");
    assert!(entries.iter().all(|e| e["sender"] == "alice" && e["type"] == "text"));
}

#[tokio::test]
async fn test_relay_with_bad_signature_writes_nothing() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;
    server.register("bob").await;
    let token = server.login("alice").await;

    let sig = sign_hex(&alice, b"original");
    let resp = server
        .post_form(
            "/relay-text",
            &[("to", "bob"), ("message", "altered"), ("signature_hex", &sig)],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 400);

    let resp = server
        .post_form(
            "/relay-text",
            &[("to", "bob"), ("message", "original"), ("signature_hex", "xyz")],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 422);

    let resp = server
        .post_form(
            "/relay-text",
            &[("to", "nobody"), ("message", "original"), ("signature_hex", &sig)],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 404);

    assert_eq!(server.state.mailbox.total(), 0);
}

#[tokio::test]
async fn test_document_verify_and_relay() {
    let server = spawn_test_server().await;
    let alice = server.register("alice").await;
    server.register("bob").await;
    let alice_token = server.login("alice").await;

    let content: Vec<u8> = b"%PDF-1.7\n\x00\x01\x02binary\xff\xfe".to_vec();
    let sig = sign_hex(&alice, &content);

    let form = Form::new()
        .text("sender", "alice")
        .text("signature_hex", sig.clone())
        .part(
            "document",
            Part::bytes(content.clone()).file_name("contract.pdf"),
        );
    let resp = server
        .post_multipart("/verify-document", form, Some(&alice_token))
        .await;
    assert_eq!(resp.status(), 200);

    // Legacy route and field name
    let form = Form::new()
        .text("to", "bob")
        .text("signature_hex", sig.clone())
        .part("pdf", Part::bytes(content.clone()).file_name("contract.pdf"));
    let resp = server
        .post_multipart("/relay-pdf", form, Some(&alice_token))
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["type"], "document");

    let bob_token = server.login("bob").await;
    let body: Value = server.get("/inbox", Some(&bob_token)).await.json().await.unwrap();
    let entry = &body["data"][0];
    assert_eq!(entry["type"], "document");
    assert_eq!(entry["sender"], "alice");
    assert_eq!(entry["filename"], "contract.pdf");
    assert_eq!(
        BASE64.decode(entry["content_base64"].as_str().unwrap()).unwrap(),
        content
    );
    assert_eq!(entry["signature"], sig);
}

#[tokio::test]
async fn test_open_mailbox_accepts_unregistered_recipient() {
    let server = spawn_with(|c| c.require_registered_recipient = false).await;
    let alice = server.register("alice").await;
    let token = server.login("alice").await;

    let sig = sign_hex(&alice, b"for later");
    let resp = server
        .post_form(
            "/relay-text",
            &[("to", "dave"), ("message", "for later"), ("signature_hex", &sig)],
            Some(&token),
        )
        .await;
    assert_eq!(resp.status(), 201);

    server.register("dave").await;
    let dave_token = server.login("dave").await;
    let body: Value = server.get("/inbox", Some(&dave_token)).await.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_every_request_is_audited() {
    let server = spawn_test_server().await;
    server.register("alice").await;
    let token = server.login("alice").await;

    let _ = server.get("/inbox", Some(&token)).await;
    let _ = server.get("/inbox", Some("bogus")).await;
    let _ = server.get("/inbox", None).await;
    let _ = server.get("/health", None).await;

    let recent = server.state.audit.recent(100).await;
    assert_eq!(recent.len(), 6);

    // Newest first
    assert_eq!(recent[0].path, "/health");
    assert_eq!(recent[0].actor, Actor::Anonymous);
    assert_eq!(recent[1].status, 401);
    assert_eq!(recent[1].actor, Actor::Anonymous);
    assert_eq!(recent[2].status, 401);
    assert_eq!(recent[2].actor, Actor::InvalidToken);
    assert_eq!(recent[3].status, 200);
    assert_eq!(recent[3].actor, Actor::user("alice"));
    assert_eq!(recent[4].path, "/token");
    assert_eq!(recent[5].path, "/register");
    assert_eq!(recent[5].method, "POST");
    assert_eq!(recent[5].status, 201);

    let seqs: Vec<u64> = recent.iter().rev().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=6).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_own_audit_trail() {
    let server = spawn_test_server().await;
    server.register("alice").await;
    server.register("bob").await;
    let alice_token = server.login("alice").await;
    let bob_token = server.login("bob").await;

    let _ = server.get("/inbox", Some(&alice_token)).await;
    let _ = server.get("/inbox", Some(&bob_token)).await;

    let body: Value = server
        .get("/audit?limit=10", Some(&alice_token))
        .await
        .json()
        .await
        .unwrap();
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["path"], "/inbox");
    assert_eq!(entries[0]["actor"]["username"], "alice");
}
