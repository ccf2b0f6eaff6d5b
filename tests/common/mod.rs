#![allow(dead_code)]

use std::sync::Arc;

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tempfile::TempDir;
use tokio::net::TcpListener;

use sig_relay::config::SessionSecret;
use sig_relay::{api, AppState, Config};

/// A running server plus direct access to its state
pub struct TestServer {
    pub base_url: String,
    pub state: Arc<AppState>,
    pub client: Client,
    _data_dir: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to send request")
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)], token: Option<&str>) -> Response {
        let mut req = self.client.post(self.url(path)).form(fields);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to send request")
    }

    pub async fn post_multipart(&self, path: &str, form: Form, token: Option<&str>) -> Response {
        let mut req = self.client.post(self.url(path)).multipart(form);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to send request")
    }

    /// Register `name` with a fresh key pair and return the signing key
    pub async fn register(&self, name: &str) -> SigningKey {
        let key = SigningKey::generate(&mut OsRng);
        let resp = self
            .post_multipart("/register", register_form(name, &public_key_pem(&key)), None)
            .await;
        assert_eq!(resp.status(), 201, "register {}", name);
        key
    }

    pub async fn login(&self, name: &str) -> String {
        let resp = self.post_form("/token", &[("username", name)], None).await;
        assert_eq!(resp.status(), 200, "login {}", name);
        let body: serde_json::Value = resp.json().await.unwrap();
        body["data"]["access_token"]
            .as_str()
            .expect("access_token in response")
            .to_string()
    }
}

/// Start a test server on a random port
pub async fn spawn_test_server() -> TestServer {
    spawn_with(|_| {}).await
}

pub async fn spawn_with(tweak: impl FnOnce(&mut Config)) -> TestServer {
    let data_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = Config {
        data_dir: data_dir.path().to_path_buf(),
        host: "127.0.0.1".into(),
        port: 0,
        session_secret: SessionSecret::new(b"integration-secret".to_vec()),
        ..Config::default()
    };
    tweak(&mut config);

    let state = AppState::new(config);
    let app = api::create_router(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestServer {
        base_url: format!("http://{}", addr),
        state,
        client: Client::new(),
        _data_dir: data_dir,
    }
}

pub fn public_key_pem(key: &SigningKey) -> String {
    key.verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("PEM encoding")
}

pub fn register_form(name: &str, pem: &str) -> Form {
    Form::new().text("username", name.to_string()).part(
        "pubkey",
        Part::bytes(pem.as_bytes().to_vec()).file_name(format!("{}_pub.pem", name)),
    )
}

pub fn sign_hex(key: &SigningKey, payload: &[u8]) -> String {
    hex::encode(key.sign(payload).to_bytes())
}

/// Flip one hex digit, keeping the string valid hex
pub fn flip_hex_char(sig: &str, at: usize) -> String {
    let mut chars: Vec<char> = sig.chars().collect();
    chars[at] = if chars[at] == 'f' { 'e' } else { 'f' };
    chars.into_iter().collect()
}
