#![allow(dead_code, unused_macros)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quackstack::media::{MediaStore, MediaStoreError};
use quackstack::repo::inmem::InMemRepo;
use quackstack::{AppConfig, AppState};

pub const TEST_SECRET: &str = "test-secret-must-be-32-bytes-long!!";

// ---------------- In-memory Mock MediaStore (tests only) ----------------
#[derive(Default)]
pub struct MockMediaStore {
    pub inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MockMediaStore {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait::async_trait]
impl MediaStore for MockMediaStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        self.inner.lock().unwrap().insert(key.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        self.inner.lock().unwrap().get(key).cloned().ok_or(MediaStoreError::NotFound)
    }
    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        self.inner.lock().unwrap().remove(key).map(|_| ()).ok_or(MediaStoreError::NotFound)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_SECRET.into(),
        bcrypt_cost: 4,
        max_upload_bytes: 64 * 1024,
        default_page_size: 12,
        max_page_size: 50,
        ..AppConfig::default()
    }
}

pub fn test_state() -> (AppState, Arc<MockMediaStore>) {
    let media = Arc::new(MockMediaStore::default());
    let state = AppState {
        repo: Arc::new(InMemRepo::new()),
        media_store: media.clone(),
        config: Arc::new(test_config()),
    };
    (state, media)
}

// Minimal 1x1 PNG (transparent)
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

/// Builds a `multipart/form-data` body; returns (content-type, body).
pub fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let boundary = "XXQUACKBOUNDARYXX";
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"upload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(quackstack::config),
        )
        .await
    };
}

/// Sends a `TestRequest` and returns `(status, json body)`.
macro_rules! call_json {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        (status, body)
    }};
}

/// Registers `$name` and returns `(token, user id)`.
macro_rules! register {
    ($app:expr, $name:expr) => {{
        let name: &str = $name;
        let (status, body) = call_json!(
            $app,
            actix_web::test::TestRequest::post().uri("/api/user/register").set_json(serde_json::json!({
                "username": name,
                "email": format!("{name}@pond.test"),
                "password": "hunter22",
            }))
        );
        assert_eq!(status, actix_web::http::StatusCode::CREATED, "{body}");
        (body["token"].as_str().unwrap().to_string(), body["user"]["id"].as_i64().unwrap())
    }};
}

/// Uploads a Pekin named `$name` as the bearer of `$token`; returns the duck JSON.
macro_rules! post_duck {
    ($app:expr, $token:expr, $name:expr) => {{
        let png = common::sample_png();
        let (ct, body) = common::multipart(
            &[("name", $name), ("breed", "Pekin"), ("gender", "Female"), ("mood", "Happy"), ("isRubberDuck", "false")],
            Some(("image", &png)),
        );
        let (status, duck) = call_json!(
            $app,
            actix_web::test::TestRequest::post()
                .uri("/api/ducks")
                .insert_header(common::bearer(&$token))
                .insert_header(("content-type", ct))
                .set_payload(body)
        );
        assert_eq!(status, actix_web::http::StatusCode::CREATED, "{duck}");
        duck
    }};
}
