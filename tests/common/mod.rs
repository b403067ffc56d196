//! Shared harness: in-memory database, temporary upload directory and an
//! in-process router.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use medtrack_server::{
    api,
    config::{AppConfig, DatabaseConfig, UploadsConfig},
    models::{user::CreateUser, Actor, Role},
    AppState,
};

pub const ADMIN_PASSWORD: &str = "admin-password";
pub const BOUNDARY: &str = "medtrack-test-boundary";

pub fn test_config(uploads: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
    };
    config.auth.bootstrap_admin_password = Some(ADMIN_PASSWORD.to_string());
    config.uploads = UploadsConfig {
        directory: uploads.path().to_path_buf(),
        max_file_size_bytes: 1024 * 1024,
    };
    config
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub uploads: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let state = AppState::build(test_config(&uploads)).await.unwrap();
        let router = api::router(state.clone());
        Self {
            state,
            router,
            uploads,
        }
    }

    pub async fn admin_token(&self) -> String {
        self.state
            .services
            .users
            .authenticate("admin", ADMIN_PASSWORD)
            .await
            .unwrap()
            .token
    }

    /// Create a user with `role` and return a token for it.
    pub async fn token_for(&self, username: &str, role: Role) -> String {
        let users = &self.state.services.users;
        let user = users
            .create_user(
                CreateUser {
                    username: username.to_string(),
                    password: "password-123".to_string(),
                    role,
                    email: None,
                },
                &Actor::system(),
            )
            .await
            .unwrap();
        users.create_token_for_user(&user).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// POST a multipart form with text fields and `(field, filename, mime, bytes)` files.
    pub async fn multipart(
        &self,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &str, &[u8])],
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, files)))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, filename, mime, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, filename, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn ocm_body(serial: &str, log_number: &str) -> Value {
    serde_json::json!({
        "serial": serial,
        "department": "ICU",
        "model": "Monitor 5",
        "manufacturer": "Acme",
        "log_number": log_number,
        "service_date": "01/03/2026",
        "engineer": "Ali"
    })
}

pub fn ppm_body(serial: &str, log_number: &str) -> Value {
    serde_json::json!({
        "serial": serial,
        "department": "Radiology",
        "model": "X-200",
        "manufacturer": "Beta",
        "log_number": log_number,
        "installation_date": "15/01/2026"
    })
}
