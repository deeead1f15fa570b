#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::{AppStateInner, router};
use parley_auth::bootstrap::{self, AdminSeed};
use parley_auth::{AuthService, HashParams, SecretHasher, TokenIssuer};
use parley_db::Database;

pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const ADMIN_PIN: &str = "9999";

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_data_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "parley-api-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub struct TestApp {
    pub app: Router,
    pub db: Arc<Database>,
    pub data_dir: PathBuf,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Vec<u8>,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap()
    }
}

pub fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let hasher = SecretHasher::new(HashParams {
        memory_kib: 1024,
        time_cost: 1,
        parallelism: 1,
        output_len: 32,
    });
    bootstrap::seed_defaults(
        &db,
        &hasher,
        &AdminSeed {
            password: ADMIN_PASSWORD,
            pin: ADMIN_PIN,
        },
    )
    .unwrap();

    let auth = AuthService::new(db.clone(), hasher, TokenIssuer::new(b"api-test-secret"));
    let data_dir = temp_data_dir();
    let state = Arc::new(AppStateInner::new(db.clone(), auth, data_dir.clone()));

    TestApp {
        app: router(state),
        db,
        data_dir,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec();
        Response {
            status,
            headers,
            bytes,
        }
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        let req = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    pub async fn upload(&self, uri: &str, token: &str, content_type: &str, bytes: Vec<u8>) -> Response {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap();
        self.send(req).await
    }

    /// Register through the HTTP surface; returns (token, user id).
    pub async fn register(&self, invite: &str, username: &str) -> (String, String) {
        let resp = self
            .json(
                Method::POST,
                "/api/v1/auth/register",
                None,
                json!({
                    "inviteCode": invite,
                    "username": username,
                    "displayName": username.to_uppercase(),
                    "password": format!("{username}-password"),
                    "pin": "1234",
                    "publicKey": format!("pk-{username}"),
                }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "register {username}");
        let body = resp.json();
        (
            body["token"].as_str().unwrap().to_string(),
            body["userId"].as_str().unwrap().to_string(),
        )
    }

    pub async fn login(&self, username: &str, password: &str, pin: &str) -> Response {
        self.json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            json!({ "username": username, "password": password, "pin": pin }),
        )
        .await
    }

    pub async fn admin_token(&self) -> String {
        let resp = self.login(bootstrap::ADMIN_USERNAME, ADMIN_PASSWORD, ADMIN_PIN).await;
        assert_eq!(resp.status, StatusCode::OK);
        resp.json()["token"].as_str().unwrap().to_string()
    }
}
