use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use attendance::{
    build_state, config::AppConfig, create_router, models::Role, open_store, open_tokens,
    state::AppState, tokens::AuthUser,
};

pub const ROOT_USER: &str = "root";
pub const ROOT_PASSWORD: &str = "bootstrap-pass";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

/// Router over a file store in a fresh temporary directory, with a seeded
/// developer account.
pub async fn make_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();

    let mut config = AppConfig::default();
    config.store.path = dir.path().join("db.json").to_string_lossy().into_owned();
    config.bootstrap.username = Some(ROOT_USER.to_string());
    config.bootstrap.password = Some(ROOT_PASSWORD.to_string());

    let store = open_store(&config).await.unwrap();
    let tokens = open_tokens(&config).await.unwrap();
    let state = build_state(&config, store, tokens).await.unwrap();

    TestApp {
        router: create_router(state.clone()),
        state,
        _dir: dir,
    }
}

impl TestApp {
    /// Token for a caller without going through password login
    pub async fn token(&self, username: &str, role: Role) -> String {
        self.state
            .tokens
            .issue(AuthUser {
                username: username.to_string(),
                role,
            })
            .await
            .unwrap()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }
}
