use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::util::ServiceExt;

use tracker_server::{app, config::Config, db::Database, AppState};

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

/// Build the full application router over a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory database");

    let db = Database { pool };
    db.run_migrations().await.expect("run migrations");

    let state = AppState {
        db: db.clone(),
        config: Config {
            port: 0,
            database_url: String::new(),
            jwt_secret: "test-secret".to_string(),
        },
    };

    TestApp {
        router: app(state),
        db,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("dispatch request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, body)
    }

    /// Register a user and return (token, user id).
    pub async fn register(&self, email: &str) -> (String, String) {
        let name = email.split('@').next().unwrap_or("test");
        let (status, body) = self
            .request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "name": name,
                    "password": "testpass123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");

        (
            body["token"].as_str().expect("token").to_string(),
            body["user"]["id"].as_str().expect("user id").to_string(),
        )
    }

    pub async fn create_project(&self, token: &str, name: &str) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/api/projects",
                Some(token),
                Some(json!({
                    "name": name,
                    "description": "Sample description",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create project failed: {body}");
        body
    }

    /// Create an issue under `project_id` with sensible defaults, merged
    /// with any overrides supplied in `extra`.
    pub async fn create_issue(
        &self,
        token: &str,
        project_id: &str,
        assigned_to: &str,
        extra: Value,
    ) -> Value {
        let mut payload = json!({
            "title": "Sample issue title",
            "description": "Sample description",
            "assigned_to": assigned_to,
        });
        if let (Some(base), Some(overrides)) = (payload.as_object_mut(), extra.as_object()) {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }

        let (status, body) = self
            .request(
                "POST",
                &format!("/api/projects/{project_id}/issues"),
                Some(token),
                Some(payload),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create issue failed: {body}");
        body
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.db.pool)
            .await
            .expect("count query")
    }
}
