//! HTTP surface of the intake service.
//!
//! ## Structure
//!
//! - [`handler`] - route handlers for the public and admin endpoints.
//! - [`state`] - shared [`AppState`](state::AppState) passed to handlers.
//!
//! Every route is served both at the root and under `/api`.

pub mod handler;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

fn routes() -> Router<AppState> {
    Router::new()
        .route("/submit", post(handler::submit))
        .route("/next-token", get(handler::next_token))
        .route("/admin/login", post(handler::login))
        .route("/admin/users", get(handler::list_users))
        .route("/admin/users/{id}", put(handler::update_user))
        .route("/admin/stats", get(handler::stats))
        .route("/admin/export/{format}", get(handler::export))
        .route("/health", get(handler::health))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .fallback(handler::fallback)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{
        config::{ServerConfig, isolated_args},
        notify::{Notifier, NotifyError},
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokenq::{ServiceRequest, SqliteStore, StoreOptions};
    use tower::ServiceExt;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn confirm(&self, _: &ServiceRequest) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery {
                reason: "mail relay offline".into(),
            })
        }

        async fn remind(&self, _: &ServiceRequest) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        store: SqliteStore,
        app: Router,
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("tokens.db"), StoreOptions::default())
            .await
            .unwrap();
        let config =
            ServerConfig::try_from(isolated_args(&[("--jwt-secret", "router-test")])).unwrap();
        let state =
            AppState::new(store.clone(), &config).with_notifier(Arc::new(FailingNotifier));
        Harness {
            _dir: dir,
            store,
            app: router(state),
        }
    }

    impl Harness {
        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }

        async fn json(
            &self,
            method: &str,
            uri: &str,
            bearer: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = bearer {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.send(request).await;
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn login(&self) -> String {
            let (status, body) = self
                .json(
                    "POST",
                    "/admin/login",
                    None,
                    Some(json!({"username": "admin", "password": "admin123"})),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            body["token"].as_str().unwrap().to_string()
        }

        async fn submit(&self, name: &str) -> Value {
            let (status, body) = self
                .json(
                    "POST",
                    "/submit",
                    None,
                    Some(json!({
                        "name": name,
                        "email": format!("{}@example.com", name.to_lowercase()),
                        "address": "1 Main St",
                        "contact_number": "555-0100",
                        "work_description": "Leaking tap",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            body
        }
    }

    #[tokio::test]
    async fn submit_assigns_sequential_tokens_and_peek_tracks_them() {
        let h = harness().await;
        let (_, peek) = h.json("GET", "/next-token", None, None).await;
        assert_eq!(peek["next_token"], 1);

        let a = h.submit("Alice").await;
        assert_eq!(a["token_number"], 1);
        assert_eq!(a["status"], "Pending");

        let b = h.submit("Bob").await;
        assert_eq!(b["token_number"], 2);

        let (_, peek) = h.json("GET", "/api/next-token", None, None).await;
        assert_eq!(peek["next_token"], 3);
    }

    #[tokio::test]
    async fn invalid_submission_lists_fields_and_consumes_nothing() {
        let h = harness().await;
        let (status, body) = h
            .json(
                "POST",
                "/submit",
                None,
                Some(json!({"name": "  ", "email": "nope", "address": "x",
                            "contact_number": "1", "work_description": "y"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"], json!(["name", "email"]));
        assert!(body["error"].as_str().unwrap().contains("name"));

        let (_, peek) = h.json("GET", "/next-token", None, None).await;
        assert_eq!(peek["next_token"], 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let h = harness().await;
        let request = Request::builder()
            .method("POST")
            .uri("/submit")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = h.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_routes_require_a_valid_bearer_token() {
        let h = harness().await;
        for uri in ["/admin/users", "/admin/stats", "/admin/export/csv"] {
            let (status, body) = h.json("GET", uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert!(body["error"].is_string());

            let (status, _) = h.json("GET", uri, Some("forged"), None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }

        let (status, _) = h
            .json(
                "POST",
                "/admin/login",
                None,
                Some(json!({"email": "admin", "password": "wrong"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_accepts_email_alias() {
        let h = harness().await;
        let (status, body) = h
            .json(
                "POST",
                "/api/admin/login",
                None,
                Some(json!({"email": "admin", "password": "admin123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "admin");
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn stats_follow_status_changes() {
        let h = harness().await;
        let token = h.login().await;
        let a = h.submit("Alice").await;
        h.submit("Bob").await;

        let (_, body) = h.json("GET", "/admin/stats", Some(token.as_str()), None).await;
        assert_eq!(
            body["stats"],
            json!({"total": 2, "pending": 2, "completed": 0, "completed_works": 0})
        );

        let uri = format!("/admin/users/{}", a["id"].as_str().unwrap());
        let (status, updated) = h
            .json("PUT", &uri, Some(token.as_str()), Some(json!({"status": "Completed"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "Completed");
        assert_eq!(updated["token_number"], 1);

        let (_, body) = h.json("GET", "/admin/stats", Some(token.as_str()), None).await;
        assert_eq!(
            body["stats"],
            json!({"total": 2, "pending": 1, "completed": 1, "completed_works": 1})
        );
    }

    #[tokio::test]
    async fn update_rejects_unknown_ids_and_statuses() {
        let h = harness().await;
        let token = h.login().await;
        let a = h.submit("Alice").await;

        let (status, _) = h
            .json(
                "PUT",
                "/admin/users/not-a-uuid",
                Some(token.as_str()),
                Some(json!({"status": "Completed"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h
            .json(
                "PUT",
                &format!("/admin/users/{}", uuid::Uuid::new_v4()),
                Some(token.as_str()),
                Some(json!({"status": "Completed"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h
            .json(
                "PUT",
                &format!("/admin/users/{}", a["id"].as_str().unwrap()),
                Some(token.as_str()),
                Some(json!({"status": "Archived"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn users_can_be_searched_and_filtered() {
        let h = harness().await;
        let token = h.login().await;
        for name in ["Alice", "Bob", "Carol"] {
            h.submit(name).await;
        }

        let (_, body) = h
            .json("GET", "/admin/users?search=2", Some(token.as_str()), None)
            .await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["users"][0]["name"], "Bob");

        let (_, body) = h
            .json("GET", "/admin/users?search=CAROL", Some(token.as_str()), None)
            .await;
        assert_eq!(body["users"][0]["token_number"], 3);

        let (_, body) = h
            .json("GET", "/admin/users?status=Completed", Some(token.as_str()), None)
            .await;
        assert_eq!(body["total"], 0);

        let (_, body) = h
            .json("GET", "/admin/users?status=All", Some(token.as_str()), None)
            .await;
        let tokens: Vec<_> = body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["token_number"].as_u64().unwrap())
            .collect();
        assert_eq!(tokens, vec![1, 2, 3]);

        let (status, _) = h
            .json("GET", "/admin/users?status=Bogus", Some(token.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_sets_content_type_and_filename() {
        let h = harness().await;
        let token = h.login().await;
        h.submit("Alice").await;

        let request = Request::builder()
            .uri("/admin/export/csv")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = h.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"service_tokens_"));
        assert!(disposition.ends_with(".csv\""));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("1,Alice,"));

        let (status, _) = h
            .json("GET", "/admin/export/docx", Some(token.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_outage_is_reported_as_unavailable() {
        let h = harness().await;
        h.store.close().await;

        let (status, body) = h.json("GET", "/next-token", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Service temporarily unavailable, please retry");
    }

    #[tokio::test]
    async fn null_fields_are_validation_errors() {
        let h = harness().await;
        let (status, body) = h
            .json(
                "POST",
                "/submit",
                None,
                Some(json!({"name": null, "email": "a@x.com", "address": "1 St",
                            "contact_number": "555", "work_description": null})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"], json!(["name", "work_description"]));

        let (_, peek) = h.json("GET", "/next-token", None, None).await;
        assert_eq!(peek["next_token"], 1);
    }

    #[tokio::test]
    async fn unknown_paths_answer_with_json_errors() {
        let h = harness().await;
        for uri in ["/admin/unknown", "/api/admin/unknown"] {
            let (status, body) = h.json("GET", uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }

        let token = h.login().await;
        let (status, body) = h
            .json("GET", "/admin/unknown", Some(token.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No route for GET /admin/unknown");

        let (status, body) = h.json("GET", "/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness().await;
        let (status, body) = h.json("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
