//! Dispatcher behavior: matching, pass-through, disabled routes, custom
//! recipes, and the emailpassword in-band error statuses.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use common::{body_json, MockCore};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use soglia::emailpassword::types::EmailPasswordConfig;
use soglia::error::RecipeError;
use soglia::normalised::NormalisedURLPath;
use soglia::querier::CoreConnection;
use soglia::recipe::{ApiHandled, ApiRequest, BoxFut, HttpMethod, RecipeModule};
use soglia::response::ResponseSink;
use soglia::session::config::SessionConfig;
use soglia::{AppInfo, Soglia};

fn app_info() -> AppInfo {
    AppInfo::new("Demo", "https://api.example.com", "https://www.example.com").unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sign_up_body(email: &str, password: &str) -> serde_json::Value {
    json!({
        "formFields": [
            { "id": "email", "value": email },
            { "id": "password", "value": password },
        ]
    })
}

#[tokio::test]
async fn duplicate_sign_up_reports_in_band() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(EmailPasswordConfig::new())
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    let first = app
        .clone()
        .oneshot(post_json("/auth/signup", sign_up_body("a@b.co", "abc12345")))
        .await
        .unwrap();
    assert_eq!(body_json(first).await["status"], "OK");

    let second = app
        .oneshot(post_json("/auth/signup", sign_up_body("a@b.co", "other9999")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await["status"], "EMAIL_ALREADY_EXISTS_ERROR");
}

#[tokio::test]
async fn wrong_credentials_report_in_band() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(EmailPasswordConfig::new())
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    let signed_up = app
        .clone()
        .oneshot(post_json("/auth/signup", sign_up_body("a@b.co", "abc12345")))
        .await
        .unwrap();
    assert_eq!(body_json(signed_up).await["status"], "OK");

    let response = app
        .oneshot(post_json("/auth/signin", sign_up_body("a@b.co", "wrong1234")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "WRONG_CREDENTIALS_ERROR");
}

#[tokio::test]
async fn sign_up_field_errors_are_aggregated() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(EmailPasswordConfig::new())
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    let response = app
        .oneshot(post_json("/auth/signup", sign_up_body("bad-email", "short")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "FIELD_ERROR");
    assert_eq!(body["formFields"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_json_body_is_bad_input() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(EmailPasswordConfig::new())
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/signup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disabled_refresh_api_falls_through_to_the_application() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_session(SessionConfig::new().disable_default_refresh_api())
        .build()
        .unwrap();
    let app = Router::new()
        .route("/auth/session/refresh", post(|| async { "custom refresh" }))
        .layer(soglia.layer());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/session/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // No session handling happened; the application's handler answered.
    assert!(!response.headers().contains_key("id-refresh-token"));
}

#[tokio::test]
async fn users_are_queryable_by_email_and_id() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(EmailPasswordConfig::new())
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    let signed_up = app
        .oneshot(post_json("/auth/signup", sign_up_body("a@b.co", "abc12345")))
        .await
        .unwrap();
    assert_eq!(body_json(signed_up).await["status"], "OK");

    let emailpassword = soglia.emailpassword().unwrap();
    let by_email = emailpassword
        .get_user_by_email("a@b.co")
        .await
        .unwrap()
        .expect("user exists");
    let by_id = emailpassword
        .get_user_by_id(&by_email.id)
        .await
        .unwrap()
        .expect("user exists");
    assert_eq!(by_email, by_id);

    assert!(emailpassword.get_user_by_id("no-such-id").await.unwrap().is_none());
}

struct PingRecipe;

impl RecipeModule for PingRecipe {
    fn recipe_id(&self) -> &'static str {
        "ping"
    }

    fn apis_handled(&self) -> Vec<ApiHandled> {
        vec![ApiHandled {
            method: HttpMethod::Get,
            path_without_api_base_path: NormalisedURLPath::new("/ping").unwrap(),
            id: "PING",
            disabled: false,
        }]
    }

    fn handle_api_request<'a>(
        &'a self,
        _api_id: &'a str,
        _request: &'a ApiRequest,
        sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>> {
        Box::pin(async move {
            sink.send_json(StatusCode::OK, json!({"status": "OK", "pong": true}));
            Ok(())
        })
    }

    fn handle_error<'a>(
        &'a self,
        error: RecipeError,
        _request: &'a ApiRequest,
        _sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>> {
        Box::pin(async move { Err(error) })
    }

    fn all_cors_headers(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

#[tokio::test]
async fn custom_recipes_are_dispatched() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .register(Arc::new(PingRecipe))
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["pong"], true);
}

#[tokio::test]
async fn wrong_method_on_a_recipe_route_passes_through() {
    let core = MockCore::start().await;
    let soglia = Soglia::builder()
        .with_app_info(app_info())
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(EmailPasswordConfig::new())
        .build()
        .unwrap();
    let app = Router::new().layer(soglia.layer());

    // GET on the POST-only signup route is not recipe-owned.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/signup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
