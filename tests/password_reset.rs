//! Password reset flow: token generation, email delivery, and the reset
//! itself, including the no-account-enumeration guarantee.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{body_json, MockCore};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use soglia::emailpassword::types::{EmailPasswordConfig, ResetEmailSender, User};
use soglia::querier::CoreConnection;
use soglia::recipe::BoxFut;
use soglia::{AppInfo, Soglia};

/// Captures the reset link instead of sending mail.
#[derive(Clone, Default)]
struct CapturingSender {
    link: Arc<Mutex<Option<String>>>,
}

impl ResetEmailSender for CapturingSender {
    fn send_password_reset_email<'a>(
        &'a self,
        _user: &'a User,
        link: &'a str,
    ) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async move {
            *self.link.lock().unwrap() = Some(link.to_string());
            Ok(())
        })
    }
}

async fn test_app(core: &MockCore) -> (CapturingSender, Router) {
    let sender = CapturingSender::default();
    let app_info =
        AppInfo::new("Demo", "https://api.example.com", "https://www.example.com").unwrap();
    let soglia = Soglia::builder()
        .with_app_info(app_info)
        .with_core(CoreConnection::new(&core.uri()))
        .with_emailpassword(
            EmailPasswordConfig::new().with_email_sender(Arc::new(sender.clone())),
        )
        .build()
        .unwrap();
    (sender, Router::new().layer(soglia.layer()))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_fields(fields: &[(&str, &str)]) -> serde_json::Value {
    json!({
        "formFields": fields
            .iter()
            .map(|(id, value)| json!({ "id": id, "value": value }))
            .collect::<Vec<_>>()
    })
}

fn token_from_link(link: &str) -> String {
    let start = link.find("token=").unwrap() + "token=".len();
    let rest = &link[start..];
    rest.split('&').next().unwrap().to_string()
}

#[tokio::test]
async fn reset_flow_changes_the_password() {
    let core = MockCore::start().await;
    let (sender, app) = test_app(&core).await;

    let signed_up = app
        .clone()
        .oneshot(post_json(
            "/auth/signup",
            form_fields(&[("email", "a@b.co"), ("password", "abc12345")]),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(signed_up).await["status"], "OK");

    let requested = app
        .clone()
        .oneshot(post_json(
            "/auth/user/password/reset/token",
            form_fields(&[("email", "a@b.co")]),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(requested).await["status"], "OK");

    let link = sender.link.lock().unwrap().clone().unwrap();
    assert!(link.starts_with("https://www.example.com/auth/reset-password?token="));
    assert!(link.ends_with("&rid=emailpassword"));
    let token = token_from_link(&link);

    let mut reset_body = form_fields(&[("password", "newpass99")]);
    reset_body["token"] = json!(token);
    let reset = app
        .clone()
        .oneshot(post_json("/auth/user/password/reset", reset_body))
        .await
        .unwrap();
    assert_eq!(body_json(reset).await["status"], "OK");

    let new_login = app
        .clone()
        .oneshot(post_json(
            "/auth/signin",
            form_fields(&[("email", "a@b.co"), ("password", "newpass99")]),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(new_login).await["status"], "OK");

    let old_login = app
        .oneshot(post_json(
            "/auth/signin",
            form_fields(&[("email", "a@b.co"), ("password", "abc12345")]),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(old_login).await["status"], "WRONG_CREDENTIALS_ERROR");
}

#[tokio::test]
async fn unknown_email_gets_ok_and_no_mail() {
    let core = MockCore::start().await;
    let (sender, app) = test_app(&core).await;

    let response = app
        .oneshot(post_json(
            "/auth/user/password/reset/token",
            form_fields(&[("email", "nobody@b.co")]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "OK");
    assert!(sender.link.lock().unwrap().is_none());
}

#[tokio::test]
async fn invalid_reset_token_is_reported_in_band() {
    let core = MockCore::start().await;
    let (_, app) = test_app(&core).await;

    let mut body = form_fields(&[("password", "newpass99")]);
    body["token"] = json!("bogus");
    let response = app
        .oneshot(post_json("/auth/user/password/reset", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["status"],
        "RESET_PASSWORD_INVALID_TOKEN_ERROR"
    );
}

#[tokio::test]
async fn missing_token_is_bad_input() {
    let core = MockCore::start().await;
    let (_, app) = test_app(&core).await;

    let response = app
        .oneshot(post_json(
            "/auth/user/password/reset",
            form_fields(&[("password", "newpass99")]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Please provide the password reset token");
}

#[tokio::test]
async fn invalid_email_is_a_field_error() {
    let core = MockCore::start().await;
    let (_, app) = test_app(&core).await;

    let response = app
        .oneshot(post_json(
            "/auth/user/password/reset/token",
            form_fields(&[("email", "not-an-email")]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "FIELD_ERROR");
    assert_eq!(body["formFields"][0]["id"], "email");
    assert_eq!(body["formFields"][0]["error"], "Email is invalid");
}

#[tokio::test]
async fn weak_new_password_is_a_field_error() {
    let core = MockCore::start().await;
    let (_, app) = test_app(&core).await;

    let mut body = form_fields(&[("password", "short")]);
    body["token"] = json!("anything");
    let response = app
        .oneshot(post_json("/auth/user/password/reset", body))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["status"], "FIELD_ERROR");
    assert_eq!(body["formFields"][0]["id"], "password");
}
