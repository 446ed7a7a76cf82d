//! Shared test harness: an in-memory stand-in for the token-issuing core.
//!
//! The mock keeps sessions, users, and reset tokens in a mutex-guarded map
//! and signs access tokens with a keypair generated per test, so token
//! verification in the crate under test exercises the real signature path.

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use http_body_util::BodyExt;
use pasetors::keys::{AsymmetricKeyPair, Generate};
use pasetors::version4::{PublicToken, V4};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const HOUR_MILLIS: i64 = 60 * 60 * 1000;

struct SessionRec {
    user_id: String,
    current_refresh: String,
    superseded_refresh: HashSet<String>,
    anti_csrf: Option<String>,
    revoked: bool,
}

struct UserRec {
    id: String,
    password: String,
}

#[derive(Default)]
struct CoreState {
    sessions: HashMap<String, SessionRec>,
    users: HashMap<String, UserRec>,
    reset_tokens: HashMap<String, String>,
}

struct Shared {
    state: Mutex<CoreState>,
    keys: AsymmetricKeyPair<V4>,
}

/// A running mock core bound to an ephemeral port.
pub struct MockCore {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockCore {
    pub async fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let shared = Arc::new(Shared {
            state: Mutex::new(CoreState::default()),
            keys: AsymmetricKeyPair::<V4>::generate().unwrap(),
        });

        let router = Router::new()
            .route("/recipe/handshake", post(handshake))
            .route("/recipe/session", post(create_session))
            .route("/recipe/session/refresh", post(refresh_session))
            .route("/recipe/session/remove", post(remove_sessions))
            .route("/recipe/signup", post(sign_up))
            .route("/recipe/signin", post(sign_in))
            .route("/recipe/user", get(get_user))
            .route("/recipe/user/password/reset/token", post(reset_token))
            .route("/recipe/user/password/reset", post(reset_password))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, shared }
    }

    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Sign an access token directly, bypassing session bookkeeping. Lets
    /// tests fabricate expired or anti-CSRF-bearing tokens.
    pub fn signed_access_token(
        &self,
        user_id: &str,
        expiry_millis: i64,
        anti_csrf: Option<&str>,
    ) -> String {
        let claims = json!({
            "sessionHandle": Uuid::new_v4().to_string(),
            "userId": user_id,
            "userDataInJWT": {},
            "antiCsrfToken": anti_csrf,
            "expiryTime": expiry_millis,
            "timeCreated": Utc::now().timestamp_millis(),
        });
        PublicToken::sign(
            &self.shared.keys.secret,
            claims.to_string().as_bytes(),
            None,
            None,
        )
        .unwrap()
    }

    /// Number of sessions that are still live for a user.
    pub fn live_sessions_for(&self, user_id: &str) -> usize {
        let state = self.shared.state.lock().unwrap();
        state
            .sessions
            .values()
            .filter(|s| !s.revoked && s.user_id == user_id)
            .count()
    }
}

fn token_set_payload(
    keys: &AsymmetricKeyPair<V4>,
    handle: &str,
    user_id: &str,
    refresh: &str,
    anti_csrf: Option<&str>,
) -> Value {
    let now = Utc::now().timestamp_millis();
    let expiry = now + HOUR_MILLIS;

    let claims = json!({
        "sessionHandle": handle,
        "userId": user_id,
        "userDataInJWT": {},
        "antiCsrfToken": anti_csrf,
        "expiryTime": expiry,
        "timeCreated": now,
    });
    let access_token =
        PublicToken::sign(&keys.secret, claims.to_string().as_bytes(), None, None).unwrap();

    let mut payload = json!({
        "status": "OK",
        "session": { "handle": handle, "userId": user_id, "userDataInJWT": {} },
        "accessToken": { "token": access_token, "expiry": expiry },
        "refreshToken": { "token": refresh, "expiry": expiry },
        "idRefreshToken": { "token": Uuid::new_v4().to_string(), "expiry": expiry },
    });
    if let Some(anti_csrf) = anti_csrf {
        payload["antiCsrfToken"] = json!(anti_csrf);
    }
    payload
}

fn new_session_payload(shared: &Shared, user_id: &str, enable_anti_csrf: bool) -> Value {
    let mut state = shared.state.lock().unwrap();
    let handle = Uuid::new_v4().to_string();
    let refresh = Uuid::new_v4().to_string();
    let anti_csrf = enable_anti_csrf.then(|| Uuid::new_v4().to_string());

    let payload = token_set_payload(
        &shared.keys,
        &handle,
        user_id,
        &refresh,
        anti_csrf.as_deref(),
    );
    state.sessions.insert(
        handle,
        SessionRec {
            user_id: user_id.to_string(),
            current_refresh: refresh,
            superseded_refresh: HashSet::new(),
            anti_csrf,
            revoked: false,
        },
    );
    payload
}

async fn handshake(State(shared): State<Arc<Shared>>) -> Json<Value> {
    let key = Base64::encode_string(shared.keys.public.as_bytes());
    Json(json!({ "status": "OK", "accessTokenSigningPublicKey": key }))
}

async fn create_session(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Json<Value> {
    let user_id = body["userId"].as_str().unwrap_or_default().to_string();
    let enable_anti_csrf = body["enableAntiCsrf"].as_bool().unwrap_or(false);
    Json(new_session_payload(&shared, &user_id, enable_anti_csrf))
}

async fn refresh_session(
    State(shared): State<Arc<Shared>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let presented = body["refreshToken"].as_str().unwrap_or_default().to_string();
    let enable_anti_csrf = body["enableAntiCsrf"].as_bool().unwrap_or(false);

    let mut state = shared.state.lock().unwrap();
    for (handle, session) in &mut state.sessions {
        if session.revoked {
            continue;
        }
        if session.current_refresh == presented {
            // Rotate in place: the old token becomes a theft tripwire.
            let next = Uuid::new_v4().to_string();
            session.superseded_refresh.insert(presented.clone());
            session.current_refresh = next.clone();
            session.anti_csrf = enable_anti_csrf.then(|| Uuid::new_v4().to_string());
            let payload = token_set_payload(
                &shared.keys,
                handle,
                &session.user_id,
                &next,
                session.anti_csrf.as_deref(),
            );
            return Json(payload);
        }
        if session.superseded_refresh.contains(&presented) {
            return Json(json!({
                "status": "TOKEN_THEFT_DETECTED",
                "session": { "handle": handle, "userId": session.user_id },
            }));
        }
    }
    Json(json!({ "status": "UNAUTHORISED" }))
}

async fn remove_sessions(
    State(shared): State<Arc<Shared>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut state = shared.state.lock().unwrap();
    if let Some(handles) = body["sessionHandles"].as_array() {
        for handle in handles.iter().filter_map(Value::as_str) {
            if let Some(session) = state.sessions.get_mut(handle) {
                session.revoked = true;
            }
        }
    }
    if let Some(user_id) = body["userId"].as_str() {
        for session in state.sessions.values_mut() {
            if session.user_id == user_id {
                session.revoked = true;
            }
        }
    }
    Json(json!({ "status": "OK" }))
}

async fn sign_up(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Json<Value> {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    let mut state = shared.state.lock().unwrap();
    if state.users.contains_key(&email) {
        return Json(json!({ "status": "EMAIL_ALREADY_EXISTS_ERROR" }));
    }
    let id = Uuid::new_v4().to_string();
    state.users.insert(email.clone(), UserRec { id: id.clone(), password });
    Json(json!({ "status": "OK", "user": { "id": id, "email": email } }))
}

async fn sign_in(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Json<Value> {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let state = shared.state.lock().unwrap();
    match state.users.get(email) {
        Some(user) if user.password == password => Json(json!({
            "status": "OK",
            "user": { "id": user.id, "email": email },
        })),
        _ => Json(json!({ "status": "WRONG_CREDENTIALS_ERROR" })),
    }
}

async fn get_user(
    State(shared): State<Arc<Shared>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let state = shared.state.lock().unwrap();
    if let Some(email) = params.get("email") {
        return match state.users.get(email) {
            Some(user) => Json(json!({
                "status": "OK",
                "user": { "id": user.id, "email": email },
            })),
            None => Json(json!({ "status": "UNKNOWN_EMAIL_ERROR" })),
        };
    }
    if let Some(user_id) = params.get("userId") {
        for (email, user) in &state.users {
            if &user.id == user_id {
                return Json(json!({
                    "status": "OK",
                    "user": { "id": user.id, "email": email },
                }));
            }
        }
        return Json(json!({ "status": "UNKNOWN_USER_ID_ERROR" }));
    }
    Json(json!({ "status": "UNKNOWN_USER_ID_ERROR" }))
}

async fn reset_token(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Json<Value> {
    let user_id = body["userId"].as_str().unwrap_or_default().to_string();
    let mut state = shared.state.lock().unwrap();
    let known = state.users.values().any(|user| user.id == user_id);
    if !known {
        return Json(json!({ "status": "UNKNOWN_USER_ID_ERROR" }));
    }
    let token = Uuid::new_v4().to_string();
    state.reset_tokens.insert(token.clone(), user_id);
    Json(json!({ "status": "OK", "token": token }))
}

async fn reset_password(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Json<Value> {
    let token = body["token"].as_str().unwrap_or_default();
    let new_password = body["newPassword"].as_str().unwrap_or_default().to_string();
    let mut state = shared.state.lock().unwrap();
    let Some(user_id) = state.reset_tokens.remove(token) else {
        return Json(json!({ "status": "RESET_PASSWORD_INVALID_TOKEN_ERROR" }));
    };
    for user in state.users.values_mut() {
        if user.id == user_id {
            user.password = new_password.clone();
        }
    }
    Json(json!({ "status": "OK" }))
}

/// Parse every `Set-Cookie` header into `name -> value`. Cleared cookies
/// (empty value) are kept so callers can assert on removal.
pub fn response_cookies(response: &axum::response::Response) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in response.headers().get_all(axum::http::header::SET_COOKIE) {
        let raw = header.to_str().unwrap();
        let pair = raw.split(';').next().unwrap();
        let mut parts = pair.splitn(2, '=');
        let name = parts.next().unwrap().trim().to_string();
        let value = parts.next().unwrap_or_default().trim().to_string();
        cookies.insert(name, value);
    }
    cookies
}

/// Build a `Cookie` request header from name/value pairs.
pub fn cookie_header(cookies: &[(&str, &str)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collect a response body into JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
