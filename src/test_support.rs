use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, redis::RedisHandle, security, state::AppState};
use crate::db::models::{TeachingAssignment, UserProfile};
use crate::db::types::UserRole;
use crate::identity::memory::MemoryIdentityStore;
use crate::services::accounts::{self, Registration};
use crate::services::schedule_analysis::{ScheduleAnalysis, ScheduleAnalyzer};
use crate::store::memory::MemoryDocumentStore;

const TEST_SECRET_KEY: &str = "test-secret";
pub(crate) const TEST_ADMIN_SECRET: &str = "test-admin-secret";
pub(crate) const TEST_PASSWORD: &str = "password123";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<MemoryDocumentStore>,
    pub(crate) identity: Arc<MemoryIdentityStore>,
    pub(crate) analyzer: Arc<StubAnalyzer>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("ACCOUNTABLE_ENV", "test");
    std::env::set_var("ACCOUNTABLE_STRICT_CONFIG", "0");
    std::env::set_var("STORE_BACKEND", "memory");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("ADMIN_PURGE_SECRET", TEST_ADMIN_SECRET);
    std::env::set_var("FIRST_ADMIN_EMAIL", "admin@accountable.test");
    std::env::set_var("FIRST_ADMIN_PASSWORD", "first-admin-password");
    std::env::set_var("REDIS_HOST", "127.0.0.1");
    std::env::remove_var("REDIS_PASSWORD");
    std::env::remove_var("SCHOOL_UTC_OFFSET");
    std::env::remove_var("ALLOWED_IMAGE_TYPES");
    std::env::remove_var("MAX_UPLOAD_SIZE_MB");
    std::env::remove_var("OPENAI_API_KEY");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// Analyzer that replays a canned result and remembers the mime types it was given.
pub(crate) struct StubAnalyzer {
    result: std::sync::Mutex<ScheduleAnalysis>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl StubAnalyzer {
    pub(crate) fn new(result: ScheduleAnalysis) -> Self {
        Self { result: std::sync::Mutex::new(result), calls: std::sync::Mutex::new(Vec::new()) }
    }

    pub(crate) fn respond_with(&self, result: ScheduleAnalysis) {
        *self.result.lock().unwrap() = result;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleAnalyzer for StubAnalyzer {
    async fn analyze(&self, _image_base64: &str, mime_type: &str) -> ScheduleAnalysis {
        self.calls.lock().unwrap().push(mime_type.to_string());
        self.result.lock().unwrap().clone()
    }
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let store = Arc::new(MemoryDocumentStore::new());
    let identity = Arc::new(MemoryIdentityStore::new());
    let analyzer = Arc::new(StubAnalyzer::new(ScheduleAnalysis::default()));

    // Never connected: rate limits let everything through.
    let redis = RedisHandle::new(settings.redis().redis_url());

    let state =
        AppState::new(settings, store.clone(), identity.clone(), redis, analyzer.clone());
    let app = api::router::router(state.clone());

    TestContext { state, app, store, identity, analyzer, _guard: guard }
}

pub(crate) fn student_registration(email: &str, class: &str) -> Registration {
    Registration {
        name: format!("Student {email}"),
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        role: UserRole::Student,
        school: "schoolA".to_string(),
        grade: Some("11".to_string()),
        class: Some(class.to_string()),
        assignments: Vec::new(),
    }
}

pub(crate) async fn insert_student(state: &AppState, email: &str) -> UserProfile {
    let registration = student_registration(email, "c");
    accounts::register(state.store().as_ref(), state.identity().as_ref(), registration)
        .await
        .expect("insert student")
}

pub(crate) async fn insert_teacher(state: &AppState, email: &str, class: &str) -> UserProfile {
    let registration = Registration {
        name: format!("Teacher {email}"),
        role: UserRole::Teacher,
        grade: None,
        class: None,
        assignments: vec![TeachingAssignment {
            school: "schoolA".to_string(),
            grade: "11".to_string(),
            class: class.to_string(),
            subject: "Physics".to_string(),
        }],
        ..student_registration(email, class)
    };
    accounts::register(state.store().as_ref(), state.identity().as_ref(), registration)
        .await
        .expect("insert teacher")
}

pub(crate) async fn insert_admin(state: &AppState, email: &str) -> UserProfile {
    accounts::register_admin(
        state.store().as_ref(),
        state.identity().as_ref(),
        state.settings().admin(),
        TEST_ADMIN_SECRET,
        format!("Admin {email}"),
        email.to_string(),
        TEST_PASSWORD.to_string(),
    )
    .await
    .expect("insert admin")
}

pub(crate) fn bearer_token(user_id: &str, settings: &Settings) -> String {
    security::create_access_token(user_id, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
