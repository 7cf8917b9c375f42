//! Integration tests for the kernsync HTTP trigger.
//!
//! Uses axum-test to drive the router without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use async_trait::async_trait;
use axum::http::HeaderValue;
use axum_test::TestServer;
use kernsync::api::{AppState, ErrorResponse, HealthResponse, create_router};
use kernsync::host::{LocalKernelManager, MemorySessionStore};
use kernsync::sync::{Collaborators, PassReport, SyncOptions, SyncPass, Synchronizer};
use kernsync_core::{KernelRecord, KernelTable, KernsyncError, ManagedKernel};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mutex to serialize tests since they modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Pass that counts its runs and can be told to fail.
#[derive(Default)]
struct StubPass {
    runs: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl SyncPass for StubPass {
    async fn sync_managers(&self) -> Result<PassReport, KernsyncError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KernsyncError::Transport("gateway unreachable".to_string()));
        }
        Ok(PassReport::default())
    }
}

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("KERNSYNC_API_KEY") };
    }
}

/// Create a test server around `pass`, with authentication disabled.
/// Returns a guard that must be kept alive during the test.
fn create_test_server(pass: Arc<dyn SyncPass>) -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("KERNSYNC_API_KEY") };
    let router = create_router(AppState::new(pass));
    (
        TestServer::new(router).unwrap(),
        TestGuard { _guard: guard },
    )
}

/// Create a test server with authentication enabled.
/// Must be called while holding AUTH_TEST_MUTEX.
fn create_auth_test_server(api_key: &str, pass: Arc<dyn SyncPass>) -> TestServer {
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::set_var("KERNSYNC_API_KEY", api_key) };
    let router = create_router(AppState::new(pass));
    TestServer::new(router).unwrap()
}

/// Clean up auth env var after test.
fn cleanup_auth_env() {
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("KERNSYNC_API_KEY") };
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server(Arc::new(StubPass::default()));

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// SYNC ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_sync_returns_no_content() {
    let pass = Arc::new(StubPass::default());
    let (server, _guard) = create_test_server(pass.clone());

    let response = server.post("/api/sync").await;

    assert_eq!(response.status_code().as_u16(), 204);
    assert!(response.text().is_empty());
    assert_eq!(pass.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sync_runs_one_pass_per_request() {
    let pass = Arc::new(StubPass::default());
    let (server, _guard) = create_test_server(pass.clone());

    for _ in 0..3 {
        assert_eq!(server.post("/api/sync").await.status_code().as_u16(), 204);
    }
    assert_eq!(pass.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_sync_returns_error_body() {
    let pass = Arc::new(StubPass {
        runs: AtomicUsize::new(0),
        fail: true,
    });
    let (server, _guard) = create_test_server(pass);

    let response = server.post("/api/sync").await;

    assert_eq!(response.status_code().as_u16(), 500);
    let body: ErrorResponse = response.json();
    assert!(body.error.contains("gateway unreachable"));

    // The server keeps answering after a failed pass.
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_sync_requires_post() {
    let (server, _guard) = create_test_server(Arc::new(StubPass::default()));

    let response = server.get("/api/sync").await;

    assert_eq!(response.status_code().as_u16(), 405);
}

#[tokio::test]
async fn test_sync_drives_the_engine() {
    let kernels = Arc::new(LocalKernelManager::new());
    kernels
        .adopt(ManagedKernel::new("k1"), true)
        .await
        .unwrap();
    let collaborators = Collaborators {
        kernels: kernels.clone(),
        sessions: Arc::new(MemorySessionStore::new()),
        remote: None,
    };
    let engine = Synchronizer::<KernelRecord, _>::new(
        KernelTable::in_memory(),
        collaborators,
        SyncOptions::default(),
    );
    let (server, _guard) = create_test_server(Arc::new(tokio::sync::Mutex::new(engine)));

    let response = server.post("/api/sync").await;

    assert_eq!(response.status_code().as_u16(), 204);
    // k1 had no session, so the pass shut it down.
    assert!(kernels.is_empty().await);
}

// =============================================================================
// AUTHENTICATION TESTS
// =============================================================================

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let api_key = "test-secret-key-12345";
    let server = create_auth_test_server(api_key, Arc::new(StubPass::default()));

    let response = server
        .post("/api/sync")
        .add_header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .await;

    cleanup_auth_env();

    assert_eq!(response.status_code().as_u16(), 204);
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let api_key = "test-raw-key-67890";
    let server = create_auth_test_server(api_key, Arc::new(StubPass::default()));

    let response = server
        .post("/api/sync")
        .add_header(
            axum::http::header::AUTHORIZATION,
            api_key.parse::<HeaderValue>().unwrap(),
        )
        .await;

    cleanup_auth_env();

    assert_eq!(response.status_code().as_u16(), 204);
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let pass = Arc::new(StubPass::default());
    let server = create_auth_test_server("correct-key", pass.clone());

    let response = server
        .post("/api/sync")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;

    cleanup_auth_env();

    assert_eq!(
        response.status_code().as_u16(),
        401,
        "Invalid token should return 401 Unauthorized"
    );
    assert_eq!(pass.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("required-key", Arc::new(StubPass::default()));

    let response = server.post("/api/sync").await;

    cleanup_auth_env();

    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_health_always_open() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("required-key", Arc::new(StubPass::default()));

    let response = server.get("/health").await;

    cleanup_auth_env();

    response.assert_status_ok();
}
