#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use ireporter::repo::inmem::InMemRepo;
use ireporter::routes::{config, AppState, DeletePolicy};
use ireporter::security::SecurityHeaders;
use ireporter::storage::FsMediaStore;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("BCRYPT_COST", "4");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("IR_DATA_DIR", tmp.path().to_str().unwrap());
}

fn state() -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        media_store: Arc::new(FsMediaStore::new()),
        rate_limiter: None,
        delete_policy: DeletePolicy::DraftOnly,
    }
}

macro_rules! sign_up_resp {
    ($app:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/signup")
            .set_json(&json!({"email": "h@example.com", "password": "password123", "name": "H"}))
            .to_request();
        test::call_service(&$app, req).await
    }};
}

#[actix_web::test]
#[serial]
async fn test_security_headers_present() {
    setup_env();
    std::env::remove_var("ENABLE_HSTS");
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;
    let resp = sign_up_resp!(app);
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
#[serial]
async fn test_hsts_enabled_via_builder() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env().with_hsts(true))
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;
    let resp = sign_up_resp!(app);
    assert!(resp.status().is_success());
    assert!(resp.headers().get("strict-transport-security").is_some(), "HSTS header missing");
}

#[actix_web::test]
#[serial]
async fn test_env_var_enables_hsts() {
    setup_env();
    std::env::set_var("ENABLE_HSTS", "1");
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;
    let resp = sign_up_resp!(app);
    assert!(resp.status().is_success());
    assert!(resp.headers().get("strict-transport-security").is_some());
    std::env::remove_var("ENABLE_HSTS");
}

#[actix_web::test]
#[serial]
async fn test_headers_applied_to_error_responses_too() {
    setup_env();
    std::env::remove_var("ENABLE_HSTS");
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;
    // unauthenticated request → 401, but the headers are still stamped
    let req = test::TestRequest::get().uri("/api/v1/incidents").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().get("content-security-policy").is_some());
}
