#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use ireporter::auth::{create_jwt, Role};
use ireporter::repo::inmem::InMemRepo;
use ireporter::routes::{config, AppState, DeletePolicy};
use ireporter::storage::{FsMediaStore, MediaStore, MediaStoreError};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ---------------- In-memory mock MediaStore (tests only) ----------------
#[derive(Default)]
struct MockMediaStore {
    inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait::async_trait]
impl MediaStore for MockMediaStore {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(hash) {
            return Err(MediaStoreError::Duplicate);
        }
        map.insert(hash.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let map = self.inner.lock().unwrap();
        map.get(hash).cloned().ok_or(MediaStoreError::NotFound)
    }
    async fn delete(&self, hash: &str) -> Result<(), MediaStoreError> {
        let mut map = self.inner.lock().unwrap();
        map.remove(hash);
        Ok(())
    }
}

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("IR_DATA_DIR", tmp.path().to_str().unwrap());
}

fn user_token() -> String {
    create_jwt(&uuid::Uuid::new_v4().to_string(), "u@example.com", Role::User).unwrap()
}

fn state(store: Arc<dyn MediaStore>) -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        media_store: store,
        rate_limiter: None,
        delete_policy: DeletePolicy::DraftOnly,
    }
}

// Helper to build a multipart body with provided bytes and filename
fn build_multipart(file_name: &str, bytes: &[u8], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let disp = format!("--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n", boundary, file_name);
    body.extend_from_slice(disp.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

// Minimal 1x1 PNG (transparent)
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[actix_web::test]
#[serial]
async fn upload_is_idempotent_and_served_back() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(Arc::new(MockMediaStore::default()))))
            .configure(config),
    )
    .await;
    let token = user_token();

    let (ct, body) = build_multipart("a.png", &sample_png(), "BOUNDARYHASH");
    let req = test::TestRequest::post()
        .uri("/api/v1/media")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .insert_header(("Content-Type", ct.clone()))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let uploaded: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let hash = uploaded["hash"].as_str().unwrap().to_string();
    assert_eq!(uploaded["type"], "image");
    assert_eq!(uploaded["duplicate"], false);
    assert_eq!(uploaded["url"], format!("/media/{hash}"));

    // same bytes again → 200 + duplicate flag
    let req = test::TestRequest::post()
        .uri("/api/v1/media")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let dup: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(dup["duplicate"], true);
    assert_eq!(dup["hash"].as_str().unwrap(), hash);

    // public fetch with sniffed content type
    let req = test::TestRequest::get().uri(&format!("/media/{hash}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert_eq!(ct, "image/png");
}

#[actix_web::test]
#[serial]
async fn upload_rejects_unknown_bytes_and_requires_auth() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(Arc::new(MockMediaStore::default()))))
            .configure(config),
    )
    .await;
    let token = user_token();

    // plain text is not an allowed evidence type
    let (ct, body) = build_multipart("notes.txt", b"just some text", "BOUNDARYTXT");
    let req = test::TestRequest::post()
        .uri("/api/v1/media")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 415);

    // no bearer token → 401
    let (ct, body) = build_multipart("a.png", &sample_png(), "BOUNDARYANON");
    let req = test::TestRequest::post()
        .uri("/api/v1/media")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // non-hex hash can never name a blob
    let req = test::TestRequest::get().uri("/media/zz").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn fs_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsMediaStore::with_root(dir.path().to_path_buf());
    let png = sample_png();

    store.save("abcd1234", "image/png", &png).await.unwrap();
    // duplicate save reports as such
    assert!(matches!(
        store.save("abcd1234", "image/png", &png).await.unwrap_err(),
        MediaStoreError::Duplicate
    ));

    let (bytes, mime) = store.load("abcd1234").await.unwrap();
    assert_eq!(bytes, png);
    assert_eq!(mime, "image/png");

    store.delete("abcd1234").await.unwrap();
    assert!(matches!(store.load("abcd1234").await.unwrap_err(), MediaStoreError::NotFound));
    // deleting a missing blob is not an error
    store.delete("abcd1234").await.unwrap();
}
