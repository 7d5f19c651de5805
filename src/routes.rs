use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use sha2::{Sha256, Digest};
use uuid::Uuid;

use crate::auth::{create_jwt, Auth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{IncidentRepo as _, Repo, UserRepo as _};
use crate::storage::{MediaStore, MediaStoreError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/signup").route(web::post().to(sign_up)))
            .service(web::resource("/auth/signin").route(web::post().to(sign_in)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token)))
            .service(
                web::resource("/incidents")
                    .route(web::get().to(list_incidents))
                    .route(web::post().to(create_incident)),
            )
            .service(
                web::resource("/incidents/user/{user_id}")
                    .route(web::get().to(list_user_incidents)),
            )
            .service(
                web::resource("/incidents/{id}")
                    .route(web::get().to(get_incident))
                    .route(web::put().to(update_incident))
                    .route(web::delete().to(delete_incident)),
            )
            .service(
                web::resource("/incidents/{id}/media")
                    .route(web::post().to(append_incident_media)),
            )
            .service(web::resource("/users").route(web::get().to(list_users)))
            .service(
                web::resource("/users/profile")
                    .route(web::get().to(get_profile))
                    .route(web::put().to(update_profile)),
            )
            .service(web::resource("/media").route(web::post().to(upload_media))),
    );
    // Public fetch route (no /api/v1 prefix so <img src="/media/{hash}"> works)
    cfg.route("/media/{hash}", web::get().to(get_media));
}

/// Non-admin deletion scope: `draft-only` (default) restricts owners to
/// incidents still in draft; `owner-any` is the legacy looser rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePolicy {
    DraftOnly,
    OwnerAny,
}

impl DeletePolicy {
    pub fn from_env() -> Self {
        match std::env::var("DELETE_POLICY").as_deref() {
            Ok("owner-any") => DeletePolicy::OwnerAny,
            _ => DeletePolicy::DraftOnly,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media_store: Arc<dyn MediaStore>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub delete_policy: DeletePolicy,
}

macro_rules! ensure_admin { ($auth:expr) => { if !$auth.0.is_admin() { return Err(ApiError::Forbidden); } }; }

fn caller_id(auth: &Auth) -> Result<Uuid, ApiError> {
    auth.0.user_id().ok_or(ApiError::Unauthorized)
}

// ---------------- validation (always before any store write) -------------

fn validate_new_incident(new: &NewIncident) -> Result<(), ApiError> {
    if new.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if new.description.trim().is_empty() {
        return Err(ApiError::Validation("description is required".into()));
    }
    if !new.location.in_bounds() {
        return Err(ApiError::Validation(
            "location out of range: lat must be in [-90,90], lng in [-180,180]".into(),
        ));
    }
    Ok(())
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    // Deliberately loose; the unique index is the real gate.
    let well_formed = email.len() >= 3
        && email.contains('@')
        && !email.starts_with('@')
        && !email.ends_with('@');
    if !well_formed {
        return Err(ApiError::Validation("a valid email is required".into()));
    }
    Ok(email)
}

fn bcrypt_cost() -> u32 {
    std::env::var("BCRYPT_COST")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(bcrypt::DEFAULT_COST)
}

// ---------------- auth ----------------------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<Role>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid email/password/name"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn sign_up(
    data: web::Data<AppState>,
    payload: web::Json<SignUpRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let email = normalize_email(&req.email)?;
    if req.password.len() < 8 {
        return Err(ApiError::Validation("password must be at least 8 characters".into()));
    }
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    let password_hash = bcrypt::hash(&req.password, bcrypt_cost()).map_err(|e| {
        log::error!("bcrypt hash failure: {e}");
        ApiError::Internal
    })?;
    let user = data
        .repo
        .create_user(NewUser {
            email,
            name: name.to_string(),
            password_hash,
            role: req.role.unwrap_or(Role::User),
        })
        .await?;
    let token = create_jwt(&user.id.to_string(), &user.email, user.role).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Created().json(AuthResponse { user, token }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn sign_in(
    data: web::Data<AppState>,
    payload: web::Json<SignInRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let email = req.email.trim().to_lowercase();
    match data.repo.find_user_by_email(&email).await? {
        Some((user, hash)) if bcrypt::verify(&req.password, &hash).unwrap_or(false) => {
            let token =
                create_jwt(&user.id.to_string(), &user.email, user.role).map_err(|_| ApiError::Internal)?;
            Ok(HttpResponse::Ok().json(AuthResponse { user, token }))
        }
        // Unknown email and bad password are indistinguishable to the client.
        _ => Err(ApiError::Unauthorized),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let id = caller_id(&auth)?;
    let user = data.repo.get_user(id).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn refresh_token(auth: Auth) -> Result<HttpResponse, ApiError> {
    let token = create_jwt(&auth.0.sub, &auth.0.email, auth.0.role).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "token": token })))
}

// ---------------- incidents ----------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/incidents",
    request_body = NewIncident,
    responses(
        (status = 201, description = "Incident created", body = Incident),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Too many reports")
    )
)]
pub async fn create_incident(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewIncident>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&auth)?;
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_report(&auth.0.sub) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let new = payload.into_inner();
    validate_new_incident(&new)?;
    let incident = data.repo.create_incident(caller, new).await?;
    Ok(HttpResponse::Created().json(incident))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents",
    responses(
        (status = 200, description = "All incidents, newest first", body = [Incident]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_incidents(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let incidents = data.repo.list_incidents().await?;
    Ok(HttpResponse::Ok().json(incidents))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents/{id}",
    params(("id" = Uuid, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident", body = Incident),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn get_incident(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let incident = data.repo.get_incident(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(incident))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents/user/{user_id}",
    params(("user_id" = Uuid, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "User's incidents, newest first", body = [Incident]),
        (status = 403, description = "Not the caller's incidents")
    )
)]
pub async fn list_user_incidents(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let caller = caller_id(&auth)?;
    if !auth.0.is_admin() && caller != user_id {
        return Err(ApiError::Forbidden);
    }
    let incidents = data.repo.list_incidents_for_user(user_id).await?;
    Ok(HttpResponse::Ok().json(incidents))
}

#[utoipa::path(
    put,
    path = "/api/v1/incidents/{id}",
    request_body = UpdateIncident,
    params(("id" = Uuid, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident updated", body = Incident),
        (status = 400, description = "No fields to update"),
        (status = 403, description = "Not owner or admin"),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn update_incident(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateIncident>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&auth)?;
    let upd = payload.into_inner();
    // An empty update is a client error, distinct from Forbidden/NotFound.
    if upd.is_empty() {
        return Err(ApiError::Validation("no fields to update".into()));
    }
    let incident = data.repo.get_incident(path.into_inner()).await?;
    if !auth.0.is_admin() && incident.user_id != caller {
        return Err(ApiError::Forbidden);
    }
    // adminComment is an admin-only field.
    if upd.admin_comment.is_some() && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let updated = data.repo.update_incident(incident.id, upd).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/incidents/{id}",
    params(("id" = Uuid, Path, description = "Incident id")),
    responses(
        (status = 204, description = "Incident and its media deleted"),
        (status = 403, description = "Not permitted by the delete policy"),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn delete_incident(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&auth)?;
    let incident = data.repo.get_incident(path.into_inner()).await?;
    if !auth.0.is_admin() {
        if incident.user_id != caller {
            return Err(ApiError::Forbidden);
        }
        if data.delete_policy == DeletePolicy::DraftOnly && incident.status != IncidentStatus::Draft {
            return Err(ApiError::Forbidden);
        }
    }
    data.repo.delete_incident(incident.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/incidents/{id}/media",
    request_body = [NewMedia],
    params(("id" = Uuid, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Media appended", body = Incident),
        (status = 403, description = "Not owner or admin"),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn append_incident_media(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<Vec<NewMedia>>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&auth)?;
    let incident = data.repo.get_incident(path.into_inner()).await?;
    if !auth.0.is_admin() && incident.user_id != caller {
        return Err(ApiError::Forbidden);
    }
    let updated = data.repo.append_media(incident.id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

// ---------------- users ---------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "All users, newest first", body = [User]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_users(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let users = data.repo.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

pub async fn get_profile(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let id = caller_id(&auth)?;
    let user = data.repo.get_user(id).await?;
    Ok(HttpResponse::Ok().json(user))
}

// Base64 profile pictures are stored inline; keep them bounded.
const PROFILE_PICTURE_LIMIT: usize = 1024 * 1024;

#[utoipa::path(
    put,
    path = "/api/v1/users/profile",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "No fields, bad email, or oversized picture"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let id = caller_id(&auth)?;
    let mut upd = payload.into_inner();
    if upd.is_empty() {
        return Err(ApiError::Validation("no fields to update".into()));
    }
    if let Some(email) = upd.email.take() {
        upd.email = Some(normalize_email(&email)?);
    }
    if let Some(ref pic) = upd.profile_picture {
        if pic.len() > PROFILE_PICTURE_LIMIT {
            return Err(ApiError::Validation("profile picture is too large (max 1MB)".into()));
        }
    }
    if let Some(ref name) = upd.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
    }
    let user = data.repo.update_profile(id, upd).await?;
    Ok(HttpResponse::Ok().json(user))
}

// ---------------- media upload / fetch ------------------------------------

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct MediaUploadResponse {
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    pub size: usize,
    pub duplicate: bool, // true when upload was a duplicate (idempotent)
}

const MEDIA_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &[
    "image/png", "image/jpeg", "image/gif", "image/webp",
    "video/mp4", "video/webm"
];

#[utoipa::path(
    post,
    path = "/api/v1/media",
    responses(
        (status = 201, description = "Blob stored (new)", body = MediaUploadResponse),
        (status = 200, description = "Blob already existed (idempotent)", body = MediaUploadResponse),
        (status = 415, description = "Unsupported media type"),
        (status = 413, description = "Payload too large"),
        (status = 429, description = "Too many uploads")
    )
)]
pub async fn upload_media(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    if let Some(rl) = &data.rate_limiter {
        let ip = req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default();
        if !rl.allow_media(&ip) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        if let Some(name) = field.content_disposition().get_name() {
            if name != "file" { continue; }
        } else { continue; }
        let mut field_stream = field;
        let mut hasher = Sha256::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > MEDIA_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let kind = if mime.starts_with("video/") { MediaKind::Video } else { MediaKind::Image };
        // Idempotent persist keyed by content hash.
        let (status_code, duplicate) = match data.media_store.save(&hash, &mime, &bytes).await {
            Ok(()) => (StatusCode::CREATED, false),
            Err(MediaStoreError::Duplicate) => (StatusCode::OK, true),
            Err(e) => {
                log::error!("media_store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        let resp = MediaUploadResponse {
            url: format!("/media/{hash}"),
            hash,
            kind,
            size: bytes.len(),
            duplicate,
        };
        return Ok(HttpResponse::build(status_code).json(resp));
    }
    Ok(HttpResponse::BadRequest().finish())
}

// Serve a stored blob by hash.
pub async fn get_media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    // Content hashes are lowercase hex; anything else cannot name a blob.
    if hash.len() < 2 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::NotFound);
    }
    match data.media_store.load(&hash).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes)),
        Err(MediaStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("media_store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}
