use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait IncidentRepo: Send + Sync {
    /// Creates the incident row and its well-formed media children in one
    /// transaction, then re-reads the hydrated record.
    async fn create_incident(&self, user_id: Id, new: NewIncident) -> RepoResult<Incident>;
    async fn get_incident(&self, id: Id) -> RepoResult<Incident>;
    /// Newest-first, owner summary joined, media attached.
    async fn list_incidents(&self) -> RepoResult<Vec<Incident>>;
    async fn list_incidents_for_user(&self, user_id: Id) -> RepoResult<Vec<Incident>>;
    /// Partial update; untouched fields keep their stored value, `updated_at`
    /// is always refreshed.
    async fn update_incident(&self, id: Id, upd: UpdateIncident) -> RepoResult<Incident>;
    /// Removes media children before the parent row, transactionally.
    async fn delete_incident(&self, id: Id) -> RepoResult<()>;
    async fn append_media(&self, incident_id: Id, media: Vec<NewMedia>) -> RepoResult<Incident>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Duplicate email reports `Conflict`.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    /// Returns the user plus their password hash for credential checks.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<(User, String)>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
}

pub trait Repo: IncidentRepo + UserRepo {}

impl<T> Repo for T where T: IncidentRepo + UserRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};
    use uuid::Uuid;

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Clone, Serialize, Deserialize)]
    struct StoredUser {
        user: User,
        password_hash: String,
        updated_at: DateTime<Utc>,
    }

    #[derive(Clone, Serialize, Deserialize)]
    struct IncidentRecord {
        id: Id,
        kind: IncidentType,
        title: String,
        description: String,
        location: Location,
        status: IncidentStatus,
        admin_comment: Option<String>,
        user_id: Id,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    #[derive(Clone, Serialize, Deserialize)]
    struct StoredMedia {
        incident_id: Id,
        file: MediaFile,
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, StoredUser>,
        incidents: HashMap<Id, IncidentRecord>,
        media: HashMap<Id, StoredMedia>,
    }

    /// Snapshot-backed in-memory store for dev runs and the test suite.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("IR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }
        fn snapshot_path() -> PathBuf {
            if std::env::var("IR_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn hydrate(state: &State, rec: &IncidentRecord) -> Incident {
            let user = state.users.get(&rec.user_id).map(|u| UserSummary {
                id: u.user.id,
                name: u.user.name.clone(),
                email: u.user.email.clone(),
            });
            let mut media: Vec<MediaFile> = state
                .media
                .values()
                .filter(|m| m.incident_id == rec.id)
                .map(|m| m.file.clone())
                .collect();
            media.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Incident {
                id: rec.id,
                kind: rec.kind,
                title: rec.title.clone(),
                description: rec.description.clone(),
                location: rec.location.clone(),
                status: rec.status,
                admin_comment: rec.admin_comment.clone(),
                user_id: rec.user_id,
                user,
                media,
                created_at: rec.created_at,
                updated_at: rec.updated_at,
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl IncidentRepo for InMemRepo {
        async fn create_incident(&self, user_id: Id, new: NewIncident) -> RepoResult<Incident> {
            let id = Uuid::new_v4();
            let now = Utc::now();
            {
                let mut s = self.state.write().unwrap();
                // Mirrors the foreign key on incidents.user_id.
                if !s.users.contains_key(&user_id) {
                    return Err(RepoError::NotFound);
                }
                let rec = IncidentRecord {
                    id,
                    kind: new.kind,
                    title: new.title.clone(),
                    description: new.description.clone(),
                    location: new.location.clone(),
                    status: new.status.unwrap_or(IncidentStatus::Draft),
                    admin_comment: None,
                    user_id,
                    created_at: now,
                    updated_at: now,
                };
                s.incidents.insert(id, rec);
                for m in new.media.iter().filter_map(|m| m.well_formed()) {
                    let (kind, url, thumbnail) = m;
                    let media_id = Uuid::new_v4();
                    s.media.insert(
                        media_id,
                        StoredMedia {
                            incident_id: id,
                            file: MediaFile { id: media_id, kind, url, thumbnail, created_at: now },
                        },
                    );
                }
            }
            self.persist();
            self.get_incident(id).await
        }

        async fn get_incident(&self, id: Id) -> RepoResult<Incident> {
            let s = self.state.read().unwrap();
            let rec = s.incidents.get(&id).ok_or(RepoError::NotFound)?;
            Ok(Self::hydrate(&s, rec))
        }

        async fn list_incidents(&self) -> RepoResult<Vec<Incident>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Incident> = s.incidents.values().map(|r| Self::hydrate(&s, r)).collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn list_incidents_for_user(&self, user_id: Id) -> RepoResult<Vec<Incident>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Incident> = s
                .incidents
                .values()
                .filter(|r| r.user_id == user_id)
                .map(|r| Self::hydrate(&s, r))
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn update_incident(&self, id: Id, upd: UpdateIncident) -> RepoResult<Incident> {
            {
                let mut s = self.state.write().unwrap();
                let rec = s.incidents.get_mut(&id).ok_or(RepoError::NotFound)?;
                if let Some(status) = upd.status { rec.status = status; }
                if let Some(comment) = upd.admin_comment { rec.admin_comment = Some(comment); }
                rec.updated_at = Utc::now();
            }
            self.persist();
            self.get_incident(id).await
        }

        async fn delete_incident(&self, id: Id) -> RepoResult<()> {
            {
                let mut s = self.state.write().unwrap();
                if s.incidents.remove(&id).is_none() {
                    return Err(RepoError::NotFound);
                }
                // Children go with the parent, no cascade assumed.
                s.media.retain(|_, m| m.incident_id != id);
            }
            self.persist();
            Ok(())
        }

        async fn append_media(&self, incident_id: Id, media: Vec<NewMedia>) -> RepoResult<Incident> {
            let now = Utc::now();
            {
                let mut s = self.state.write().unwrap();
                let rec = s.incidents.get_mut(&incident_id).ok_or(RepoError::NotFound)?;
                rec.updated_at = now;
                for m in media.iter().filter_map(|m| m.well_formed()) {
                    let (kind, url, thumbnail) = m;
                    let media_id = Uuid::new_v4();
                    s.media.insert(
                        media_id,
                        StoredMedia {
                            incident_id,
                            file: MediaFile { id: media_id, kind, url, thumbnail, created_at: now },
                        },
                    );
                }
            }
            self.persist();
            self.get_incident(incident_id).await
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let id = Uuid::new_v4();
            let now = Utc::now();
            {
                let mut s = self.state.write().unwrap();
                if s.users.values().any(|u| u.user.email == new.email) {
                    return Err(RepoError::Conflict);
                }
                let user = User {
                    id,
                    email: new.email,
                    name: new.name,
                    role: new.role,
                    profile_picture: None,
                    created_at: now,
                };
                s.users.insert(id, StoredUser { user, password_hash: new.password_hash, updated_at: now });
            }
            self.persist();
            self.get_user(id).await
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<(User, String)>> {
            let s = self.state.read().unwrap();
            Ok(s.users
                .values()
                .find(|u| u.user.email == email)
                .map(|u| (u.user.clone(), u.password_hash.clone())))
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).map(|u| u.user.clone()).ok_or(RepoError::NotFound)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<User> = s.users.values().map(|u| u.user.clone()).collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            {
                let mut s = self.state.write().unwrap();
                // uniqueness check before the mutable borrow
                if let Some(ref email) = upd.email {
                    if s.users.values().any(|u| u.user.email == *email && u.user.id != id) {
                        return Err(RepoError::Conflict);
                    }
                }
                let stored = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
                if let Some(name) = upd.name { stored.user.name = name; }
                if let Some(email) = upd.email { stored.user.email = email; }
                if let Some(pic) = upd.profile_picture { stored.user.profile_picture = Some(pic); }
                stored.updated_at = Utc::now();
            }
            self.persist();
            self.get_user(id).await
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};
    use uuid::Uuid;

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    impl From<sqlx::Error> for RepoError {
        fn from(e: sqlx::Error) -> Self {
            match &e {
                sqlx::Error::RowNotFound => RepoError::NotFound,
                sqlx::Error::Database(db) => match db.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => RepoError::Conflict,
                    sqlx::error::ErrorKind::ForeignKeyViolation => RepoError::NotFound,
                    _ => RepoError::Internal(e.to_string()),
                },
                _ => RepoError::Internal(e.to_string()),
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct IncidentRow {
        id: Uuid,
        user_id: Uuid,
        #[sqlx(rename = "type")]
        kind: String,
        title: String,
        description: String,
        latitude: f64,
        longitude: f64,
        address: Option<String>,
        status: String,
        admin_comment: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        user_name: String,
        user_email: String,
    }

    impl IncidentRow {
        fn into_incident(self, media: Vec<MediaFile>) -> RepoResult<Incident> {
            let kind = IncidentType::parse(&self.kind)
                .ok_or_else(|| RepoError::Internal(format!("unknown incident type '{}'", self.kind)))?;
            let status = IncidentStatus::parse(&self.status)
                .ok_or_else(|| RepoError::Internal(format!("unknown status '{}'", self.status)))?;
            Ok(Incident {
                id: self.id,
                kind,
                title: self.title,
                description: self.description,
                location: Location { lat: self.latitude, lng: self.longitude, address: self.address },
                status,
                admin_comment: self.admin_comment,
                user_id: self.user_id,
                user: Some(UserSummary { id: self.user_id, name: self.user_name, email: self.user_email }),
                media,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(sqlx::FromRow)]
    struct MediaRow {
        id: Uuid,
        #[sqlx(rename = "type")]
        kind: String,
        url: String,
        thumbnail: Option<String>,
        created_at: DateTime<Utc>,
    }

    impl MediaRow {
        fn into_media(self) -> RepoResult<MediaFile> {
            let kind = MediaKind::parse(&self.kind)
                .ok_or_else(|| RepoError::Internal(format!("unknown media type '{}'", self.kind)))?;
            Ok(MediaFile {
                id: self.id,
                kind,
                url: self.url,
                thumbnail: self.thumbnail,
                created_at: self.created_at,
            })
        }
    }

    #[derive(sqlx::FromRow)]
    struct UserRow {
        id: Uuid,
        email: String,
        name: String,
        role: String,
        profile_picture: Option<String>,
        created_at: DateTime<Utc>,
    }

    impl UserRow {
        fn into_user(self) -> RepoResult<User> {
            let role = crate::auth::Role::parse(&self.role)
                .ok_or_else(|| RepoError::Internal(format!("unknown role '{}'", self.role)))?;
            Ok(User {
                id: self.id,
                email: self.email,
                name: self.name,
                role,
                profile_picture: self.profile_picture,
                created_at: self.created_at,
            })
        }
    }

    impl PgRepo {
        async fn media_for(&self, incident_id: Uuid) -> RepoResult<Vec<MediaFile>> {
            let rows = sqlx::query_as::<_, MediaRow>(
                "SELECT id, type, url, thumbnail, created_at FROM media_files WHERE incident_id = $1 ORDER BY created_at, id",
            )
            .bind(incident_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(MediaRow::into_media).collect()
        }
    }

    #[async_trait]
    impl IncidentRepo for PgRepo {
        async fn create_incident(&self, user_id: Id, new: NewIncident) -> RepoResult<Incident> {
            let id = Uuid::new_v4();
            let now = Utc::now();
            let status = new.status.unwrap_or(IncidentStatus::Draft);
            // One transaction for the parent row and all children; an early
            // return drops the transaction, which rolls back and releases the
            // connection to the pool.
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO incidents (id, user_id, type, title, description, latitude, longitude, address, status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)",
            )
            .bind(id)
            .bind(user_id)
            .bind(new.kind.as_str())
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.location.lat)
            .bind(new.location.lng)
            .bind(new.location.address.as_deref())
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            for (kind, url, thumbnail) in new.media.iter().filter_map(|m| m.well_formed()) {
                sqlx::query(
                    "INSERT INTO media_files (id, incident_id, type, url, thumbnail, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(Uuid::new_v4())
                .bind(id)
                .bind(kind.as_str())
                .bind(&url)
                .bind(thumbnail.as_deref())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            // Re-read so the response reflects exactly what is stored,
            // server-assigned defaults included.
            self.get_incident(id).await
        }

        async fn get_incident(&self, id: Id) -> RepoResult<Incident> {
            let row = sqlx::query_as::<_, IncidentRow>(
                "SELECT i.id, i.user_id, i.type, i.title, i.description, i.latitude, i.longitude, i.address,
                        i.status, i.admin_comment, i.created_at, i.updated_at,
                        u.name AS user_name, u.email AS user_email
                 FROM incidents i
                 JOIN users u ON u.id = i.user_id
                 WHERE i.id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
            let media = self.media_for(id).await?;
            row.into_incident(media)
        }

        async fn list_incidents(&self) -> RepoResult<Vec<Incident>> {
            let rows = sqlx::query_as::<_, IncidentRow>(
                "SELECT i.id, i.user_id, i.type, i.title, i.description, i.latitude, i.longitude, i.address,
                        i.status, i.admin_comment, i.created_at, i.updated_at,
                        u.name AS user_name, u.email AS user_email
                 FROM incidents i
                 JOIN users u ON u.id = i.user_id
                 ORDER BY i.created_at DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let media = self.media_for(row.id).await?;
                out.push(row.into_incident(media)?);
            }
            Ok(out)
        }

        async fn list_incidents_for_user(&self, user_id: Id) -> RepoResult<Vec<Incident>> {
            let rows = sqlx::query_as::<_, IncidentRow>(
                "SELECT i.id, i.user_id, i.type, i.title, i.description, i.latitude, i.longitude, i.address,
                        i.status, i.admin_comment, i.created_at, i.updated_at,
                        u.name AS user_name, u.email AS user_email
                 FROM incidents i
                 JOIN users u ON u.id = i.user_id
                 WHERE i.user_id = $1
                 ORDER BY i.created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let media = self.media_for(row.id).await?;
                out.push(row.into_incident(media)?);
            }
            Ok(out)
        }

        async fn update_incident(&self, id: Id, upd: UpdateIncident) -> RepoResult<Incident> {
            let res = sqlx::query(
                "UPDATE incidents
                 SET status = COALESCE($2, status),
                     admin_comment = COALESCE($3, admin_comment),
                     updated_at = $4
                 WHERE id = $1",
            )
            .bind(id)
            .bind(upd.status.map(|s| s.as_str()))
            .bind(upd.admin_comment.as_deref())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            self.get_incident(id).await
        }

        async fn delete_incident(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM media_files WHERE incident_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let res = sqlx::query("DELETE FROM incidents WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if res.rows_affected() == 0 {
                // Dropping the transaction rolls the media delete back too.
                return Err(RepoError::NotFound);
            }
            tx.commit().await?;
            Ok(())
        }

        async fn append_media(&self, incident_id: Id, media: Vec<NewMedia>) -> RepoResult<Incident> {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;
            let res = sqlx::query("UPDATE incidents SET updated_at = $2 WHERE id = $1")
                .bind(incident_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            for (kind, url, thumbnail) in media.iter().filter_map(|m| m.well_formed()) {
                sqlx::query(
                    "INSERT INTO media_files (id, incident_id, type, url, thumbnail, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(Uuid::new_v4())
                .bind(incident_id)
                .bind(kind.as_str())
                .bind(&url)
                .bind(thumbnail.as_deref())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            self.get_incident(incident_id).await
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let id = Uuid::new_v4();
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO users (id, email, name, password_hash, role, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $6)",
            )
            .bind(id)
            .bind(&new.email)
            .bind(&new.name)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?;
            self.get_user(id).await
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<(User, String)>> {
            #[derive(sqlx::FromRow)]
            struct CredRow {
                id: Uuid,
                email: String,
                name: String,
                role: String,
                profile_picture: Option<String>,
                created_at: DateTime<Utc>,
                password_hash: String,
            }
            let row = sqlx::query_as::<_, CredRow>(
                "SELECT id, email, name, role, profile_picture, created_at, password_hash FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                None => Ok(None),
                Some(r) => {
                    let hash = r.password_hash.clone();
                    let role = crate::auth::Role::parse(&r.role)
                        .ok_or_else(|| RepoError::Internal(format!("unknown role '{}'", r.role)))?;
                    let user = User {
                        id: r.id,
                        email: r.email,
                        name: r.name,
                        role,
                        profile_picture: r.profile_picture,
                        created_at: r.created_at,
                    };
                    Ok(Some((user, hash)))
                }
            }
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, email, name, role, profile_picture, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
            row.into_user()
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let rows = sqlx::query_as::<_, UserRow>(
                "SELECT id, email, name, role, profile_picture, created_at FROM users ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(UserRow::into_user).collect()
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            let res = sqlx::query(
                "UPDATE users
                 SET name = COALESCE($2, name),
                     email = COALESCE($3, email),
                     profile_picture = COALESCE($4, profile_picture),
                     updated_at = $5
                 WHERE id = $1",
            )
            .bind(id)
            .bind(upd.name.as_deref())
            .bind(upd.email.as_deref())
            .bind(upd.profile_picture.as_deref())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            self.get_user(id).await
        }
    }
}
