use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;

// Ids are v4 UUIDs generated app-side, never by the database.
pub type Id = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentType {
    RedFlag,
    Intervention,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::RedFlag => "red-flag",
            IncidentType::Intervention => "intervention",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "red-flag" => Some(IncidentType::RedFlag),
            "intervention" => Some(IncidentType::Intervention),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentStatus {
    Draft,
    UnderInvestigation,
    Resolved,
    Rejected,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Draft => "draft",
            IncidentStatus::UnderInvestigation => "under-investigation",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Rejected => "rejected",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(IncidentStatus::Draft),
            "under-investigation" => Some(IncidentStatus::UnderInvestigation),
            "resolved" => Some(IncidentStatus::Resolved),
            "rejected" => Some(IncidentStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    /// Range check only; presence of lat/lng is enforced by deserialization.
    pub fn in_bounds(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public owner summary joined onto incident reads (name + email only).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Id,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: IncidentType,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub status: IncidentStatus,
    pub admin_comment: Option<String>,
    pub user_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    pub media: Vec<MediaFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload. Media entries keep optional fields so one malformed
/// entry can be skipped without rejecting the batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    #[serde(rename = "type")]
    pub kind: IncidentType,
    pub title: String,
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub media: Vec<NewMedia>,
    pub status: Option<IncidentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewMedia {
    #[serde(rename = "type")]
    pub kind: Option<MediaKind>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

impl NewMedia {
    /// An entry missing `type` or `url` is dropped, not rejected.
    pub fn well_formed(&self) -> Option<(MediaKind, String, Option<String>)> {
        let kind = self.kind?;
        let url = self.url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some((kind, url.to_string(), self.thumbnail.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIncident {
    pub status: Option<IncidentStatus>,
    pub admin_comment: Option<String>,
}

impl UpdateIncident {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.admin_comment.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Internal create payload; the password is hashed by the boundary first.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.profile_picture.is_none()
    }
}
