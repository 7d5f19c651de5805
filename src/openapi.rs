use crate::auth::Role;
use crate::models::{
    Incident, IncidentStatus, IncidentType, Location, MediaFile, MediaKind, NewIncident, NewMedia,
    UpdateIncident, UpdateProfile, User, UserSummary,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::sign_up,
        crate::routes::sign_in,
        crate::routes::auth_me,
        crate::routes::create_incident,
        crate::routes::list_incidents,
        crate::routes::get_incident,
        crate::routes::list_user_incidents,
        crate::routes::update_incident,
        crate::routes::delete_incident,
        crate::routes::append_incident_media,
        crate::routes::list_users,
        crate::routes::update_profile,
        crate::routes::upload_media,
    ),
    components(schemas(
        Incident, IncidentType, IncidentStatus, Location, MediaFile, MediaKind,
        NewIncident, NewMedia, UpdateIncident,
        User, UserSummary, UpdateProfile, Role,
        crate::routes::SignUpRequest, crate::routes::SignInRequest,
        crate::routes::AuthResponse, crate::routes::MediaUploadResponse,
        crate::error::ApiErrorBody,
    )),
    tags(
        (name = "auth", description = "Signup / signin / token operations"),
        (name = "incidents", description = "Incident reporting and triage"),
        (name = "users", description = "User profiles and administration"),
        (name = "media", description = "Evidence blob upload and fetch"),
    )
)]
pub struct ApiDoc;
