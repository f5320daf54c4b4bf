use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::models::UserProfile;
use crate::validation::{self, Validate};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "group_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GroupKind {
    #[default]
    Organization,
    Individual,
}

/// GroupStatus
///
/// Moderation state of a relief group. Only `approved` groups are listed publicly
/// and may hold stock or take on service requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "group_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GroupStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Suspended,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "document_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DocumentKind {
    RegistrationCertificate,
    IdProof,
    #[default]
    Other,
}

/// ReliefGroup
///
/// An organization or individual registered to provide relief. `owner_id` is the
/// provider account created for the representative at registration.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ReliefGroup {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub kind: GroupKind,
    pub description: Option<String>,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub state_id: Option<Uuid>,
    pub district_id: Option<Uuid>,
    // Catalog services this group offers; drives which service requests it sees.
    pub service_ids: Vec<Uuid>,
    pub status: GroupStatus,
    pub status_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct GroupRepresentative {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub designation: Option<String>,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Document
///
/// Supporting paperwork uploaded by a group for admin review. The file itself lives
/// in object storage under `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Document {
    pub id: Uuid,
    pub group_id: Uuid,
    pub kind: DocumentKind,
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// --- Internal insert shapes ---

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub kind: GroupKind,
    pub description: Option<String>,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub state_id: Option<Uuid>,
    pub district_id: Option<Uuid>,
    pub service_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewRepresentative {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub designation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub group_id: Uuid,
    pub kind: DocumentKind,
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
    pub uploaded_by: Uuid,
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GroupDetailsPayload {
    pub name: String,
    #[serde(default)]
    pub kind: GroupKind,
    pub description: Option<String>,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub state_id: Option<Uuid>,
    pub district_id: Option<Uuid>,
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RepresentativePayload {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub designation: Option<String>,
    pub password: String,
}

/// RegisterGroupRequest
///
/// Public group registration (POST /groups/register). The representative phone must
/// have been verified through the OTP flow beforehand.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterGroupRequest {
    pub group: GroupDetailsPayload,
    pub representative: RepresentativePayload,
}

impl Validate for RegisterGroupRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        let g = &self.group;
        validation::check_name(&mut errors, "group.name", &g.name);
        validation::check_phone(&mut errors, "group.contact_phone", &g.contact_phone);
        if let Some(email) = g.contact_email.as_deref().filter(|e| !e.trim().is_empty()) {
            validation::check_email(&mut errors, "group.contact_email", email);
        }
        validation::check_optional_text(&mut errors, "group.description", g.description.as_deref());
        validation::check_optional_text(&mut errors, "group.address", g.address.as_deref());
        if g.district_id.is_some() && g.state_id.is_none() {
            errors.add("group.state_id", "is required when a district is given");
        }
        if g.service_ids.is_empty() {
            errors.add("group.service_ids", "select at least one service");
        }

        let r = &self.representative;
        validation::check_name(&mut errors, "representative.name", &r.name);
        validation::check_phone(&mut errors, "representative.phone", &r.phone);
        validation::check_email(&mut errors, "representative.email", &r.email);
        validation::check_password(&mut errors, "representative.password", &r.password);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterGroupResponse {
    pub group: ReliefGroup,
    pub representative: UserProfile,
}

/// UpdateGroupRequest
///
/// Partial update of the caller's own group. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateGroupRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ids: Option<Vec<Uuid>>,
}

impl Validate for UpdateGroupRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            validation::check_name(&mut errors, "name", name);
        }
        if let Some(phone) = &self.contact_phone {
            validation::check_phone(&mut errors, "contact_phone", phone);
        }
        if let Some(email) = &self.contact_email {
            validation::check_email(&mut errors, "contact_email", email);
        }
        validation::check_optional_text(&mut errors, "description", self.description.as_deref());
        validation::check_optional_text(&mut errors, "address", self.address.as_deref());
        if matches!(&self.service_ids, Some(ids) if ids.is_empty()) {
            errors.add("service_ids", "select at least one service");
        }
        errors.into_result()
    }
}

/// Admin moderation payload. `reason` is mandatory for rejection and suspension.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GroupStatusUpdate {
    pub status: GroupStatus,
    pub reason: Option<String>,
}

/// Public directory filter (GET /groups).
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GroupFilter {
    pub status: Option<GroupStatus>,
    pub state_id: Option<Uuid>,
    pub district_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}

/// Admin view of a group with its people and paperwork.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GroupDetail {
    pub group: ReliefGroup,
    pub representatives: Vec<GroupRepresentative>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DocumentUploadRequest {
    #[schema(example = "registration.pdf")]
    pub file_name: String,
    #[schema(example = "application/pdf")]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DocumentUploadResponse {
    pub upload_url: String,
    pub storage_key: String,
}

/// Registers a document after the client finished the direct-to-storage upload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RecordDocumentRequest {
    #[serde(default)]
    pub kind: DocumentKind,
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DocumentDownloadResponse {
    pub download_url: String,
}
