use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{clean_text, owned_group, record_audit};
use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult, FieldErrors},
    models::{
        CatalogKind, Document, DocumentDownloadResponse, DocumentUploadRequest,
        DocumentUploadResponse, GroupDetail, GroupFilter, GroupStatus, GroupStatusUpdate,
        LocationLevel, NewDocument, NewGroup, NewRepresentative, NewUser, RecordDocumentRequest,
        RegisterGroupRequest, RegisterGroupResponse, ReliefGroup, UpdateGroupRequest,
        UserProfile, UserRole,
    },
    otp,
    repository::GroupRegistration,
    storage,
    validation::{self, Validate},
    workflow,
};

/// Checks every offered service exists and is active. Returns the ids deduplicated.
async fn check_services(state: &AppState, field: &str, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
    let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
    for id in ids {
        if unique.contains(id) {
            continue;
        }
        let active = state
            .repo
            .get_catalog_entry(CatalogKind::Services, *id)
            .await?
            .is_some_and(|s| s.is_active);
        if !active {
            return Err(AppError::validation(
                field,
                format!("{} is not an available service", id),
            ));
        }
        unique.push(*id);
    }
    Ok(unique)
}

/// The district, when given, must lie inside the given state.
async fn check_region(
    state: &AppState,
    state_id: Option<Uuid>,
    district_id: Option<Uuid>,
) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if let Some(id) = state_id {
        if state.repo.get_location(LocationLevel::State, id).await?.is_none() {
            errors.add("group.state_id", "does not exist");
        }
    }
    if let Some(id) = district_id {
        match state.repo.get_location(LocationLevel::District, id).await? {
            Some(district) if district.parent_id == state_id => {}
            Some(_) => errors.add("group.district_id", "is not in the selected state"),
            None => errors.add("group.district_id", "does not exist"),
        }
    }
    errors.into_result()
}

/// register_group
///
/// [Public Route] Registers a relief group together with its representative's
/// provider account. The representative phone must carry a recent OTP
/// verification; the repository consumes it in the same unit of work that
/// creates the user, group and representative rows, so one verification yields
/// at most one registration.
#[utoipa::path(
    post,
    path = "/groups/register",
    request_body = RegisterGroupRequest,
    responses(
        (status = 201, description = "Group registered, pending approval", body = RegisterGroupResponse),
        (status = 400, description = "Validation failed or phone not verified"),
        (status = 409, description = "Email or phone already registered")
    )
)]
pub async fn register_group(
    State(state): State<AppState>,
    Json(payload): Json<RegisterGroupRequest>,
) -> AppResult<(StatusCode, Json<RegisterGroupResponse>)> {
    payload.validate()?;
    let RegisterGroupRequest {
        group,
        representative,
    } = payload;

    let rep_phone = validation::require_phone("representative.phone", &representative.phone)?;
    let contact_phone = validation::require_phone("group.contact_phone", &group.contact_phone)?;
    let service_ids = check_services(&state, "group.service_ids", &group.service_ids).await?;
    check_region(&state, group.state_id, group.district_id).await?;

    let email = representative.email.trim().to_lowercase();
    let registration = GroupRegistration {
        user: NewUser {
            name: representative.name.trim().to_string(),
            email: email.clone(),
            phone: rep_phone.clone(),
            password_hash: auth::hash_password(&representative.password)?,
            role: UserRole::Provider,
        },
        group: NewGroup {
            name: group.name.trim().to_string(),
            kind: group.kind,
            description: clean_text(group.description),
            contact_phone,
            contact_email: clean_text(group.contact_email).map(|e| e.to_lowercase()),
            address: clean_text(group.address),
            state_id: group.state_id,
            district_id: group.district_id,
            service_ids,
        },
        representative: NewRepresentative {
            name: representative.name.trim().to_string(),
            phone: rep_phone,
            email: Some(email),
            designation: clean_text(representative.designation),
        },
        verified_since: otp::verified_since(&state.config.otp, Utc::now()),
    };

    let (group, owner) = state.repo.register_group(registration).await?;
    tracing::info!(group_id = %group.id, owner_id = %owner.id, "relief group registered");
    record_audit(
        &state,
        Some(owner.id),
        "group.registered",
        "relief_group",
        Some(group.id),
        json!({ "name": group.name, "kind": group.kind }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterGroupResponse {
            group,
            representative: UserProfile::from(&owner),
        }),
    ))
}

/// [Public Route] Directory of approved groups. Any `status` in the query is
/// ignored: the public only ever sees approved groups.
#[utoipa::path(
    get,
    path = "/groups",
    params(GroupFilter),
    responses((status = 200, description = "Approved groups", body = [ReliefGroup]))
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(mut filter): Query<GroupFilter>,
) -> AppResult<Json<Vec<ReliefGroup>>> {
    filter.status = Some(GroupStatus::Approved);
    Ok(Json(state.repo.list_groups(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/groups/{id}",
    params(("id" = Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group", body = ReliefGroup),
        (status = 404, description = "Unknown or not approved")
    )
)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReliefGroup>> {
    state
        .repo
        .get_group(id)
        .await?
        .filter(|g| g.status == GroupStatus::Approved)
        .map(Json)
        .ok_or(AppError::NotFound("Relief group"))
}

/// [Provider Route] The caller's own group, in whatever moderation state it is.
#[utoipa::path(
    get,
    path = "/me/group",
    responses((status = 200, description = "Own group", body = ReliefGroup))
)]
pub async fn my_group(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<ReliefGroup>> {
    Ok(Json(owned_group(&state, &user).await?))
}

#[utoipa::path(
    put,
    path = "/me/group",
    request_body = UpdateGroupRequest,
    responses((status = 200, description = "Updated", body = ReliefGroup))
)]
pub async fn update_my_group(
    user: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<UpdateGroupRequest>,
) -> AppResult<Json<ReliefGroup>> {
    payload.validate()?;
    let group = owned_group(&state, &user).await?;

    if let Some(phone) = &payload.contact_phone {
        payload.contact_phone = Some(validation::require_phone("contact_phone", phone)?);
    }
    if let Some(ids) = &payload.service_ids {
        payload.service_ids = Some(check_services(&state, "service_ids", ids).await?);
    }
    payload.name = payload.name.map(|n| n.trim().to_string());
    payload.contact_email = payload.contact_email.map(|e| e.trim().to_lowercase());

    let updated = state
        .repo
        .update_group(group.id, payload)
        .await?
        .ok_or(AppError::NotFound("Relief group"))?;
    record_audit(
        &state,
        Some(user.id),
        "group.updated",
        "relief_group",
        Some(group.id),
        json!({}),
    )
    .await;
    Ok(Json(updated))
}

/// document_upload_url
///
/// [Provider Route] Hands out a presigned PUT URL for a supporting document. The
/// object key is chosen here, under the group's own prefix, never by the client.
#[utoipa::path(
    post,
    path = "/me/group/documents/upload-url",
    request_body = DocumentUploadRequest,
    responses(
        (status = 200, description = "Presigned upload URL", body = DocumentUploadResponse),
        (status = 400, description = "Unsupported file type")
    )
)]
pub async fn document_upload_url(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<DocumentUploadRequest>,
) -> AppResult<Json<DocumentUploadResponse>> {
    let group = owned_group(&state, &user).await?;
    if payload.file_name.trim().is_empty() {
        return Err(AppError::validation("file_name", "is required"));
    }
    let extension = storage::document_extension(&payload.content_type).ok_or_else(|| {
        AppError::validation("content_type", "only PDF, JPEG and PNG files are accepted")
    })?;

    let storage_key = storage::document_key(group.id, extension);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&storage_key, &payload.content_type)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(DocumentUploadResponse {
        upload_url,
        storage_key,
    }))
}

/// [Provider Route] Records a document once its upload has finished.
#[utoipa::path(
    post,
    path = "/me/group/documents",
    request_body = RecordDocumentRequest,
    responses(
        (status = 201, description = "Recorded", body = Document),
        (status = 403, description = "Key outside the group's prefix")
    )
)]
pub async fn record_document(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RecordDocumentRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let group = owned_group(&state, &user).await?;
    if !storage::key_belongs_to_group(&payload.storage_key, group.id) {
        return Err(AppError::forbidden(
            "Storage key does not belong to your group",
        ));
    }
    if storage::document_extension(&payload.content_type).is_none() {
        return Err(AppError::validation(
            "content_type",
            "only PDF, JPEG and PNG files are accepted",
        ));
    }
    let file_name = payload.file_name.trim();
    if file_name.is_empty() {
        return Err(AppError::validation("file_name", "is required"));
    }

    let document = state
        .repo
        .add_document(NewDocument {
            group_id: group.id,
            kind: payload.kind,
            file_name: file_name.to_string(),
            content_type: payload.content_type,
            storage_key: payload.storage_key,
            uploaded_by: user.id,
        })
        .await?;
    record_audit(
        &state,
        Some(user.id),
        "group.document_added",
        "document",
        Some(document.id),
        json!({ "group_id": group.id, "kind": document.kind }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/me/group/documents",
    responses((status = 200, description = "Own documents", body = [Document]))
)]
pub async fn my_documents(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Document>>> {
    let group = owned_group(&state, &user).await?;
    Ok(Json(state.repo.list_documents(group.id).await?))
}

// --- Admin moderation ---

/// [Admin Route] All groups, optionally filtered by status, region or service.
#[utoipa::path(
    get,
    path = "/admin/groups",
    params(GroupFilter),
    responses((status = 200, description = "Groups", body = [ReliefGroup]))
)]
pub async fn admin_list_groups(
    State(state): State<AppState>,
    Query(filter): Query<GroupFilter>,
) -> AppResult<Json<Vec<ReliefGroup>>> {
    Ok(Json(state.repo.list_groups(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/admin/groups/{id}",
    params(("id" = Uuid, Path, description = "Group ID")),
    responses((status = 200, description = "Group with representatives and documents", body = GroupDetail))
)]
pub async fn admin_group_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GroupDetail>> {
    let group = state
        .repo
        .get_group(id)
        .await?
        .ok_or(AppError::NotFound("Relief group"))?;
    let representatives = state.repo.list_representatives(id).await?;
    let documents = state.repo.list_documents(id).await?;
    Ok(Json(GroupDetail {
        group,
        representatives,
        documents,
    }))
}

/// set_group_status
///
/// [Admin Route] Moves a group through moderation. Rejection and suspension
/// need a reason, which is shown to the group. The write only lands if the group
/// is still in the status this decision was based on.
#[utoipa::path(
    put,
    path = "/admin/groups/{id}/status",
    params(("id" = Uuid, Path, description = "Group ID")),
    request_body = GroupStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = ReliefGroup),
        (status = 409, description = "Transition not allowed or lost a race")
    )
)]
pub async fn set_group_status(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GroupStatusUpdate>,
) -> AppResult<Json<ReliefGroup>> {
    let group = state
        .repo
        .get_group(id)
        .await?
        .ok_or(AppError::NotFound("Relief group"))?;
    workflow::ensure_transition(group.status, payload.status)?;

    let reason = clean_text(payload.reason);
    if matches!(payload.status, GroupStatus::Rejected | GroupStatus::Suspended) && reason.is_none()
    {
        return Err(AppError::validation(
            "reason",
            "is required when rejecting or suspending a group",
        ));
    }

    let updated = state
        .repo
        .set_group_status(id, group.status, payload.status, reason.clone())
        .await?
        .ok_or_else(|| AppError::conflict("Group status changed meanwhile, reload and retry"))?;

    tracing::info!(group_id = %id, from = ?group.status, to = ?updated.status, "group status changed");
    record_audit(
        &state,
        Some(admin.id),
        "group.status_changed",
        "relief_group",
        Some(id),
        json!({ "from": group.status, "to": updated.status, "reason": reason }),
    )
    .await;
    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/admin/documents/{id}/download",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses((status = 200, description = "Presigned download URL", body = DocumentDownloadResponse))
)]
pub async fn document_download_url(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let document = state
        .repo
        .get_document(id)
        .await?
        .ok_or(AppError::NotFound("Document"))?;
    let download_url = state
        .storage
        .get_presigned_download_url(&document.storage_key)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(DocumentDownloadResponse { download_url }))
}
