use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{approved_group, clean_text, record_audit};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult, FieldErrors},
    models::{
        AlertStatusUpdate, AssignRequest, CatalogKind, CreateServiceRequest, GroupStatus,
        LocationLevel, NewServiceRequest, RequestFilter, RequestStatus, RequestStatusUpdate,
        RequestTransition, ServiceRequest, TrackQuery, TrackResponse,
    },
    validation::{self, Validate},
    workflow,
};

const LOST_RACE: &str = "Request changed meanwhile, reload and retry";

async fn load_request(state: &AppState, id: Uuid) -> AppResult<ServiceRequest> {
    state
        .repo
        .get_service_request(id)
        .await?
        .ok_or(AppError::NotFound("Service request"))
}

/// Applies a guarded move, turning a lost race into 409, and audits it.
async fn apply_transition(
    state: &AppState,
    actor_id: Uuid,
    request: &ServiceRequest,
    transition: RequestTransition,
) -> AppResult<ServiceRequest> {
    let from = transition.from;
    let updated = state
        .repo
        .transition_service_request(request.id, transition)
        .await?
        .ok_or_else(|| AppError::conflict(LOST_RACE))?;
    tracing::info!(
        request_number = %updated.request_number,
        from = ?from,
        to = ?updated.status,
        "service request status changed"
    );
    record_audit(
        state,
        Some(actor_id),
        "request.status_changed",
        "service_request",
        Some(updated.id),
        json!({
            "from": from,
            "to": updated.status,
            "assigned_group_id": updated.assigned_group_id,
            "note": updated.status_note,
        }),
    )
    .await;
    Ok(updated)
}

/// submit_request
///
/// [Public Route] Files a plea for help. Works anonymously; when the caller is
/// signed in the request is linked to their account so it shows up under
/// `/me/requests`. The request number is issued from a per-day counter.
#[utoipa::path(
    post,
    path = "/requests",
    request_body = CreateServiceRequest,
    responses(
        (status = 201, description = "Submitted", body = ServiceRequest),
        (status = 400, description = "Validation failed or service unavailable")
    )
)]
pub async fn submit_request(
    user: Option<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreateServiceRequest>,
) -> AppResult<(StatusCode, Json<ServiceRequest>)> {
    payload.validate()?;
    let phone = validation::require_phone("phone", &payload.phone)?;

    let mut errors = FieldErrors::new();
    let service_active = state
        .repo
        .get_catalog_entry(CatalogKind::Services, payload.service_id)
        .await?
        .is_some_and(|s| s.is_active);
    if !service_active {
        errors.add("service_id", "is not an available service");
    }
    if let Some(id) = payload.alert_category_id {
        let active = state
            .repo
            .get_catalog_entry(CatalogKind::AlertCategories, id)
            .await?
            .is_some_and(|c| c.is_active);
        if !active {
            errors.add("alert_category_id", "is not an available alert category");
        }
    }
    if let Some(id) = payload.village_id {
        if state.repo.get_location(LocationLevel::Village, id).await?.is_none() {
            errors.add("village_id", "does not exist");
        }
    }
    errors.into_result()?;

    let citizen_id = user.as_ref().map(|u| u.id);
    let request = state
        .repo
        .create_service_request(
            NewServiceRequest {
                citizen_id,
                name: payload.name.trim().to_string(),
                phone,
                service_id: payload.service_id,
                alert_category_id: payload.alert_category_id,
                description: clean_text(payload.description),
                people_count: payload.people_count,
                village_id: payload.village_id,
                address: clean_text(payload.address),
                urgency: payload.urgency,
            },
            Utc::now().date_naive(),
        )
        .await?;

    tracing::info!(request_number = %request.request_number, urgency = ?request.urgency, "service request submitted");
    record_audit(
        &state,
        citizen_id,
        "request.submitted",
        "service_request",
        Some(request.id),
        json!({ "request_number": request.request_number }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(request)))
}

/// track_request
///
/// [Public Route] Progress of a request by its number. The phone it was filed
/// with must match; a mismatch looks exactly like an unknown number.
#[utoipa::path(
    get,
    path = "/requests/track/{number}",
    params(("number" = String, Path, description = "Request number, e.g. PFR202408030001"), TrackQuery),
    responses(
        (status = 200, description = "Progress", body = TrackResponse),
        (status = 404, description = "Unknown number or phone mismatch")
    )
)]
pub async fn track_request(
    State(state): State<AppState>,
    Path(number): Path<String>,
    Query(query): Query<TrackQuery>,
) -> AppResult<Json<TrackResponse>> {
    let number = number.trim().to_uppercase();
    if workflow::parse_request_number(&number).is_none() {
        return Err(AppError::NotFound("Service request"));
    }
    let phone = validation::normalize_phone(&query.phone);

    let request = state
        .repo
        .find_request_by_number(&number)
        .await?
        .filter(|r| phone.as_deref() == Some(r.phone.as_str()))
        .ok_or(AppError::NotFound("Service request"))?;

    let assigned_group_name = match request.assigned_group_id {
        Some(id) => state.repo.get_group(id).await?.map(|g| g.name),
        None => None,
    };
    Ok(Json(TrackResponse {
        request_number: request.request_number,
        status: request.status,
        urgency: request.urgency,
        service_id: request.service_id,
        assigned_group_name,
        status_note: request.status_note,
        created_at: request.created_at,
        updated_at: request.updated_at,
    }))
}

#[utoipa::path(
    get,
    path = "/me/requests",
    responses((status = 200, description = "Requests filed by the caller", body = [ServiceRequest]))
)]
pub async fn my_requests(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ServiceRequest>>> {
    Ok(Json(state.repo.list_citizen_requests(user.id).await?))
}

/// [Authenticated Route] A citizen withdraws their own request while nobody has
/// picked it up yet.
#[utoipa::path(
    post,
    path = "/me/requests/{id}/cancel",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Cancelled", body = ServiceRequest),
        (status = 409, description = "No longer pending")
    )
)]
pub async fn cancel_my_request(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ServiceRequest>> {
    let request = load_request(&state, id).await?;
    if request.citizen_id != Some(user.id) {
        return Err(AppError::NotFound("Service request"));
    }
    if request.status != RequestStatus::Pending {
        return Err(AppError::conflict(
            "Only pending requests can be cancelled",
        ));
    }
    let transition = RequestTransition {
        from: RequestStatus::Pending,
        to: RequestStatus::Cancelled,
        assigned_group: None,
        note: Some("Cancelled by requester".to_string()),
    };
    Ok(Json(apply_transition(&state, user.id, &request, transition).await?))
}

// --- Provider queue ---

/// provider_requests
///
/// [Provider Route] The work queue of an approved group: pending requests for
/// the services it offers, plus everything already assigned to it.
#[utoipa::path(
    get,
    path = "/me/group/requests",
    responses((status = 200, description = "Open and assigned requests", body = [ServiceRequest]))
)]
pub async fn provider_requests(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ServiceRequest>>> {
    let group = approved_group(&state, &user).await?;
    Ok(Json(
        state
            .repo
            .list_provider_requests(group.id, &group.service_ids)
            .await?,
    ))
}

/// [Provider Route] Takes a pending request on. Two groups racing for the same
/// request: the second gets 409.
#[utoipa::path(
    post,
    path = "/me/group/requests/{id}/accept",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Assigned to the caller's group", body = ServiceRequest),
        (status = 403, description = "Service not offered by the group"),
        (status = 409, description = "No longer pending")
    )
)]
pub async fn accept_request(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ServiceRequest>> {
    let group = approved_group(&state, &user).await?;
    let request = load_request(&state, id).await?;
    if !group.service_ids.contains(&request.service_id) {
        return Err(AppError::forbidden(
            "Your group does not offer this service",
        ));
    }
    workflow::ensure_transition(request.status, RequestStatus::Assigned)?;

    let transition = RequestTransition {
        from: request.status,
        to: RequestStatus::Assigned,
        assigned_group: Some(Some(group.id)),
        note: None,
    };
    Ok(Json(apply_transition(&state, user.id, &request, transition).await?))
}

/// update_progress
///
/// [Provider Route] Moves a request assigned to the caller's group forward
/// (`in_progress`, `completed`), or hands it back to the pool (`pending`).
#[utoipa::path(
    put,
    path = "/me/group/requests/{id}/status",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = RequestStatusUpdate,
    responses(
        (status = 200, description = "Updated", body = ServiceRequest),
        (status = 403, description = "Not assigned to the caller's group"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn update_progress(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequestStatusUpdate>,
) -> AppResult<Json<ServiceRequest>> {
    if !matches!(
        payload.status,
        RequestStatus::InProgress | RequestStatus::Completed | RequestStatus::Pending
    ) {
        return Err(AppError::validation(
            "status",
            "must be in_progress, completed or pending",
        ));
    }
    let group = approved_group(&state, &user).await?;
    let request = load_request(&state, id).await?;
    if request.assigned_group_id != Some(group.id) {
        return Err(AppError::forbidden(
            "This request is not assigned to your group",
        ));
    }
    workflow::ensure_transition(request.status, payload.status)?;

    let transition = RequestTransition {
        from: request.status,
        to: payload.status,
        assigned_group: (payload.status == RequestStatus::Pending).then_some(None),
        note: clean_text(payload.note),
    };
    Ok(Json(apply_transition(&state, user.id, &request, transition).await?))
}

// --- Admin ---

#[utoipa::path(
    get,
    path = "/admin/requests",
    params(RequestFilter),
    responses((status = 200, description = "Requests", body = [ServiceRequest]))
)]
pub async fn admin_list_requests(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> AppResult<Json<Vec<ServiceRequest>>> {
    Ok(Json(state.repo.list_service_requests(&filter).await?))
}

/// assign_request
///
/// [Admin Route] Assigns a pending or assigned request to an approved group, or
/// with `group_id: null` returns an assigned request to the open pool.
#[utoipa::path(
    put,
    path = "/admin/requests/{id}/assign",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Assignment changed", body = ServiceRequest),
        (status = 409, description = "Request already in progress or closed")
    )
)]
pub async fn assign_request(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<Json<ServiceRequest>> {
    let request = load_request(&state, id).await?;
    if let Some(group_id) = payload.group_id {
        let approved = state
            .repo
            .get_group(group_id)
            .await?
            .is_some_and(|g| g.status == GroupStatus::Approved);
        if !approved {
            return Err(AppError::validation("group_id", "is not an approved relief group"));
        }
    }

    let (to, assigned_group) = match (request.status, payload.group_id) {
        (RequestStatus::Pending | RequestStatus::Assigned, Some(group_id)) => {
            (RequestStatus::Assigned, Some(Some(group_id)))
        }
        (RequestStatus::Assigned, None) => (RequestStatus::Pending, Some(None)),
        (status, _) => {
            return Err(AppError::conflict(format!(
                "Cannot change the assignment of a request in status {:?}",
                status
            )));
        }
    };
    let transition = RequestTransition {
        from: request.status,
        to,
        assigned_group,
        note: None,
    };
    Ok(Json(apply_transition(&state, admin.id, &request, transition).await?))
}

/// set_request_status
///
/// [Admin Route] Free status change within the lifecycle graph. Rejection
/// needs a note, and going back to `pending` clears the assignment. Use the
/// assign endpoint to move a request into `assigned`.
#[utoipa::path(
    put,
    path = "/admin/requests/{id}/status",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = RequestStatusUpdate,
    responses(
        (status = 200, description = "Updated", body = ServiceRequest),
        (status = 409, description = "Transition not allowed or lost a race")
    )
)]
pub async fn set_request_status(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequestStatusUpdate>,
) -> AppResult<Json<ServiceRequest>> {
    if payload.status == RequestStatus::Assigned {
        return Err(AppError::validation(
            "status",
            "use the assign endpoint to assign a group",
        ));
    }
    let note = clean_text(payload.note);
    if payload.status == RequestStatus::Rejected && note.is_none() {
        return Err(AppError::validation("note", "is required when rejecting a request"));
    }
    let request = load_request(&state, id).await?;
    workflow::ensure_transition(request.status, payload.status)?;

    let transition = RequestTransition {
        from: request.status,
        to: payload.status,
        assigned_group: (payload.status == RequestStatus::Pending).then_some(None),
        note,
    };
    Ok(Json(apply_transition(&state, admin.id, &request, transition).await?))
}

/// [Admin Route] Tags a request with an alert level, or clears it with `null`.
#[utoipa::path(
    put,
    path = "/admin/requests/{id}/alert",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = AlertStatusUpdate,
    responses((status = 200, description = "Updated", body = ServiceRequest))
)]
pub async fn set_request_alert(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AlertStatusUpdate>,
) -> AppResult<Json<ServiceRequest>> {
    if let Some(alert_id) = payload.alert_status_id {
        if state
            .repo
            .get_catalog_entry(CatalogKind::AlertStatuses, alert_id)
            .await?
            .is_none()
        {
            return Err(AppError::validation("alert_status_id", "does not exist"));
        }
    }
    let updated = state
        .repo
        .set_request_alert_status(id, payload.alert_status_id)
        .await?
        .ok_or(AppError::NotFound("Service request"))?;
    record_audit(
        &state,
        Some(admin.id),
        "request.alert_changed",
        "service_request",
        Some(id),
        json!({ "alert_status_id": payload.alert_status_id }),
    )
    .await;
    Ok(Json(updated))
}
