use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;
use uuid::Uuid;

use super::{approved_group, clean_text, owned_group, record_audit};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        Availability, CreateDonationOffer, CreateInventoryEntryRequest, CreateResupplyRequest,
        DonationFilter, DonationOffer, DonationStatus, DonationStatusUpdate, GroupStatus,
        InventoryEntry, InventoryFilter, InventoryItemType, ItemTypePayload, LocationLevel,
        NewDonation, NewInventoryEntry, NewResupply, ReliefGroup, ResupplyFilter,
        ResupplyRequest, ResupplyStatus, ResupplyStatusUpdate, StockChange,
        UpdateInventoryEntryRequest, UpdateItemTypePayload,
    },
    repository::EntryUpdate,
    validation::{self, Validate},
    workflow,
};

// --- Item types ---

#[utoipa::path(
    get,
    path = "/inventory/item-types",
    responses((status = 200, description = "Item types", body = [InventoryItemType]))
)]
pub async fn list_item_types(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<InventoryItemType>>> {
    Ok(Json(state.repo.list_item_types().await?))
}

#[utoipa::path(
    post,
    path = "/admin/inventory/item-types",
    request_body = ItemTypePayload,
    responses(
        (status = 201, description = "Created", body = InventoryItemType),
        (status = 409, description = "Name taken")
    )
)]
pub async fn create_item_type(
    admin: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ItemTypePayload>,
) -> AppResult<(StatusCode, Json<InventoryItemType>)> {
    payload.validate()?;
    let item_type = state
        .repo
        .create_item_type(ItemTypePayload {
            name: payload.name.trim().to_string(),
            unit: payload.unit.trim().to_string(),
            category: payload.category.trim().to_lowercase(),
            description: clean_text(payload.description),
        })
        .await?;
    record_audit(
        &state,
        Some(admin.id),
        "item_type.created",
        "inventory_item_type",
        Some(item_type.id),
        json!({ "name": item_type.name }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(item_type)))
}

#[utoipa::path(
    put,
    path = "/admin/inventory/item-types/{id}",
    params(("id" = Uuid, Path, description = "Item type ID")),
    request_body = UpdateItemTypePayload,
    responses((status = 200, description = "Updated", body = InventoryItemType))
)]
pub async fn update_item_type(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateItemTypePayload>,
) -> AppResult<Json<InventoryItemType>> {
    payload.validate()?;
    payload.name = payload.name.map(|v| v.trim().to_string());
    payload.unit = payload.unit.map(|v| v.trim().to_string());
    payload.category = payload.category.map(|v| v.trim().to_lowercase());

    let item_type = state
        .repo
        .update_item_type(id, payload)
        .await?
        .ok_or(AppError::NotFound("Item type"))?;
    record_audit(
        &state,
        Some(admin.id),
        "item_type.updated",
        "inventory_item_type",
        Some(id),
        json!({}),
    )
    .await;
    Ok(Json(item_type))
}

#[utoipa::path(
    delete,
    path = "/admin/inventory/item-types/{id}",
    params(("id" = Uuid, Path, description = "Item type ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Still held in inventory")
    )
)]
pub async fn delete_item_type(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_item_type(id).await? {
        return Err(AppError::NotFound("Item type"));
    }
    record_audit(
        &state,
        Some(admin.id),
        "item_type.deleted",
        "inventory_item_type",
        Some(id),
        json!({}),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

// --- Entries ---

/// search_inventory
///
/// [Public Route] Stock on offer: available, non-empty entries of approved groups,
/// narrowed by item type and the holding group's state or district.
#[utoipa::path(
    get,
    path = "/inventory",
    params(InventoryFilter),
    responses((status = 200, description = "Matching entries", body = [InventoryEntry]))
)]
pub async fn search_inventory(
    State(state): State<AppState>,
    Query(filter): Query<InventoryFilter>,
) -> AppResult<Json<Vec<InventoryEntry>>> {
    Ok(Json(state.repo.search_inventory(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/me/inventory",
    responses((status = 200, description = "Own entries", body = [InventoryEntry]))
)]
pub async fn my_inventory(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<InventoryEntry>>> {
    let group = owned_group(&state, &user).await?;
    Ok(Json(state.repo.list_group_inventory(group.id).await?))
}

async fn check_village(state: &AppState, village_id: Option<Uuid>) -> AppResult<()> {
    if let Some(id) = village_id {
        if state.repo.get_location(LocationLevel::Village, id).await?.is_none() {
            return Err(AppError::validation("village_id", "does not exist"));
        }
    }
    Ok(())
}

/// The entry, provided it belongs to `group`.
async fn group_entry(state: &AppState, group: &ReliefGroup, id: Uuid) -> AppResult<InventoryEntry> {
    let entry = state
        .repo
        .get_inventory_entry(id)
        .await?
        .ok_or(AppError::NotFound("Inventory entry"))?;
    if entry.group_id != group.id {
        return Err(AppError::forbidden("This entry belongs to another group"));
    }
    Ok(entry)
}

/// create_entry
///
/// [Provider Route] Adds stock to an approved group's inventory. An entry
/// created empty is never advertised as available.
#[utoipa::path(
    post,
    path = "/me/inventory",
    request_body = CreateInventoryEntryRequest,
    responses((status = 201, description = "Created", body = InventoryEntry))
)]
pub async fn create_entry(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateInventoryEntryRequest>,
) -> AppResult<(StatusCode, Json<InventoryEntry>)> {
    payload.validate()?;
    let group = approved_group(&state, &user).await?;
    if state.repo.get_item_type(payload.item_type_id).await?.is_none() {
        return Err(AppError::validation("item_type_id", "does not exist"));
    }
    check_village(&state, payload.village_id).await?;

    let availability = if payload.quantity == 0 {
        Availability::Unavailable
    } else {
        payload.availability.unwrap_or_default()
    };
    let entry = state
        .repo
        .create_inventory_entry(NewInventoryEntry {
            group_id: group.id,
            item_type_id: payload.item_type_id,
            quantity: payload.quantity,
            availability,
            condition: payload.condition,
            expiry_date: payload.expiry_date,
            village_id: payload.village_id,
            notes: clean_text(payload.notes),
        })
        .await?;
    record_audit(
        &state,
        Some(user.id),
        "inventory.created",
        "inventory_entry",
        Some(entry.id),
        json!({ "group_id": group.id, "quantity": entry.quantity }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// update_entry
///
/// [Provider Route] Partial update; an explicit `null` clears `expiry_date`,
/// `village_id` or `notes`. The write is conditioned on the quantity
/// read here, so it cannot silently overwrite stock that a fulfilled resupply or
/// received donation changed in between; that case answers 409.
#[utoipa::path(
    put,
    path = "/me/inventory/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    request_body = UpdateInventoryEntryRequest,
    responses(
        (status = 200, description = "Updated", body = InventoryEntry),
        (status = 409, description = "Stock changed concurrently")
    )
)]
pub async fn update_entry(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInventoryEntryRequest>,
) -> AppResult<Json<InventoryEntry>> {
    payload.validate()?;
    let group = approved_group(&state, &user).await?;
    let entry = group_entry(&state, &group, id).await?;
    check_village(&state, payload.village_id.flatten()).await?;

    let quantity = payload.quantity.unwrap_or(entry.quantity);
    let availability = match payload.availability {
        Some(_) if quantity == 0 => Availability::Unavailable,
        Some(requested) => requested,
        None => workflow::availability_after(entry.availability, entry.quantity, quantity),
    };
    let update = EntryUpdate {
        quantity,
        availability,
        condition: payload.condition.unwrap_or(entry.condition),
        expiry_date: payload.expiry_date.unwrap_or(entry.expiry_date),
        village_id: payload.village_id.unwrap_or(entry.village_id),
        notes: match payload.notes {
            Some(notes) => clean_text(notes),
            None => entry.notes,
        },
    };

    let updated = state
        .repo
        .update_inventory_entry(id, entry.quantity, update)
        .await?
        .ok_or_else(|| AppError::conflict("Stock changed meanwhile, reload and retry"))?;
    record_audit(
        &state,
        Some(user.id),
        "inventory.updated",
        "inventory_entry",
        Some(id),
        json!({ "from_quantity": entry.quantity, "to_quantity": updated.quantity }),
    )
    .await;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/me/inventory/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Referenced by resupply requests or donations")
    )
)]
pub async fn delete_entry(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let group = owned_group(&state, &user).await?;
    group_entry(&state, &group, id).await?;
    if !state.repo.delete_inventory_entry(id).await? {
        return Err(AppError::NotFound("Inventory entry"));
    }
    record_audit(&state, Some(user.id), "inventory.deleted", "inventory_entry", Some(id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

// --- Resupply requests ---

#[utoipa::path(
    post,
    path = "/me/inventory/{id}/resupply",
    params(("id" = Uuid, Path, description = "Entry ID")),
    request_body = CreateResupplyRequest,
    responses((status = 201, description = "Requested", body = ResupplyRequest))
)]
pub async fn request_resupply(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateResupplyRequest>,
) -> AppResult<(StatusCode, Json<ResupplyRequest>)> {
    payload.validate()?;
    let group = approved_group(&state, &user).await?;
    let entry = group_entry(&state, &group, id).await?;

    let request = state
        .repo
        .create_resupply(NewResupply {
            inventory_entry_id: entry.id,
            group_id: group.id,
            requested_by: user.id,
            quantity: payload.quantity,
            note: clean_text(payload.note),
        })
        .await?;
    record_audit(
        &state,
        Some(user.id),
        "resupply.requested",
        "resupply_request",
        Some(request.id),
        json!({ "entry_id": entry.id, "quantity": request.quantity }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/me/resupply",
    responses((status = 200, description = "Own group's resupply requests", body = [ResupplyRequest]))
)]
pub async fn my_resupply(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ResupplyRequest>>> {
    let group = owned_group(&state, &user).await?;
    let filter = ResupplyFilter {
        status: None,
        group_id: Some(group.id),
    };
    Ok(Json(state.repo.list_resupply(&filter).await?))
}

/// [Provider Route] Withdraws a request that is still pending or approved.
#[utoipa::path(
    post,
    path = "/me/resupply/{id}/cancel",
    params(("id" = Uuid, Path, description = "Resupply request ID")),
    responses(
        (status = 200, description = "Cancelled", body = ResupplyRequest),
        (status = 409, description = "Already decided or fulfilled")
    )
)]
pub async fn cancel_resupply(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ResupplyRequest>> {
    let group = owned_group(&state, &user).await?;
    let request = state
        .repo
        .get_resupply(id)
        .await?
        .filter(|r| r.group_id == group.id)
        .ok_or(AppError::NotFound("Resupply request"))?;
    workflow::ensure_transition(request.status, ResupplyStatus::Cancelled)?;

    let updated = state
        .repo
        .transition_resupply(id, request.status, ResupplyStatus::Cancelled, None, None, None)
        .await?
        .ok_or_else(|| AppError::conflict("Resupply request changed meanwhile, reload and retry"))?;
    record_audit(
        &state,
        Some(user.id),
        "resupply.cancelled",
        "resupply_request",
        Some(id),
        json!({ "from": request.status }),
    )
    .await;
    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/admin/resupply",
    params(ResupplyFilter),
    responses((status = 200, description = "Resupply requests", body = [ResupplyRequest]))
)]
pub async fn admin_list_resupply(
    State(state): State<AppState>,
    Query(filter): Query<ResupplyFilter>,
) -> AppResult<Json<Vec<ResupplyRequest>>> {
    Ok(Json(state.repo.list_resupply(&filter).await?))
}

/// decide_resupply
///
/// [Admin Route] Approves, rejects or fulfils a resupply request. Fulfilment adds
/// the requested quantity to the entry in the same transaction as the status
/// change; if the result would exceed the stock ceiling neither is written.
#[utoipa::path(
    put,
    path = "/admin/resupply/{id}/status",
    params(("id" = Uuid, Path, description = "Resupply request ID")),
    request_body = ResupplyStatusUpdate,
    responses(
        (status = 200, description = "Updated", body = ResupplyRequest),
        (status = 409, description = "Transition not allowed, lost a race, or stock out of range")
    )
)]
pub async fn decide_resupply(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResupplyStatusUpdate>,
) -> AppResult<Json<ResupplyRequest>> {
    if !matches!(
        payload.status,
        ResupplyStatus::Approved | ResupplyStatus::Rejected | ResupplyStatus::Fulfilled
    ) {
        return Err(AppError::validation(
            "status",
            "must be approved, rejected or fulfilled",
        ));
    }
    let request = state
        .repo
        .get_resupply(id)
        .await?
        .ok_or(AppError::NotFound("Resupply request"))?;
    workflow::ensure_transition(request.status, payload.status)?;

    let stock = workflow::resupply_stock_delta(payload.status, request.quantity).map(|delta| {
        StockChange {
            entry_id: request.inventory_entry_id,
            delta,
        }
    });
    let updated = state
        .repo
        .transition_resupply(
            id,
            request.status,
            payload.status,
            Some(admin.id),
            clean_text(payload.note),
            stock,
        )
        .await?
        .ok_or_else(|| AppError::conflict("Resupply request changed meanwhile, reload and retry"))?;

    tracing::info!(resupply_id = %id, from = ?request.status, to = ?updated.status, "resupply decided");
    record_audit(
        &state,
        Some(admin.id),
        "resupply.status_changed",
        "resupply_request",
        Some(id),
        json!({
            "from": request.status,
            "to": updated.status,
            "stock_delta": stock.map(|s| s.delta),
        }),
    )
    .await;
    Ok(Json(updated))
}

// --- Donation offers ---

/// offer_donation
///
/// [Authenticated Route] Anyone signed in may offer stock towards an entry held
/// by an approved group.
#[utoipa::path(
    post,
    path = "/inventory/{id}/donations",
    params(("id" = Uuid, Path, description = "Entry ID")),
    request_body = CreateDonationOffer,
    responses((status = 201, description = "Offered", body = DonationOffer))
)]
pub async fn offer_donation(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateDonationOffer>,
) -> AppResult<(StatusCode, Json<DonationOffer>)> {
    payload.validate()?;
    let contact_phone = validation::require_phone("contact_phone", &payload.contact_phone)?;
    let entry = state
        .repo
        .get_inventory_entry(id)
        .await?
        .ok_or(AppError::NotFound("Inventory entry"))?;
    let group_approved = state
        .repo
        .get_group(entry.group_id)
        .await?
        .is_some_and(|g| g.status == GroupStatus::Approved);
    if !group_approved {
        return Err(AppError::NotFound("Inventory entry"));
    }

    let offer = state
        .repo
        .create_donation(NewDonation {
            inventory_entry_id: entry.id,
            group_id: entry.group_id,
            donor_id: user.id,
            contact_phone,
            quantity: payload.quantity,
            note: clean_text(payload.note),
        })
        .await?;
    record_audit(
        &state,
        Some(user.id),
        "donation.offered",
        "donation_offer",
        Some(offer.id),
        json!({ "entry_id": entry.id, "quantity": offer.quantity }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(offer)))
}

#[utoipa::path(
    get,
    path = "/me/donations",
    responses((status = 200, description = "Offers made by the caller", body = [DonationOffer]))
)]
pub async fn my_donations(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<DonationOffer>>> {
    Ok(Json(state.repo.list_donations(None, Some(user.id), None).await?))
}

/// [Authenticated Route] The donor withdraws an offer not yet received.
#[utoipa::path(
    post,
    path = "/me/donations/{id}/cancel",
    params(("id" = Uuid, Path, description = "Donation offer ID")),
    responses(
        (status = 200, description = "Cancelled", body = DonationOffer),
        (status = 409, description = "Already decided or received")
    )
)]
pub async fn cancel_donation(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DonationOffer>> {
    let offer = state
        .repo
        .get_donation(id)
        .await?
        .filter(|d| d.donor_id == user.id)
        .ok_or(AppError::NotFound("Donation offer"))?;
    workflow::ensure_transition(offer.status, DonationStatus::Cancelled)?;

    let updated = state
        .repo
        .transition_donation(id, offer.status, DonationStatus::Cancelled, None)
        .await?
        .ok_or_else(|| AppError::conflict("Donation offer changed meanwhile, reload and retry"))?;
    record_audit(
        &state,
        Some(user.id),
        "donation.cancelled",
        "donation_offer",
        Some(id),
        json!({ "from": offer.status }),
    )
    .await;
    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/me/group/donations",
    params(DonationFilter),
    responses((status = 200, description = "Offers made to the caller's group", body = [DonationOffer]))
)]
pub async fn group_donations(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<DonationFilter>,
) -> AppResult<Json<Vec<DonationOffer>>> {
    let group = owned_group(&state, &user).await?;
    Ok(Json(
        state
            .repo
            .list_donations(Some(group.id), None, filter.status)
            .await?,
    ))
}

/// decide_donation
///
/// [Provider Route] The receiving group accepts, rejects or confirms receipt of
/// an offer. Receipt adds the quantity to the entry atomically with the status
/// change.
#[utoipa::path(
    put,
    path = "/me/group/donations/{id}/status",
    params(("id" = Uuid, Path, description = "Donation offer ID")),
    request_body = DonationStatusUpdate,
    responses(
        (status = 200, description = "Updated", body = DonationOffer),
        (status = 409, description = "Transition not allowed, lost a race, or stock out of range")
    )
)]
pub async fn decide_donation(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DonationStatusUpdate>,
) -> AppResult<Json<DonationOffer>> {
    if !matches!(
        payload.status,
        DonationStatus::Accepted | DonationStatus::Rejected | DonationStatus::Received
    ) {
        return Err(AppError::validation(
            "status",
            "must be accepted, rejected or received",
        ));
    }
    let group = approved_group(&state, &user).await?;
    let offer = state
        .repo
        .get_donation(id)
        .await?
        .filter(|d| d.group_id == group.id)
        .ok_or(AppError::NotFound("Donation offer"))?;
    workflow::ensure_transition(offer.status, payload.status)?;

    let stock = workflow::donation_stock_delta(payload.status, offer.quantity).map(|delta| {
        StockChange {
            entry_id: offer.inventory_entry_id,
            delta,
        }
    });
    let updated = state
        .repo
        .transition_donation(id, offer.status, payload.status, stock)
        .await?
        .ok_or_else(|| AppError::conflict("Donation offer changed meanwhile, reload and retry"))?;

    record_audit(
        &state,
        Some(user.id),
        "donation.status_changed",
        "donation_offer",
        Some(id),
        json!({
            "from": offer.status,
            "to": updated.status,
            "stock_delta": stock.map(|s| s.delta),
        }),
    )
    .await;
    Ok(Json(updated))
}
