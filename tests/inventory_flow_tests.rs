mod common;

use common::{TestApp, spawn_app};
use relief_portal::models::{
    Availability, DonationOffer, DonationStatus, InventoryEntry, InventoryItemType,
    RegisterGroupResponse, ResupplyRequest, ResupplyStatus, User, UserRole,
};
use serde_json::json;
use uuid::Uuid;

/// Admin, an approved group owned by `owner`, and one item type.
struct Stocked {
    admin: User,
    owner: String,
    rice: InventoryItemType,
}

async fn stocked_app() -> (TestApp, Stocked) {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;
    let (_, owner) = app
        .approved_group(&admin, "Helping Hands", "9812345670", "rep@hands.org", &[food.id])
        .await;

    let response = app
        .client
        .post(app.url("/admin/inventory/item-types"))
        .header("x-user-id", admin.id.to_string())
        .json(&json!({ "name": "Rice", "unit": "kg", "category": "food" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let rice: InventoryItemType = response.json().await.unwrap();

    (
        app,
        Stocked {
            admin,
            owner: owner.to_string(),
            rice,
        },
    )
}

async fn add_entry(app: &TestApp, ctx: &Stocked, quantity: i32) -> InventoryEntry {
    stock(app, &ctx.owner, ctx.rice.id, quantity).await
}

async fn stock(app: &TestApp, owner: &str, item_type_id: Uuid, quantity: i32) -> InventoryEntry {
    let response = app
        .client
        .post(app.url("/me/inventory"))
        .header("x-user-id", owner)
        .json(&json!({ "item_type_id": item_type_id, "quantity": quantity }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

async fn entry_quantity(app: &TestApp, ctx: &Stocked, id: Uuid) -> i32 {
    let entries: Vec<InventoryEntry> = app
        .client
        .get(app.url("/me/inventory"))
        .header("x-user-id", &ctx.owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    entries
        .into_iter()
        .find(|e| e.id == id)
        .map(|e| e.quantity)
        .expect("entry listed")
}

#[tokio::test]
async fn test_item_types_are_admin_managed() {
    let (app, ctx) = stocked_app().await;

    let listed: Vec<InventoryItemType> = app
        .client
        .get(app.url("/inventory/item-types"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let by_provider = app
        .client
        .post(app.url("/admin/inventory/item-types"))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "name": "Blankets", "unit": "pcs", "category": "shelter" }))
        .send()
        .await
        .unwrap();
    assert_eq!(by_provider.status(), 403);

    let duplicate = app
        .client
        .post(app.url("/admin/inventory/item-types"))
        .header("x-user-id", ctx.admin.id.to_string())
        .json(&json!({ "name": "Rice", "unit": "kg", "category": "food" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);
}

#[tokio::test]
async fn test_empty_entries_are_never_available() {
    let (app, ctx) = stocked_app().await;

    let empty = add_entry(&app, &ctx, 0).await;
    assert_eq!(empty.availability, Availability::Unavailable);
    let stocked = add_entry(&app, &ctx, 40).await;
    assert_eq!(stocked.availability, Availability::Available);

    let public: Vec<InventoryEntry> = app
        .client
        .get(app.url(&format!("/inventory?item_type_id={}", ctx.rice.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].id, stocked.id);

    // Drawing stock down to zero closes the entry.
    let drained: InventoryEntry = app
        .client
        .put(app.url(&format!("/me/inventory/{}", stocked.id)))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "quantity": 0 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(drained.availability, Availability::Unavailable);
}

#[tokio::test]
async fn test_negative_stock_is_rejected() {
    let (app, ctx) = stocked_app().await;
    let response = app
        .client
        .post(app.url("/me/inventory"))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "item_type_id": ctx.rice.id, "quantity": -5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_pending_groups_cannot_hold_stock() {
    let (app, ctx) = stocked_app().await;
    let food = app.create_catalog_entry(&ctx.admin, "services", "Water").await;
    let pending = app
        .register_group("Late Comers", "9812345671", "late@hands.org", &[food.id])
        .await;

    let response = app
        .client
        .post(app.url("/me/inventory"))
        .header("x-user-id", pending.representative.id.to_string())
        .json(&json!({ "item_type_id": ctx.rice.id, "quantity": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_resupply_fulfilment_adds_stock() {
    let (app, ctx) = stocked_app().await;
    let entry = add_entry(&app, &ctx, 10).await;

    let response = app
        .client
        .post(app.url(&format!("/me/inventory/{}/resupply", entry.id)))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "quantity": 25, "note": "Camp grew overnight" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let request: ResupplyRequest = response.json().await.unwrap();
    assert_eq!(request.status, ResupplyStatus::Pending);

    let decide = |status: &'static str| {
        app.client
            .put(app.url(&format!("/admin/resupply/{}/status", request.id)))
            .header("x-user-id", ctx.admin.id.to_string())
            .json(&json!({ "status": status }))
            .send()
    };

    // Fulfilment needs approval first.
    assert_eq!(decide("fulfilled").await.unwrap().status(), 409);

    let approved: ResupplyRequest = decide("approved").await.unwrap().json().await.unwrap();
    assert_eq!(approved.status, ResupplyStatus::Approved);
    assert_eq!(approved.decided_by, Some(ctx.admin.id));
    assert_eq!(entry_quantity(&app, &ctx, entry.id).await, 10);

    let fulfilled: ResupplyRequest = decide("fulfilled").await.unwrap().json().await.unwrap();
    assert_eq!(fulfilled.status, ResupplyStatus::Fulfilled);
    assert_eq!(entry_quantity(&app, &ctx, entry.id).await, 35);

    // Terminal.
    assert_eq!(decide("approved").await.unwrap().status(), 409);
}

#[tokio::test]
async fn test_provider_can_cancel_pending_resupply() {
    let (app, ctx) = stocked_app().await;
    let entry = add_entry(&app, &ctx, 10).await;
    let request: ResupplyRequest = app
        .client
        .post(app.url(&format!("/me/inventory/{}/resupply", entry.id)))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "quantity": 5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let cancelled: ResupplyRequest = app
        .client
        .post(app.url(&format!("/me/resupply/{}/cancel", request.id)))
        .header("x-user-id", &ctx.owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cancelled.status, ResupplyStatus::Cancelled);

    let pending: Vec<ResupplyRequest> = app
        .client
        .get(app.url("/admin/resupply?status=pending"))
        .header("x-user-id", ctx.admin.id.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_donation_receipt_adds_stock() {
    let (app, ctx) = stocked_app().await;
    let entry = add_entry(&app, &ctx, 10).await;
    let donor = app
        .create_user(UserRole::Citizen, "donor@example.org", "+919876543210")
        .await;

    let response = app
        .client
        .post(app.url(&format!("/inventory/{}/donations", entry.id)))
        .header("x-user-id", donor.id.to_string())
        .json(&json!({ "quantity": 15, "contact_phone": "9876543210" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let offer: DonationOffer = response.json().await.unwrap();
    assert_eq!(offer.group_id, entry.group_id);
    assert_eq!(offer.contact_phone, "+919876543210");

    let mine: Vec<DonationOffer> = app
        .client
        .get(app.url("/me/donations"))
        .header("x-user-id", donor.id.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    let incoming: Vec<DonationOffer> = app
        .client
        .get(app.url("/me/group/donations?status=pending"))
        .header("x-user-id", &ctx.owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);

    for status in ["accepted", "received"] {
        let response = app
            .client
            .put(app.url(&format!("/me/group/donations/{}/status", offer.id)))
            .header("x-user-id", &ctx.owner)
            .json(&json!({ "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    assert_eq!(entry_quantity(&app, &ctx, entry.id).await, 25);

    // A received offer can no longer be withdrawn.
    let cancel = app
        .client
        .post(app.url(&format!("/me/donations/{}/cancel", offer.id)))
        .header("x-user-id", donor.id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(cancel.status(), 409);
}

#[tokio::test]
async fn test_only_the_donor_cancels_an_offer() {
    let (app, ctx) = stocked_app().await;
    let entry = add_entry(&app, &ctx, 10).await;
    let donor = app
        .create_user(UserRole::Citizen, "donor@example.org", "+919876543210")
        .await;
    let stranger = app
        .create_user(UserRole::Citizen, "stranger@example.org", "+919876543211")
        .await;
    let offer: DonationOffer = app
        .client
        .post(app.url(&format!("/inventory/{}/donations", entry.id)))
        .header("x-user-id", donor.id.to_string())
        .json(&json!({ "quantity": 3, "contact_phone": "9876543210" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let cancel_url = app.url(&format!("/me/donations/{}/cancel", offer.id));
    let by_stranger = app
        .client
        .post(&cancel_url)
        .header("x-user-id", stranger.id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(by_stranger.status(), 404);

    let by_donor: DonationOffer = app
        .client
        .post(&cancel_url)
        .header("x-user-id", donor.id.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_donor.status, DonationStatus::Cancelled);
    assert_eq!(entry_quantity(&app, &ctx, entry.id).await, 10);
}

#[tokio::test]
async fn test_other_groups_cannot_touch_an_entry() {
    let (app, ctx) = stocked_app().await;
    let entry = add_entry(&app, &ctx, 10).await;
    let water = app.create_catalog_entry(&ctx.admin, "services", "Water").await;
    let (_, rival) = app
        .approved_group(&ctx.admin, "Rival Relief", "9812345672", "rival@relief.org", &[water.id])
        .await;

    let response = app
        .client
        .put(app.url(&format!("/me/inventory/{}", entry.id)))
        .header("x-user-id", rival.to_string())
        .json(&json!({ "quantity": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(entry_quantity(&app, &ctx, entry.id).await, 10);
}

#[tokio::test]
async fn test_entry_details_can_be_cleared() {
    let (app, ctx) = stocked_app().await;
    let response = app
        .client
        .post(app.url("/me/inventory"))
        .header("x-user-id", &ctx.owner)
        .json(&json!({
            "item_type_id": ctx.rice.id,
            "quantity": 20,
            "expiry_date": "2027-03-31",
            "notes": "Stored at the panchayat hall",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let entry: InventoryEntry = response.json().await.unwrap();

    // Omitted keys keep what is stored.
    let kept: InventoryEntry = app
        .client
        .put(app.url(&format!("/me/inventory/{}", entry.id)))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "quantity": 18 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(kept.quantity, 18);
    assert!(kept.expiry_date.is_some());
    assert_eq!(kept.notes.as_deref(), Some("Stored at the panchayat hall"));

    // An explicit null clears.
    let response = app
        .client
        .put(app.url(&format!("/me/inventory/{}", entry.id)))
        .header("x-user-id", &ctx.owner)
        .json(&json!({ "expiry_date": null, "notes": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cleared: InventoryEntry = response.json().await.unwrap();
    assert_eq!(cleared.quantity, 18);
    assert!(cleared.expiry_date.is_none());
    assert!(cleared.notes.is_none());
}

/// Registers and approves a group placed in `region` (state, district); returns
/// (group id, owner id).
async fn approved_group_in(
    app: &TestApp,
    admin: &User,
    name: &str,
    phone: &str,
    email: &str,
    service: Uuid,
    region: (Uuid, Uuid),
) -> (Uuid, String) {
    let (state_id, district_id) = region;
    app.verify_phone(phone).await;
    let mut payload = app.group_payload(name, phone, email, &[service]);
    payload["group"]["state_id"] = json!(state_id);
    payload["group"]["district_id"] = json!(district_id);

    let response = app
        .client
        .post(app.url("/groups/register"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let registered: RegisterGroupResponse = response.json().await.unwrap();
    app.approve_group(admin, registered.group.id).await;
    (registered.group.id, registered.representative.id.to_string())
}

async fn search(app: &TestApp, query: &str) -> Vec<Uuid> {
    let response = app
        .client
        .get(app.url(&format!("/inventory{}", query)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let entries: Vec<InventoryEntry> = response.json().await.unwrap();
    let mut ids: Vec<Uuid> = entries.into_iter().map(|e| e.id).collect();
    ids.sort();
    ids
}

fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_public_search_filters_by_region_and_group_standing() {
    let (app, ctx) = stocked_app().await;
    let admin = &ctx.admin;
    let food = app.create_catalog_entry(admin, "services", "Dry rations").await;

    let kerala = app.create_location(admin, "states", "Kerala", None).await;
    let wayanad = app
        .create_location(admin, "districts", "Wayanad", Some(kerala.id))
        .await;
    let idukki = app
        .create_location(admin, "districts", "Idukki", Some(kerala.id))
        .await;
    let tamil_nadu = app.create_location(admin, "states", "Tamil Nadu", None).await;
    let nilgiris = app
        .create_location(admin, "districts", "Nilgiris", Some(tamil_nadu.id))
        .await;

    let (_, wayanad_owner) = approved_group_in(
        &app,
        admin,
        "Wayanad Relief",
        "9812345671",
        "rep@wayanad.org",
        food.id,
        (kerala.id, wayanad.id),
    )
    .await;
    let (_, nilgiris_owner) = approved_group_in(
        &app,
        admin,
        "Nilgiris Aid",
        "9812345672",
        "rep@nilgiris.org",
        food.id,
        (tamil_nadu.id, nilgiris.id),
    )
    .await;
    let (idukki_group, idukki_owner) = approved_group_in(
        &app,
        admin,
        "Idukki Helpers",
        "9812345673",
        "rep@idukki.org",
        food.id,
        (kerala.id, idukki.id),
    )
    .await;

    let unplaced = add_entry(&app, &ctx, 10).await;
    let in_wayanad = stock(&app, &wayanad_owner, ctx.rice.id, 25).await;
    let in_nilgiris = stock(&app, &nilgiris_owner, ctx.rice.id, 30).await;
    let in_idukki = stock(&app, &idukki_owner, ctx.rice.id, 15).await;

    assert_eq!(
        search(&app, "").await,
        sorted(vec![unplaced.id, in_wayanad.id, in_nilgiris.id, in_idukki.id])
    );
    assert_eq!(
        search(&app, &format!("?district_id={}", wayanad.id)).await,
        vec![in_wayanad.id]
    );
    assert_eq!(
        search(&app, &format!("?state_id={}", kerala.id)).await,
        sorted(vec![in_wayanad.id, in_idukki.id])
    );
    assert_eq!(
        search(&app, &format!("?state_id={}", tamil_nadu.id)).await,
        vec![in_nilgiris.id]
    );
    assert!(
        search(&app, &format!("?state_id={}&district_id={}", kerala.id, nilgiris.id))
            .await
            .is_empty()
    );

    // A suspended group's stock leaves the public search.
    let response = app
        .client
        .put(app.url(&format!("/admin/groups/{}/status", idukki_group)))
        .header("x-user-id", admin.id.to_string())
        .json(&json!({ "status": "suspended", "reason": "Stock audit pending" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert!(search(&app, &format!("?district_id={}", idukki.id)).await.is_empty());
    assert_eq!(
        search(&app, &format!("?state_id={}", kerala.id)).await,
        vec![in_wayanad.id]
    );
    assert_eq!(
        search(&app, &format!("?item_type_id={}", ctx.rice.id)).await,
        sorted(vec![unplaced.id, in_wayanad.id, in_nilgiris.id])
    );
}
