use relief_portal::{
    error::AppError,
    models::{
        AuditFilter, CatalogKind, CatalogPayload, CreateDonationOffer, CreateInventoryEntryRequest, CreateLocationRequest,
        CreateResupplyRequest, CreateServiceRequest, GroupDetailsPayload, GroupKind,
        LocationLevel, RegisterGroupRequest, RepresentativePayload, RequestStatus,
        UpdateGroupRequest, UpdateInventoryEntryRequest, Urgency,
    },
    validation::Validate,
};
use uuid::Uuid;

/// Field names reported by a validation failure.
fn failed_fields(result: Result<(), AppError>) -> Vec<String> {
    match result {
        Err(AppError::Validation(fields)) => {
            let value = serde_json::to_value(&fields).unwrap();
            value.as_object().unwrap().keys().cloned().collect()
        }
        Err(other) => panic!("expected a validation error, got {:?}", other),
        Ok(()) => vec![],
    }
}

fn service_request() -> CreateServiceRequest {
    CreateServiceRequest {
        name: "Lakshmi".to_string(),
        phone: "9876543210".to_string(),
        service_id: Uuid::new_v4(),
        alert_category_id: None,
        description: None,
        people_count: 4,
        village_id: Some(Uuid::new_v4()),
        address: None,
        urgency: Urgency::Critical,
    }
}

fn group_request() -> RegisterGroupRequest {
    RegisterGroupRequest {
        group: GroupDetailsPayload {
            name: "Helping Hands".to_string(),
            kind: GroupKind::Organization,
            description: None,
            contact_phone: "9812345670".to_string(),
            contact_email: Some(String::new()),
            address: None,
            state_id: None,
            district_id: None,
            service_ids: vec![Uuid::new_v4()],
        },
        representative: RepresentativePayload {
            name: "Ravi".to_string(),
            phone: "9812345670".to_string(),
            email: "ravi@hands.org".to_string(),
            designation: None,
            password: "relief-pass-2024".to_string(),
        },
    }
}

#[test]
fn test_service_request_needs_a_place() {
    assert!(service_request().validate().is_ok());

    let mut nowhere = service_request();
    nowhere.village_id = None;
    nowhere.address = Some("   ".to_string());
    assert_eq!(failed_fields(nowhere.validate()), vec!["address"]);

    let mut address_only = service_request();
    address_only.village_id = None;
    address_only.address = Some("Relief camp, GHSS Meppadi".to_string());
    assert!(address_only.validate().is_ok());
}

#[test]
fn test_service_request_people_count_bounds() {
    for count in [0, -3, 10_001] {
        let mut request = service_request();
        request.people_count = count;
        assert_eq!(failed_fields(request.validate()), vec!["people_count"]);
    }
}

#[test]
fn test_service_request_payload_defaults() {
    let request: CreateServiceRequest = serde_json::from_value(serde_json::json!({
        "name": "Lakshmi",
        "phone": "9876543210",
        "service_id": Uuid::new_v4(),
        "address": "Near the temple",
    }))
    .unwrap();
    assert_eq!(request.people_count, 1);
    assert_eq!(request.urgency, Urgency::Medium);
}

#[test]
fn test_status_enums_use_snake_case() {
    assert_eq!(
        serde_json::to_value(RequestStatus::InProgress).unwrap(),
        "in_progress"
    );
    let level: LocationLevel = serde_json::from_value(serde_json::json!("villages")).unwrap();
    assert_eq!(level, LocationLevel::Village);
}

#[test]
fn test_group_registration_collects_every_problem() {
    assert!(group_request().validate().is_ok());

    let mut broken = group_request();
    broken.group.name = String::new();
    broken.group.service_ids.clear();
    broken.group.district_id = Some(Uuid::new_v4());
    broken.representative.password = "password".to_string();
    broken.representative.email = "ravi-at-hands".to_string();

    let fields = failed_fields(broken.validate());
    for expected in [
        "group.name",
        "group.service_ids",
        "group.state_id",
        "representative.password",
        "representative.email",
    ] {
        assert!(fields.contains(&expected.to_string()), "{} missing from {:?}", expected, fields);
    }
}

#[test]
fn test_group_update_cannot_drop_all_services() {
    let update = UpdateGroupRequest {
        service_ids: Some(vec![]),
        ..Default::default()
    };
    assert_eq!(failed_fields(update.validate()), vec!["service_ids"]);
    assert!(UpdateGroupRequest::default().validate().is_ok());
}

#[test]
fn test_location_parent_rules() {
    let state = CreateLocationRequest {
        name: "Kerala".to_string(),
        code: Some("KL".to_string()),
        parent_id: None,
    };
    assert!(state.validate_for(LocationLevel::State).is_ok());
    assert_eq!(
        failed_fields(state.validate_for(LocationLevel::District)),
        vec!["parent_id"]
    );

    let village = CreateLocationRequest {
        name: "Chooralmala".to_string(),
        code: None,
        parent_id: Some(Uuid::new_v4()),
    };
    assert!(village.validate_for(LocationLevel::Village).is_ok());
    assert_eq!(
        failed_fields(village.validate_for(LocationLevel::State)),
        vec!["parent_id"]
    );
}

#[test]
fn test_quantities() {
    let zero_stock = CreateInventoryEntryRequest {
        item_type_id: Uuid::new_v4(),
        quantity: 0,
        availability: None,
        condition: Default::default(),
        expiry_date: None,
        village_id: None,
        notes: None,
    };
    assert!(zero_stock.validate().is_ok());

    let zero_resupply = CreateResupplyRequest {
        quantity: 0,
        note: None,
    };
    assert_eq!(failed_fields(zero_resupply.validate()), vec!["quantity"]);

    let huge_donation = CreateDonationOffer {
        quantity: 2_000_000,
        contact_phone: "9876543210".to_string(),
        note: None,
    };
    assert_eq!(failed_fields(huge_donation.validate()), vec!["quantity"]);
}

#[test]
fn test_catalog_payload() {
    let payload: CatalogPayload =
        serde_json::from_value(serde_json::json!({ "name": "Shelter" })).unwrap();
    assert!(payload.is_active);
    assert!(payload.validate().is_ok());

    let blank = CatalogPayload {
        name: "  ".to_string(),
        description: None,
        is_active: true,
    };
    assert_eq!(failed_fields(blank.validate()), vec!["name"]);
}

#[test]
fn test_catalog_kinds_are_path_segments() {
    let kind: CatalogKind = serde_json::from_value(serde_json::json!("alert-statuses")).unwrap();
    assert_eq!(kind, CatalogKind::AlertStatuses);
    assert_eq!(kind.table(), "alert_statuses");
    assert!(serde_json::from_value::<CatalogKind>(serde_json::json!("weather")).is_err());
}

#[test]
fn test_audit_limit_is_clamped() {
    assert_eq!(AuditFilter::default().effective_limit(), 100);
    let huge = AuditFilter {
        limit: Some(10_000),
        ..Default::default()
    };
    assert_eq!(huge.effective_limit(), 500);
    let negative = AuditFilter {
        limit: Some(-5),
        ..Default::default()
    };
    assert_eq!(negative.effective_limit(), 1);
}

#[test]
fn test_entry_patch_tells_null_from_absent() {
    let absent: UpdateInventoryEntryRequest =
        serde_json::from_value(serde_json::json!({ "quantity": 3 })).unwrap();
    assert_eq!(absent.notes, None);
    assert_eq!(absent.expiry_date, None);

    let cleared: UpdateInventoryEntryRequest = serde_json::from_value(serde_json::json!({
        "notes": null,
        "village_id": null,
    }))
    .unwrap();
    assert_eq!(cleared.notes, Some(None));
    assert_eq!(cleared.village_id, Some(None));
    assert!(cleared.validate().is_ok());

    let set: UpdateInventoryEntryRequest =
        serde_json::from_value(serde_json::json!({ "expiry_date": "2027-03-31" })).unwrap();
    assert!(matches!(set.expiry_date, Some(Some(_))));
}
