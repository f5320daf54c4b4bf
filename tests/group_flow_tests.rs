mod common;

use common::spawn_app;
use relief_portal::{
    AppConfig, MockStorageService,
    models::{
        Document, DocumentDownloadResponse, DocumentUploadResponse, GroupDetail, GroupStatus,
        ReliefGroup, SendOtpResponse, UserRole, VerifyOtpResponse,
    },
};
use serde_json::json;
use tokio::task::JoinSet;

const REP_PHONE: &str = "9812345670";

#[tokio::test]
async fn test_otp_send_and_verify() {
    let app = spawn_app().await;

    let sent = app
        .client
        .post(app.url("/otp/send"))
        .json(&json!({ "phone": REP_PHONE }))
        .send()
        .await
        .unwrap();
    assert_eq!(sent.status(), 200);
    let sent: SendOtpResponse = sent.json().await.unwrap();
    assert_eq!(sent.phone, "+919812345670");
    let code = sent.debug_code.expect("local mode echoes the code");
    assert_eq!(code, app.last_code_sent_to(REP_PHONE));

    let verified = app
        .client
        .post(app.url("/otp/verify"))
        .json(&json!({ "phone": REP_PHONE, "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(verified.status(), 200);
    let verified: VerifyOtpResponse = verified.json().await.unwrap();
    assert!(verified.verified);
    assert!(verified.valid_for > 0);
}

#[tokio::test]
async fn test_otp_resend_is_rate_limited() {
    let app = spawn_app().await;
    let body = json!({ "phone": REP_PHONE });

    let first = app.client.post(app.url("/otp/send")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 200);

    let second = app.client.post(app.url("/otp/send")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 429);
    assert!(second.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn test_otp_wrong_code_spends_attempts() {
    let app = spawn_app().await;
    let sent: SendOtpResponse = app
        .client
        .post(app.url("/otp/send"))
        .json(&json!({ "phone": REP_PHONE }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let code = sent.debug_code.unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let response = app
        .client
        .post(app.url("/otp/verify"))
        .json(&json!({ "phone": REP_PHONE, "code": wrong }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let error: serde_json::Value = response.json().await.unwrap();
    let message = error["fields"]["code"][0].as_str().unwrap();
    assert!(message.contains("4 attempts left"), "got {}", message);

    // The right code still works afterwards.
    let response = app
        .client
        .post(app.url("/otp/verify"))
        .json(&json!({ "phone": REP_PHONE, "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wrong_guesses_share_one_budget() {
    let app = spawn_app().await;
    let sent: SendOtpResponse = app
        .client
        .post(app.url("/otp/send"))
        .json(&json!({ "phone": REP_PHONE }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let code = sent.debug_code.unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let mut guesses = JoinSet::new();
    for _ in 0..40 {
        let client = app.client.clone();
        let url = app.url("/otp/verify");
        guesses.spawn(async move {
            client
                .post(url)
                .json(&json!({ "phone": REP_PHONE, "code": wrong }))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        });
    }

    let mut evaluated = 0;
    let mut locked = 0;
    while let Some(status) = guesses.join_next().await {
        match status.unwrap() {
            400 => evaluated += 1,
            429 => locked += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(evaluated, AppConfig::default().otp.max_attempts);
    assert_eq!(locked, 40 - evaluated);

    // The budget is gone, so even the right code is refused now.
    let response = app
        .client
        .post(app.url("/otp/verify"))
        .json(&json!({ "phone": REP_PHONE, "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_issue_one_code() {
    let app = spawn_app().await;

    let mut sends = JoinSet::new();
    for _ in 0..20 {
        let client = app.client.clone();
        let url = app.url("/otp/send");
        sends.spawn(async move {
            client
                .post(url)
                .json(&json!({ "phone": REP_PHONE }))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        });
    }

    let mut statuses = Vec::new();
    while let Some(status) = sends.join_next().await {
        statuses.push(status.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 429).count(), 19);
    assert_eq!(app.sms.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_verify_without_a_code_is_rejected() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/otp/verify"))
        .json(&json!({ "phone": REP_PHONE, "code": "123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_group_registration_requires_a_verified_phone() {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;

    let unverified = app
        .client
        .post(app.url("/groups/register"))
        .json(&app.group_payload("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id]))
        .send()
        .await
        .unwrap();
    assert_eq!(unverified.status(), 400);

    let registered = app
        .register_group("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id])
        .await;
    assert_eq!(registered.group.status, GroupStatus::Pending);
    assert_eq!(registered.group.service_ids, vec![food.id]);
    assert_eq!(registered.representative.role, UserRole::Provider);
    assert_eq!(registered.representative.phone, "+919812345670");

    // One verification, one registration.
    let replay = app
        .client
        .post(app.url("/groups/register"))
        .json(&app.group_payload("Second Try", REP_PHONE, "other@hands.org", &[food.id]))
        .send()
        .await
        .unwrap();
    assert!(replay.status().is_client_error());

    // The representative can sign in right away.
    assert_eq!(app.login("rep@hands.org", common::PASSWORD).await.status(), 200);
}

#[tokio::test]
async fn test_group_registration_validates_services() {
    let app = spawn_app().await;
    app.verify_phone(REP_PHONE).await;

    let response = app
        .client
        .post(app.url("/groups/register"))
        .json(&app.group_payload("Helping Hands", REP_PHONE, "rep@hands.org", &[uuid::Uuid::new_v4()]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let error: serde_json::Value = response.json().await.unwrap();
    assert!(error["fields"]["group.service_ids"].is_array());
}

#[tokio::test]
async fn test_only_approved_groups_are_public() {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;
    let registered = app
        .register_group("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id])
        .await;
    let group_id = registered.group.id;

    let listed: Vec<ReliefGroup> = app
        .client
        .get(app.url("/groups?status=pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());
    let hidden = app
        .client
        .get(app.url(&format!("/groups/{}", group_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status(), 404);

    let approved = app.approve_group(&admin, group_id).await;
    assert_eq!(approved.status, GroupStatus::Approved);
    assert!(approved.approved_at.is_some());

    let listed: Vec<ReliefGroup> = app
        .client
        .get(app.url(&format!("/groups?service_id={}", food.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, group_id);
}

#[tokio::test]
async fn test_group_moderation_rules() {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;
    let registered = app
        .register_group("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id])
        .await;
    let status_url = app.url(&format!("/admin/groups/{}/status", registered.group.id));

    let no_reason = app
        .client
        .put(&status_url)
        .header("x-user-id", admin.id.to_string())
        .json(&json!({ "status": "rejected" }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_reason.status(), 400);

    // pending → suspended is not an edge of the graph.
    let skip = app
        .client
        .put(&status_url)
        .header("x-user-id", admin.id.to_string())
        .json(&json!({ "status": "suspended", "reason": "fraud" }))
        .send()
        .await
        .unwrap();
    assert_eq!(skip.status(), 409);

    let rejected = app
        .client
        .put(&status_url)
        .header("x-user-id", admin.id.to_string())
        .json(&json!({ "status": "rejected", "reason": "Documents unreadable" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 200);
    let rejected: ReliefGroup = rejected.json().await.unwrap();
    assert_eq!(rejected.status, GroupStatus::Rejected);
    assert_eq!(rejected.status_reason.as_deref(), Some("Documents unreadable"));

    let detail: GroupDetail = app
        .client
        .get(app.url(&format!("/admin/groups/{}", registered.group.id)))
        .header("x-user-id", admin.id.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail.representatives.len(), 1);
    assert_eq!(detail.representatives[0].user_id, registered.representative.id);
}

#[tokio::test]
async fn test_provider_updates_own_group() {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;
    let rescue = app.create_catalog_entry(&admin, "services", "Rescue").await;
    let registered = app
        .register_group("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id])
        .await;
    let owner = registered.representative.id.to_string();

    let updated = app
        .client
        .put(app.url("/me/group"))
        .header("x-user-id", &owner)
        .json(&json!({ "description": "Boats and volunteers", "service_ids": [food.id, rescue.id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);
    let updated: ReliefGroup = updated.json().await.unwrap();
    assert_eq!(updated.description.as_deref(), Some("Boats and volunteers"));
    assert_eq!(updated.service_ids.len(), 2);

    // Citizens have no group to manage.
    let citizen = app
        .create_user(UserRole::Citizen, "asha@example.org", "+919876543210")
        .await;
    let response = app
        .client
        .get(app.url("/me/group"))
        .header("x-user-id", citizen.id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_document_upload_and_review() {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;
    let registered = app
        .register_group("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id])
        .await;
    let owner = registered.representative.id.to_string();

    let rejected_type = app
        .client
        .post(app.url("/me/group/documents/upload-url"))
        .header("x-user-id", &owner)
        .json(&json!({ "file_name": "payload.exe", "content_type": "application/x-msdownload" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected_type.status(), 400);

    let upload: DocumentUploadResponse = app
        .client
        .post(app.url("/me/group/documents/upload-url"))
        .header("x-user-id", &owner)
        .json(&json!({ "file_name": "../../certificate.pdf", "content_type": "application/pdf" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(upload.upload_url.contains("signature=fake"));
    assert!(upload.storage_key.starts_with(&format!("groups/{}/", registered.group.id)));
    assert!(upload.storage_key.ends_with(".pdf"));
    assert!(!upload.storage_key.contains("certificate"));

    // Keys from another group's prefix are refused.
    let foreign = app
        .client
        .post(app.url("/me/group/documents"))
        .header("x-user-id", &owner)
        .json(&json!({
            "kind": "registration_certificate",
            "file_name": "certificate.pdf",
            "content_type": "application/pdf",
            "storage_key": format!("groups/{}/x.pdf", uuid::Uuid::new_v4()),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), 403);

    let recorded = app
        .client
        .post(app.url("/me/group/documents"))
        .header("x-user-id", &owner)
        .json(&json!({
            "kind": "registration_certificate",
            "file_name": "certificate.pdf",
            "content_type": "application/pdf",
            "storage_key": upload.storage_key,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(recorded.status(), 201);
    let document: Document = recorded.json().await.unwrap();

    let download: DocumentDownloadResponse = app
        .client
        .get(app.url(&format!("/admin/documents/{}/download", document.id)))
        .header("x-user-id", admin.id.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(download.download_url.contains(&document.storage_key));
}

#[tokio::test]
async fn test_storage_failure_surfaces_as_server_error() {
    let app = common::spawn_app_with(MockStorageService::new_failing()).await;
    let admin = app.seed_admin().await;
    let food = app.create_catalog_entry(&admin, "services", "Food").await;
    let registered = app
        .register_group("Helping Hands", REP_PHONE, "rep@hands.org", &[food.id])
        .await;

    let response = app
        .client
        .post(app.url("/me/group/documents/upload-url"))
        .header("x-user-id", registered.representative.id.to_string())
        .json(&json!({ "file_name": "certificate.pdf", "content_type": "application/pdf" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let error: serde_json::Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Internal server error");
}
