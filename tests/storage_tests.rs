use relief_portal::{
    MockSmsService, MockStorageService,
    sms::SmsService,
    storage::{StorageService, document_key},
};
use uuid::Uuid;

#[tokio::test]
async fn test_mock_storage_urls_carry_the_key() {
    let storage = MockStorageService::new();
    let key = document_key(Uuid::new_v4(), "pdf");

    let upload = storage
        .get_presigned_upload_url(&key, "application/pdf")
        .await
        .unwrap();
    assert!(upload.contains(&key));
    assert!(upload.contains("signature="));

    let download = storage.get_presigned_download_url(&key).await.unwrap();
    assert!(download.contains(&key));
    assert!(download.ends_with("download=1"));
}

#[tokio::test]
async fn test_mock_storage_sanitizes_keys() {
    let storage = MockStorageService::new();
    let url = storage
        .get_presigned_download_url("groups/../../secrets/key.pem")
        .await
        .unwrap();
    assert!(!url.contains(".."));
    assert!(url.contains("groups/secrets/key.pem"));
}

#[tokio::test]
async fn test_failing_mock_storage() {
    let storage = MockStorageService::new_failing();
    assert!(storage
        .get_presigned_upload_url("groups/x/a.pdf", "application/pdf")
        .await
        .is_err());
    assert!(storage
        .get_presigned_download_url("groups/x/a.pdf")
        .await
        .is_err());
}

#[tokio::test]
async fn test_mock_sms_records_messages() {
    let sms = MockSmsService::new();
    sms.send("+919876543210", "first").await.unwrap();
    sms.send("+919812345670", "other").await.unwrap();
    sms.send("+919876543210", "second").await.unwrap();

    assert_eq!(sms.sent_messages().len(), 3);
    assert_eq!(sms.last_message_to("+919876543210").as_deref(), Some("second"));
    assert!(sms.last_message_to("+911111111111").is_none());

    // Clones share the outbox.
    let clone = sms.clone();
    clone.send("+919812345670", "again").await.unwrap();
    assert_eq!(sms.last_message_to("+919812345670").as_deref(), Some("again"));
}

#[tokio::test]
async fn test_failing_mock_sms_records_nothing() {
    let sms = MockSmsService::new_failing();
    assert!(sms.send("+919876543210", "code").await.is_err());
    assert!(sms.sent_messages().is_empty());
}
