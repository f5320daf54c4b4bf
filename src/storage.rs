use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifetime of presigned upload and download URLs.
const PRESIGN_TTL: Duration = Duration::from_secs(600);

/// Document MIME types accepted for group paperwork, with their file extension.
pub const ALLOWED_DOCUMENT_TYPES: [(&str, &str); 3] = [
    ("application/pdf", "pdf"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
];

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for the object storage holding group documents. Handlers
/// only ever hand out presigned URLs; file bytes never pass through the API.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if missing. Called at startup in `Env::Local`
    /// to provision MinIO.
    async fn ensure_bucket_exists(&self);

    /// Signed PUT URL for a direct client upload. The client must send the same
    /// `content_type` or the signature won't match.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String>;

    /// Signed GET URL for reviewing an uploaded document.
    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// `aws-sdk-s3` client pointed at any S3-compatible endpoint (MinIO locally).
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // Path-style addressing (http://endpoint/bucket/key), required by MinIO.
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }

    fn presigning_config() -> Result<PresigningConfig, String> {
        PresigningConfig::expires_in(PRESIGN_TTL).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Usually "already owned by you".
            tracing::debug!("create_bucket: {:?}", e);
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .content_type(content_type)
            .presigned(Self::presigning_config()?)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String> {
        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .presigned(Self::presigning_config()?)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a caller-supplied key can't escape its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// File extension for an accepted document type, `None` if the type isn't allowed.
pub fn document_extension(content_type: &str) -> Option<&'static str> {
    let normalized = content_type.trim().to_ascii_lowercase();
    ALLOWED_DOCUMENT_TYPES
        .iter()
        .find(|(mime, _)| *mime == normalized)
        .map(|(_, ext)| *ext)
}

/// Object key for a new document of `group_id`: `groups/<group_id>/<uuid>.<ext>`.
/// The client file name is never part of the key.
pub fn document_key(group_id: Uuid, extension: &str) -> String {
    format!("groups/{}/{}.{}", group_id, Uuid::new_v4(), extension)
}

/// True when `key` was issued for `group_id` by `document_key`.
pub fn key_belongs_to_group(key: &str, group_id: Uuid) -> bool {
    let prefix = format!("groups/{}/", group_id);
    sanitize_key(key) == key && key.starts_with(&prefix) && key.len() > prefix.len()
}

// 3. The Mock Implementation (local runs and tests)
/// MockStorageService
///
/// Returns deterministic fake URLs without touching the network.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake&download=1",
            sanitize_key(key)
        ))
    }
}

/// StorageState
///
/// The shared handle stored in `AppState`.
pub type StorageState = Arc<dyn StorageService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_segments_are_removed() {
        assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_key("groups//./a.pdf"), "groups/a.pdf");
    }

    #[test]
    fn only_document_types_are_accepted() {
        assert_eq!(document_extension("application/pdf"), Some("pdf"));
        assert_eq!(document_extension("Image/PNG"), Some("png"));
        assert_eq!(document_extension("image/jpeg"), Some("jpg"));
        assert_eq!(document_extension("video/mp4"), None);
        assert_eq!(document_extension("text/html"), None);
    }

    #[test]
    fn document_keys_are_scoped_to_the_group() {
        let group = Uuid::new_v4();
        let key = document_key(group, "pdf");
        assert!(key.starts_with(&format!("groups/{}/", group)));
        assert!(key.ends_with(".pdf"));
        assert!(key_belongs_to_group(&key, group));
        assert!(!key_belongs_to_group(&key, Uuid::new_v4()));
        assert!(!key_belongs_to_group(
            &format!("groups/{}/../other/x.pdf", group),
            group
        ));
    }
}
