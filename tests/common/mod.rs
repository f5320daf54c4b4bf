#![allow(dead_code)]

use relief_portal::{
    AppConfig, AppState, InMemoryRepository, MockSmsService, MockStorageService, auth,
    create_router,
    models::{
        CatalogEntry, Location, NewUser, RegisterGroupResponse, ReliefGroup, TokenResponse, User,
        UserRole,
    },
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const PASSWORD: &str = "relief-pass-2024";

/// A running server on an ephemeral port, backed by the in-memory repository.
/// `sms` is a handle onto the same mock the app sends through.
pub struct TestApp {
    pub address: String,
    pub repo: RepositoryState,
    pub sms: MockSmsService,
    pub client: reqwest::Client,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(MockStorageService::new()).await
}

pub async fn spawn_app_with(storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let sms = MockSmsService::new();
    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(storage) as StorageState,
        sms: Arc::new(sms.clone()),
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        sms,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Inserts an account straight into the repository (admins have no signup route).
    pub async fn create_user(&self, role: UserRole, email: &str, phone: &str) -> User {
        self.repo
            .create_user(NewUser {
                name: format!("{:?} user", role),
                email: email.to_string(),
                phone: phone.to_string(),
                password_hash: auth::hash_password(PASSWORD).unwrap(),
                role,
            })
            .await
            .expect("seed user")
    }

    pub async fn seed_admin(&self) -> User {
        self.create_user(UserRole::Admin, "admin@relief.test", "+919000000001")
            .await
    }

    pub async fn login(&self, identifier: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await
            .expect("login request")
    }

    pub async fn login_tokens(&self, identifier: &str) -> TokenResponse {
        let response = self.login(identifier, PASSWORD).await;
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    pub async fn create_catalog_entry(&self, admin: &User, kind: &str, name: &str) -> CatalogEntry {
        let response = self
            .client
            .post(self.url(&format!("/admin/catalog/{}", kind)))
            .header("x-user-id", admin.id.to_string())
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    pub async fn create_location(
        &self,
        admin: &User,
        level: &str,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Location {
        let response = self
            .client
            .post(self.url(&format!("/admin/locations/{}", level)))
            .header("x-user-id", admin.id.to_string())
            .json(&json!({ "name": name, "parent_id": parent_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// A state → district → tehsil → village chain. Returns the village.
    pub async fn seed_village(&self, admin: &User) -> Location {
        let state = self.create_location(admin, "states", "Kerala", None).await;
        let district = self
            .create_location(admin, "districts", "Wayanad", Some(state.id))
            .await;
        let tehsil = self
            .create_location(admin, "tehsils", "Vythiri", Some(district.id))
            .await;
        self.create_location(admin, "villages", "Chooralmala", Some(tehsil.id))
            .await
    }

    /// Sends and verifies a registration code for `phone` using the code the
    /// mock SMS gateway received.
    pub async fn verify_phone(&self, phone: &str) {
        let response = self
            .client
            .post(self.url("/otp/send"))
            .json(&json!({ "phone": phone, "purpose": "group_registration" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let code = self.last_code_sent_to(phone);
        let response = self
            .client
            .post(self.url("/otp/verify"))
            .json(&json!({ "phone": phone, "purpose": "group_registration", "code": code }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    /// The six digit code inside the last message sent to `phone`.
    pub fn last_code_sent_to(&self, phone: &str) -> String {
        let normalized = relief_portal::validation::normalize_phone(phone).unwrap();
        let message = self
            .sms
            .last_message_to(&normalized)
            .expect("no sms was sent");
        message
            .split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .expect("message carries a six digit code")
            .to_string()
    }

    pub fn group_payload(&self, name: &str, phone: &str, email: &str, services: &[Uuid]) -> serde_json::Value {
        json!({
            "group": {
                "name": name,
                "kind": "organization",
                "contact_phone": phone,
                "service_ids": services,
            },
            "representative": {
                "name": "Ravi Kumar",
                "phone": phone,
                "email": email,
                "password": PASSWORD,
            }
        })
    }

    /// Verifies the phone, registers a group and returns it with its provider account.
    pub async fn register_group(
        &self,
        name: &str,
        phone: &str,
        email: &str,
        services: &[Uuid],
    ) -> RegisterGroupResponse {
        self.verify_phone(phone).await;
        let response = self
            .client
            .post(self.url("/groups/register"))
            .json(&self.group_payload(name, phone, email, services))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    pub async fn approve_group(&self, admin: &User, group_id: Uuid) -> ReliefGroup {
        let response = self
            .client
            .put(self.url(&format!("/admin/groups/{}/status", group_id)))
            .header("x-user-id", admin.id.to_string())
            .json(&json!({ "status": "approved" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    /// Registered and approved group offering `services`; returns (group, owner id).
    pub async fn approved_group(
        &self,
        admin: &User,
        name: &str,
        phone: &str,
        email: &str,
        services: &[Uuid],
    ) -> (ReliefGroup, Uuid) {
        let registered = self.register_group(name, phone, email, services).await;
        let group = self.approve_group(admin, registered.group.id).await;
        (group, registered.representative.id)
    }
}
