use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::OtpPolicy;
use crate::error::AppError;
use crate::models::{
    AdminDashboardStats, AuditFilter, AuditLog, Availability, CatalogEntry, CatalogKind,
    CatalogPayload, CreateLocationRequest, Document, DonationOffer, DonationStatus,
    GroupFilter, GroupRepresentative, GroupStatus, InventoryEntry, InventoryFilter,
    InventoryItemType, ItemCondition, ItemTypePayload, Location, LocationLevel, NewAuditLog,
    NewDocument, NewDonation, NewGroup, NewInventoryEntry, NewOtp, NewRepresentative,
    NewResupply, NewServiceRequest, NewSession, NewUser, OtpPurpose, OtpRequest, PasswordReset,
    ReliefGroup, RequestFilter, RequestTransition, ResupplyFilter, ResupplyRequest,
    ResupplyStatus, ServiceRequest, Session, StockChange, UpdateCatalogPayload,
    UpdateGroupRequest, UpdateItemTypePayload, UpdateLocationRequest, User, UserRole,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Every repository call resolves to the application error type, so handlers can
/// use `?` straight through.
pub type RepoResult<T> = Result<T, AppError>;

/// GroupRegistration
///
/// Everything `register_group` writes in one transaction. The representative's
/// phone must hold a verified, unconsumed `group_registration` code verified at
/// or after `verified_since`.
#[derive(Debug, Clone)]
pub struct GroupRegistration {
    pub user: NewUser,
    pub group: NewGroup,
    pub representative: NewRepresentative,
    pub verified_since: DateTime<Utc>,
}

/// Resolved field values for an inventory entry update.
#[derive(Debug, Clone)]
pub struct EntryUpdate {
    pub quantity: i32,
    pub availability: Availability,
    pub condition: ItemCondition,
    pub expiry_date: Option<NaiveDate>,
    pub village_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Repository Trait
///
/// The contract for all persistence. Handlers only see `Arc<dyn Repository>`, so
/// the Postgres implementation and the in-memory one are interchangeable.
///
/// Conventions:
/// - `Option` results mean "no such row" and are turned into 404s by the caller.
/// - Status changes take the status the caller observed (`from`) and return
///   `None` when the row has moved on in the meantime (a lost race, 409 upstream).
/// - Uniqueness and reference violations surface as `AppError::Conflict`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    /// `email` is matched lowercased.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    /// `phone` is already normalized to `+91XXXXXXXXXX`.
    async fn find_user_by_phone(&self, phone: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self, role: Option<UserRole>) -> RepoResult<Vec<User>>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()>;
    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> RepoResult<Option<User>>;

    // --- Sessions ---
    async fn create_session(&self, session: NewSession) -> RepoResult<Session>;
    async fn get_session(&self, id: Uuid) -> RepoResult<Option<Session>>;
    async fn find_session_by_refresh_hash(&self, hash: &str) -> RepoResult<Option<Session>>;
    /// Swaps the refresh hash only if it still equals `old_hash` and the session is
    /// unrevoked. Returns false when another refresh won.
    async fn rotate_session(
        &self,
        id: Uuid,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<bool>;
    async fn revoke_session(&self, id: Uuid) -> RepoResult<bool>;
    /// Revokes every active session of the user except `keep`. Returns how many.
    async fn revoke_user_sessions(&self, user_id: Uuid, keep: Option<Uuid>) -> RepoResult<u64>;

    // --- Password resets ---
    async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<PasswordReset>;
    /// Marks the reset used if it is unused and unexpired at `now`. The user's
    /// other outstanding resets are burned with it.
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<PasswordReset>>;

    // --- OTP ---
    /// Stores a new code unless `otp::check_send_allowed` refuses it. The check and
    /// the insert are serialized per phone and purpose.
    async fn issue_otp(
        &self,
        otp: NewOtp,
        policy: &OtpPolicy,
        now: DateTime<Utc>,
    ) -> RepoResult<OtpRequest>;
    async fn latest_otp(&self, phone: &str, purpose: OtpPurpose) -> RepoResult<Option<OtpRequest>>;
    /// Spends one attempt on an open code. `None` when the budget is already used
    /// up or the code was verified or consumed meanwhile; otherwise the attempts
    /// spent including this one.
    async fn reserve_otp_attempt(&self, id: Uuid, max_attempts: i32) -> RepoResult<Option<i32>>;
    async fn mark_otp_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<bool>;

    // --- Relief groups ---
    /// Consumes the verified code and creates the provider user, the group
    /// (`pending`) and its representative atomically.
    async fn register_group(&self, registration: GroupRegistration)
    -> RepoResult<(ReliefGroup, User)>;
    async fn get_group(&self, id: Uuid) -> RepoResult<Option<ReliefGroup>>;
    async fn get_group_by_owner(&self, owner_id: Uuid) -> RepoResult<Option<ReliefGroup>>;
    async fn list_groups(&self, filter: &GroupFilter) -> RepoResult<Vec<ReliefGroup>>;
    async fn update_group(
        &self,
        id: Uuid,
        update: UpdateGroupRequest,
    ) -> RepoResult<Option<ReliefGroup>>;
    /// Moves the group from `from` to `to`, stamping `approved_at` on approval.
    async fn set_group_status(
        &self,
        id: Uuid,
        from: GroupStatus,
        to: GroupStatus,
        reason: Option<String>,
    ) -> RepoResult<Option<ReliefGroup>>;
    async fn list_representatives(&self, group_id: Uuid) -> RepoResult<Vec<GroupRepresentative>>;
    async fn add_document(&self, document: NewDocument) -> RepoResult<Document>;
    async fn list_documents(&self, group_id: Uuid) -> RepoResult<Vec<Document>>;
    async fn get_document(&self, id: Uuid) -> RepoResult<Option<Document>>;

    // --- Catalogs ---
    async fn list_catalog(
        &self,
        kind: CatalogKind,
        include_inactive: bool,
    ) -> RepoResult<Vec<CatalogEntry>>;
    async fn get_catalog_entry(&self, kind: CatalogKind, id: Uuid)
    -> RepoResult<Option<CatalogEntry>>;
    async fn create_catalog_entry(
        &self,
        kind: CatalogKind,
        payload: CatalogPayload,
    ) -> RepoResult<CatalogEntry>;
    async fn update_catalog_entry(
        &self,
        kind: CatalogKind,
        id: Uuid,
        update: UpdateCatalogPayload,
    ) -> RepoResult<Option<CatalogEntry>>;
    /// Refuses with a conflict while anything still references the entry.
    async fn delete_catalog_entry(&self, kind: CatalogKind, id: Uuid) -> RepoResult<bool>;

    // --- Locations ---
    async fn list_locations(
        &self,
        level: LocationLevel,
        parent_id: Option<Uuid>,
    ) -> RepoResult<Vec<Location>>;
    async fn get_location(&self, level: LocationLevel, id: Uuid) -> RepoResult<Option<Location>>;
    async fn create_location(
        &self,
        level: LocationLevel,
        request: CreateLocationRequest,
    ) -> RepoResult<Location>;
    async fn update_location(
        &self,
        level: LocationLevel,
        id: Uuid,
        update: UpdateLocationRequest,
    ) -> RepoResult<Option<Location>>;
    /// Refuses with a conflict while the node has children or is referenced.
    async fn delete_location(&self, level: LocationLevel, id: Uuid) -> RepoResult<bool>;

    // --- Inventory item types ---
    async fn list_item_types(&self) -> RepoResult<Vec<InventoryItemType>>;
    async fn get_item_type(&self, id: Uuid) -> RepoResult<Option<InventoryItemType>>;
    async fn create_item_type(&self, payload: ItemTypePayload) -> RepoResult<InventoryItemType>;
    async fn update_item_type(
        &self,
        id: Uuid,
        update: UpdateItemTypePayload,
    ) -> RepoResult<Option<InventoryItemType>>;
    async fn delete_item_type(&self, id: Uuid) -> RepoResult<bool>;

    // --- Inventory entries ---
    async fn list_group_inventory(&self, group_id: Uuid) -> RepoResult<Vec<InventoryEntry>>;
    /// Available, in-stock entries of approved groups.
    async fn search_inventory(&self, filter: &InventoryFilter) -> RepoResult<Vec<InventoryEntry>>;
    async fn get_inventory_entry(&self, id: Uuid) -> RepoResult<Option<InventoryEntry>>;
    async fn create_inventory_entry(&self, entry: NewInventoryEntry)
    -> RepoResult<InventoryEntry>;
    /// Applies `update` only if the stock is still `expected_quantity`.
    async fn update_inventory_entry(
        &self,
        id: Uuid,
        expected_quantity: i32,
        update: EntryUpdate,
    ) -> RepoResult<Option<InventoryEntry>>;
    async fn delete_inventory_entry(&self, id: Uuid) -> RepoResult<bool>;

    // --- Resupply requests ---
    async fn create_resupply(&self, request: NewResupply) -> RepoResult<ResupplyRequest>;
    async fn get_resupply(&self, id: Uuid) -> RepoResult<Option<ResupplyRequest>>;
    async fn list_resupply(&self, filter: &ResupplyFilter) -> RepoResult<Vec<ResupplyRequest>>;
    /// Status move plus optional stock change, committed together.
    async fn transition_resupply(
        &self,
        id: Uuid,
        from: ResupplyStatus,
        to: ResupplyStatus,
        decided_by: Option<Uuid>,
        decision_note: Option<String>,
        stock: Option<StockChange>,
    ) -> RepoResult<Option<ResupplyRequest>>;

    // --- Donation offers ---
    async fn create_donation(&self, offer: NewDonation) -> RepoResult<DonationOffer>;
    async fn get_donation(&self, id: Uuid) -> RepoResult<Option<DonationOffer>>;
    async fn list_donations(
        &self,
        group_id: Option<Uuid>,
        donor_id: Option<Uuid>,
        status: Option<DonationStatus>,
    ) -> RepoResult<Vec<DonationOffer>>;
    async fn transition_donation(
        &self,
        id: Uuid,
        from: DonationStatus,
        to: DonationStatus,
        stock: Option<StockChange>,
    ) -> RepoResult<Option<DonationOffer>>;

    // --- Service requests ---
    /// Inserts the request with the next number of `day`.
    async fn create_service_request(
        &self,
        request: NewServiceRequest,
        day: NaiveDate,
    ) -> RepoResult<ServiceRequest>;
    async fn get_service_request(&self, id: Uuid) -> RepoResult<Option<ServiceRequest>>;
    async fn find_request_by_number(&self, number: &str) -> RepoResult<Option<ServiceRequest>>;
    async fn list_service_requests(&self, filter: &RequestFilter)
    -> RepoResult<Vec<ServiceRequest>>;
    async fn list_citizen_requests(&self, citizen_id: Uuid) -> RepoResult<Vec<ServiceRequest>>;
    /// Pending requests for any of `service_ids`, plus everything assigned to the group.
    async fn list_provider_requests(
        &self,
        group_id: Uuid,
        service_ids: &[Uuid],
    ) -> RepoResult<Vec<ServiceRequest>>;
    async fn transition_service_request(
        &self,
        id: Uuid,
        transition: RequestTransition,
    ) -> RepoResult<Option<ServiceRequest>>;
    async fn set_request_alert_status(
        &self,
        id: Uuid,
        alert_status_id: Option<Uuid>,
    ) -> RepoResult<Option<ServiceRequest>>;

    // --- Audit & dashboard ---
    async fn insert_audit(&self, entry: NewAuditLog) -> RepoResult<()>;
    async fn list_audit(&self, filter: &AuditFilter) -> RepoResult<Vec<AuditLog>>;
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
