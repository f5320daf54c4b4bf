use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EntryUpdate, GroupRegistration, RepoResult, Repository};
use crate::config::OtpPolicy;
use crate::error::AppError;
use crate::models::{
    AdminDashboardStats, AuditFilter, AuditLog, CatalogEntry, CatalogKind, CatalogPayload,
    CreateLocationRequest, Document, DonationOffer, DonationStatus, GroupFilter,
    GroupRepresentative, GroupStatus, InventoryEntry, InventoryFilter, InventoryItemType,
    ItemTypePayload, Location, LocationLevel, NewAuditLog, NewDocument, NewDonation,
    NewInventoryEntry, NewOtp, NewResupply, NewServiceRequest, NewSession, NewUser, OtpPurpose,
    OtpRequest, PasswordReset, ReliefGroup, RequestFilter, RequestStatus, RequestTransition,
    ResupplyFilter, ResupplyRequest, ResupplyStatus, ServiceRequest, Session, StockChange,
    UpdateCatalogPayload, UpdateGroupRequest, UpdateItemTypePayload, UpdateLocationRequest, User,
    UserRole, Availability,
};
use crate::{otp, workflow};

#[derive(Default)]
struct Store {
    users: Vec<User>,
    sessions: Vec<Session>,
    resets: Vec<PasswordReset>,
    otps: Vec<OtpRequest>,
    groups: Vec<ReliefGroup>,
    representatives: Vec<GroupRepresentative>,
    documents: Vec<Document>,
    catalogs: HashMap<CatalogKind, Vec<CatalogEntry>>,
    locations: HashMap<LocationLevel, Vec<Location>>,
    item_types: Vec<InventoryItemType>,
    entries: Vec<InventoryEntry>,
    resupply: Vec<ResupplyRequest>,
    donations: Vec<DonationOffer>,
    requests: Vec<ServiceRequest>,
    counters: HashMap<NaiveDate, u32>,
    audit: Vec<AuditLog>,
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Store {
    fn check_user_unique(&self, email: &str, phone: &str) -> RepoResult<()> {
        if self.users.iter().any(|u| u.email == email) {
            return Err(AppError::conflict("Duplicate value violates users_email_key"));
        }
        if self.users.iter().any(|u| u.phone == phone) {
            return Err(AppError::conflict("Duplicate value violates users_phone_key"));
        }
        Ok(())
    }

    fn insert_user(&mut self, user: NewUser) -> RepoResult<User> {
        self.check_user_unique(&user.email, &user.phone)?;
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.push(created.clone());
        Ok(created)
    }

    /// Same bounds and availability rules as the SQL stock update.
    fn apply_stock(&mut self, change: StockChange) -> RepoResult<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == change.entry_id)
            .ok_or(AppError::NotFound("Inventory entry"))?;
        let quantity = workflow::apply_stock_delta(entry.quantity, change.delta)?;
        entry.availability = workflow::availability_after(entry.availability, entry.quantity, quantity);
        entry.quantity = quantity;
        entry.updated_at = Utc::now();
        Ok(())
    }

    fn catalog(&mut self, kind: CatalogKind) -> &mut Vec<CatalogEntry> {
        self.catalogs.entry(kind).or_default()
    }

    fn catalog_in_use(&self, kind: CatalogKind, id: Uuid) -> bool {
        match kind {
            CatalogKind::Services => {
                self.requests.iter().any(|r| r.service_id == id)
                    || self.groups.iter().any(|g| g.service_ids.contains(&id))
            }
            CatalogKind::AlertCategories => {
                self.requests.iter().any(|r| r.alert_category_id == Some(id))
            }
            CatalogKind::AlertStatuses => {
                self.requests.iter().any(|r| r.alert_status_id == Some(id))
            }
        }
    }

    fn location_in_use(&self, level: LocationLevel, id: Uuid) -> bool {
        match level {
            LocationLevel::State => self.groups.iter().any(|g| g.state_id == Some(id)),
            LocationLevel::District => self.groups.iter().any(|g| g.district_id == Some(id)),
            LocationLevel::Tehsil => false,
            LocationLevel::Village => {
                self.entries.iter().any(|e| e.village_id == Some(id))
                    || self.requests.iter().any(|r| r.village_id == Some(id))
            }
        }
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. Used when no `DATABASE_URL` is
/// configured in local mode and by the integration tests. One write lock per call
/// makes every operation atomic, including the multi-row ones.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        self.store.write().await.insert_user(user)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let store = self.store.read().await;
        Ok(store.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> RepoResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.iter().find(|u| u.phone == phone).cloned())
    }

    async fn list_users(&self, role: Option<UserRole>) -> RepoResult<Vec<User>> {
        let store = self.store.read().await;
        Ok(store
            .users
            .iter()
            .rev()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .cloned()
            .collect())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()> {
        let mut store = self.store.write().await;
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AppError::NotFound("User"))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let mut store = self.store.write().await;
        Ok(store.users.iter_mut().find(|u| u.id == user_id).map(|u| {
            u.is_active = is_active;
            u.updated_at = Utc::now();
            u.clone()
        }))
    }

    // --- Sessions ---

    async fn create_session(&self, session: NewSession) -> RepoResult<Session> {
        let created = Session {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            refresh_token_hash: session.refresh_token_hash,
            user_agent: session.user_agent,
            created_at: Utc::now(),
            expires_at: session.expires_at,
            revoked_at: None,
            last_used_at: None,
        };
        self.store.write().await.sessions.push(created.clone());
        Ok(created)
    }

    async fn get_session(&self, id: Uuid) -> RepoResult<Option<Session>> {
        let store = self.store.read().await;
        Ok(store.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_session_by_refresh_hash(&self, hash: &str) -> RepoResult<Option<Session>> {
        let store = self.store.read().await;
        Ok(store
            .sessions
            .iter()
            .find(|s| s.refresh_token_hash == hash)
            .cloned())
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        let Some(session) = store.sessions.iter_mut().find(|s| {
            s.id == id && s.refresh_token_hash == old_hash && s.revoked_at.is_none()
        }) else {
            return Ok(false);
        };
        session.refresh_token_hash = new_hash.to_string();
        session.expires_at = expires_at;
        session.last_used_at = Some(Utc::now());
        Ok(true)
    }

    async fn revoke_session(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        match store
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.revoked_at.is_none())
        {
            Some(session) => {
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_user_sessions(&self, user_id: Uuid, keep: Option<Uuid>) -> RepoResult<u64> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let mut revoked = 0;
        for session in store.sessions.iter_mut().filter(|s| {
            s.user_id == user_id && s.revoked_at.is_none() && Some(s.id) != keep
        }) {
            session.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    // --- Password resets ---

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<PasswordReset> {
        let created = PasswordReset {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used_at: None,
            created_at: Utc::now(),
        };
        self.store.write().await.resets.push(created.clone());
        Ok(created)
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<PasswordReset>> {
        let mut store = self.store.write().await;
        let Some(consumed) = store
            .resets
            .iter_mut()
            .find(|r| r.token_hash == token_hash && r.used_at.is_none() && r.expires_at > now)
            .map(|r| {
                r.used_at = Some(now);
                r.clone()
            })
        else {
            return Ok(None);
        };
        for other in store
            .resets
            .iter_mut()
            .filter(|r| r.user_id == consumed.user_id && r.used_at.is_none())
        {
            other.used_at = Some(now);
        }
        Ok(Some(consumed))
    }

    // --- OTP ---

    async fn issue_otp(
        &self,
        otp: NewOtp,
        policy: &OtpPolicy,
        now: DateTime<Utc>,
    ) -> RepoResult<OtpRequest> {
        let mut store = self.store.write().await;
        let window_start = now - chrono::Duration::seconds(policy.window_secs);
        let recent: Vec<OtpRequest> = store
            .otps
            .iter()
            .rev()
            .filter(|o| o.phone == otp.phone && o.purpose == otp.purpose && o.created_at > window_start)
            .cloned()
            .collect();
        otp::check_send_allowed(policy, &recent, now)?;

        let created = OtpRequest {
            id: Uuid::new_v4(),
            phone: otp.phone,
            purpose: otp.purpose,
            code_hash: otp.code_hash,
            attempts: 0,
            created_at: now,
            expires_at: otp.expires_at,
            verified_at: None,
            consumed_at: None,
        };
        store.otps.push(created.clone());
        Ok(created)
    }

    async fn latest_otp(&self, phone: &str, purpose: OtpPurpose) -> RepoResult<Option<OtpRequest>> {
        let store = self.store.read().await;
        Ok(store
            .otps
            .iter()
            .rev()
            .find(|o| o.phone == phone && o.purpose == purpose)
            .cloned())
    }

    async fn reserve_otp_attempt(&self, id: Uuid, max_attempts: i32) -> RepoResult<Option<i32>> {
        let mut store = self.store.write().await;
        Ok(store
            .otps
            .iter_mut()
            .find(|o| {
                o.id == id
                    && o.attempts < max_attempts
                    && o.verified_at.is_none()
                    && o.consumed_at.is_none()
            })
            .map(|o| {
                o.attempts += 1;
                o.attempts
            }))
    }

    async fn mark_otp_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        match store
            .otps
            .iter_mut()
            .find(|o| o.id == id && o.verified_at.is_none() && o.consumed_at.is_none())
        {
            Some(otp) => {
                otp.verified_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Relief groups ---

    async fn register_group(
        &self,
        registration: GroupRegistration,
    ) -> RepoResult<(ReliefGroup, User)> {
        let GroupRegistration {
            user,
            group,
            representative,
            verified_since,
        } = registration;
        let mut store = self.store.write().await;

        // Everything that can fail is checked before the first write.
        let otp_index = store
            .otps
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, o)| {
                o.phone == representative.phone
                    && o.purpose == OtpPurpose::GroupRegistration
                    && o.consumed_at.is_none()
                    && o.verified_at.is_some_and(|v| v >= verified_since)
            })
            .max_by_key(|(_, o)| o.verified_at)
            .map(|(i, _)| i)
            .ok_or_else(|| {
                AppError::BadRequest("Representative phone number is not verified".to_string())
            })?;
        store.check_user_unique(&user.email, &user.phone)?;

        let now = Utc::now();
        let verified_at = store.otps[otp_index].verified_at;
        store.otps[otp_index].consumed_at = Some(now);

        let owner = store.insert_user(user)?;
        let created = ReliefGroup {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            name: group.name,
            kind: group.kind,
            description: group.description,
            contact_phone: group.contact_phone,
            contact_email: group.contact_email,
            address: group.address,
            state_id: group.state_id,
            district_id: group.district_id,
            service_ids: group.service_ids,
            status: GroupStatus::Pending,
            status_reason: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        store.groups.push(created.clone());
        store.representatives.push(GroupRepresentative {
            id: Uuid::new_v4(),
            group_id: created.id,
            user_id: owner.id,
            name: representative.name,
            phone: representative.phone,
            email: representative.email,
            designation: representative.designation,
            phone_verified_at: verified_at,
            created_at: now,
        });
        Ok((created, owner))
    }

    async fn get_group(&self, id: Uuid) -> RepoResult<Option<ReliefGroup>> {
        let store = self.store.read().await;
        Ok(store.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn get_group_by_owner(&self, owner_id: Uuid) -> RepoResult<Option<ReliefGroup>> {
        let store = self.store.read().await;
        Ok(store.groups.iter().find(|g| g.owner_id == owner_id).cloned())
    }

    async fn list_groups(&self, filter: &GroupFilter) -> RepoResult<Vec<ReliefGroup>> {
        let store = self.store.read().await;
        let mut groups: Vec<ReliefGroup> = store
            .groups
            .iter()
            .filter(|g| filter.status.is_none_or(|s| g.status == s))
            .filter(|g| filter.state_id.is_none_or(|s| g.state_id == Some(s)))
            .filter(|g| filter.district_id.is_none_or(|d| g.district_id == Some(d)))
            .filter(|g| filter.service_id.is_none_or(|s| g.service_ids.contains(&s)))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn update_group(
        &self,
        id: Uuid,
        update: UpdateGroupRequest,
    ) -> RepoResult<Option<ReliefGroup>> {
        let mut store = self.store.write().await;
        Ok(store.groups.iter_mut().find(|g| g.id == id).map(|g| {
            if let Some(name) = update.name {
                g.name = name;
            }
            if let Some(description) = update.description {
                g.description = Some(description);
            }
            if let Some(phone) = update.contact_phone {
                g.contact_phone = phone;
            }
            if let Some(email) = update.contact_email {
                g.contact_email = Some(email);
            }
            if let Some(address) = update.address {
                g.address = Some(address);
            }
            if let Some(service_ids) = update.service_ids {
                g.service_ids = service_ids;
            }
            g.updated_at = Utc::now();
            g.clone()
        }))
    }

    async fn set_group_status(
        &self,
        id: Uuid,
        from: GroupStatus,
        to: GroupStatus,
        reason: Option<String>,
    ) -> RepoResult<Option<ReliefGroup>> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        Ok(store
            .groups
            .iter_mut()
            .find(|g| g.id == id && g.status == from)
            .map(|g| {
                g.status = to;
                g.status_reason = reason;
                if to == GroupStatus::Approved {
                    g.approved_at = Some(now);
                }
                g.updated_at = now;
                g.clone()
            }))
    }

    async fn list_representatives(&self, group_id: Uuid) -> RepoResult<Vec<GroupRepresentative>> {
        let store = self.store.read().await;
        Ok(store
            .representatives
            .iter()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn add_document(&self, document: NewDocument) -> RepoResult<Document> {
        let mut store = self.store.write().await;
        if store
            .documents
            .iter()
            .any(|d| d.storage_key == document.storage_key)
        {
            return Err(AppError::conflict("Document already recorded"));
        }
        let created = Document {
            id: Uuid::new_v4(),
            group_id: document.group_id,
            kind: document.kind,
            file_name: document.file_name,
            content_type: document.content_type,
            storage_key: document.storage_key,
            uploaded_by: document.uploaded_by,
            created_at: Utc::now(),
        };
        store.documents.push(created.clone());
        Ok(created)
    }

    async fn list_documents(&self, group_id: Uuid) -> RepoResult<Vec<Document>> {
        let store = self.store.read().await;
        Ok(store
            .documents
            .iter()
            .filter(|d| d.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn get_document(&self, id: Uuid) -> RepoResult<Option<Document>> {
        let store = self.store.read().await;
        Ok(store.documents.iter().find(|d| d.id == id).cloned())
    }

    // --- Catalogs ---

    async fn list_catalog(
        &self,
        kind: CatalogKind,
        include_inactive: bool,
    ) -> RepoResult<Vec<CatalogEntry>> {
        let store = self.store.read().await;
        let mut entries: Vec<CatalogEntry> = store
            .catalogs
            .get(&kind)
            .map(|list| {
                list.iter()
                    .filter(|e| include_inactive || e.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_catalog_entry(
        &self,
        kind: CatalogKind,
        id: Uuid,
    ) -> RepoResult<Option<CatalogEntry>> {
        let store = self.store.read().await;
        Ok(store
            .catalogs
            .get(&kind)
            .and_then(|list| list.iter().find(|e| e.id == id).cloned()))
    }

    async fn create_catalog_entry(
        &self,
        kind: CatalogKind,
        payload: CatalogPayload,
    ) -> RepoResult<CatalogEntry> {
        let mut store = self.store.write().await;
        let list = store.catalog(kind);
        if list.iter().any(|e| same_name(&e.name, &payload.name)) {
            return Err(AppError::conflict(format!(
                "{} with this name already exists",
                kind.label()
            )));
        }
        let created = CatalogEntry {
            id: Uuid::new_v4(),
            name: payload.name,
            description: payload.description,
            is_active: payload.is_active,
            created_at: Utc::now(),
        };
        list.push(created.clone());
        Ok(created)
    }

    async fn update_catalog_entry(
        &self,
        kind: CatalogKind,
        id: Uuid,
        update: UpdateCatalogPayload,
    ) -> RepoResult<Option<CatalogEntry>> {
        let mut store = self.store.write().await;
        let list = store.catalog(kind);
        if let Some(name) = &update.name {
            if list.iter().any(|e| e.id != id && same_name(&e.name, name)) {
                return Err(AppError::conflict(format!(
                    "{} with this name already exists",
                    kind.label()
                )));
            }
        }
        Ok(list.iter_mut().find(|e| e.id == id).map(|e| {
            if let Some(name) = update.name {
                e.name = name;
            }
            if let Some(description) = update.description {
                e.description = Some(description);
            }
            if let Some(is_active) = update.is_active {
                e.is_active = is_active;
            }
            e.clone()
        }))
    }

    async fn delete_catalog_entry(&self, kind: CatalogKind, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.catalog_in_use(kind, id) {
            return Err(AppError::conflict(format!(
                "{} is still in use",
                kind.label()
            )));
        }
        let list = store.catalog(kind);
        let before = list.len();
        list.retain(|e| e.id != id);
        Ok(list.len() < before)
    }

    // --- Locations ---

    async fn list_locations(
        &self,
        level: LocationLevel,
        parent_id: Option<Uuid>,
    ) -> RepoResult<Vec<Location>> {
        let store = self.store.read().await;
        let scoped = level.parent().is_some();
        let mut nodes: Vec<Location> = store
            .locations
            .get(&level)
            .map(|list| {
                list.iter()
                    .filter(|l| !scoped || parent_id.is_none() || l.parent_id == parent_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn get_location(&self, level: LocationLevel, id: Uuid) -> RepoResult<Option<Location>> {
        let store = self.store.read().await;
        Ok(store
            .locations
            .get(&level)
            .and_then(|list| list.iter().find(|l| l.id == id).cloned()))
    }

    async fn create_location(
        &self,
        level: LocationLevel,
        request: CreateLocationRequest,
    ) -> RepoResult<Location> {
        let mut store = self.store.write().await;
        if let Some(parent_level) = level.parent() {
            let parent_exists = store.locations.get(&parent_level).is_some_and(|list| {
                list.iter().any(|l| Some(l.id) == request.parent_id)
            });
            if !parent_exists {
                return Err(AppError::conflict(
                    "Referenced record is missing or still in use",
                ));
            }
        }
        let list = store.locations.entry(level).or_default();
        if list
            .iter()
            .any(|l| l.parent_id == request.parent_id && same_name(&l.name, &request.name))
        {
            return Err(AppError::conflict(format!(
                "{} with this name already exists here",
                level.label()
            )));
        }
        let created = Location {
            id: Uuid::new_v4(),
            name: request.name,
            code: request.code,
            parent_id: request.parent_id,
            created_at: Utc::now(),
        };
        list.push(created.clone());
        Ok(created)
    }

    async fn update_location(
        &self,
        level: LocationLevel,
        id: Uuid,
        update: UpdateLocationRequest,
    ) -> RepoResult<Option<Location>> {
        let mut store = self.store.write().await;
        let list = store.locations.entry(level).or_default();
        let Some(parent_id) = list.iter().find(|l| l.id == id).map(|l| l.parent_id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            if list
                .iter()
                .any(|l| l.id != id && l.parent_id == parent_id && same_name(&l.name, name))
            {
                return Err(AppError::conflict(format!(
                    "{} with this name already exists here",
                    level.label()
                )));
            }
        }
        Ok(list.iter_mut().find(|l| l.id == id).map(|l| {
            if let Some(name) = update.name {
                l.name = name;
            }
            if let Some(code) = update.code {
                l.code = Some(code);
            }
            l.clone()
        }))
    }

    async fn delete_location(&self, level: LocationLevel, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if let Some(child) = level.child() {
            let has_children = store
                .locations
                .get(&child)
                .is_some_and(|list| list.iter().any(|l| l.parent_id == Some(id)));
            if has_children {
                return Err(AppError::conflict(format!(
                    "{} still has {} entries",
                    level.label(),
                    child.label().to_lowercase()
                )));
            }
        }
        if store.location_in_use(level, id) {
            return Err(AppError::conflict(
                "Referenced record is missing or still in use",
            ));
        }
        let list = store.locations.entry(level).or_default();
        let before = list.len();
        list.retain(|l| l.id != id);
        Ok(list.len() < before)
    }

    // --- Inventory item types ---

    async fn list_item_types(&self) -> RepoResult<Vec<InventoryItemType>> {
        let store = self.store.read().await;
        let mut types = store.item_types.clone();
        types.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        Ok(types)
    }

    async fn get_item_type(&self, id: Uuid) -> RepoResult<Option<InventoryItemType>> {
        let store = self.store.read().await;
        Ok(store.item_types.iter().find(|t| t.id == id).cloned())
    }

    async fn create_item_type(&self, payload: ItemTypePayload) -> RepoResult<InventoryItemType> {
        let mut store = self.store.write().await;
        if store
            .item_types
            .iter()
            .any(|t| same_name(&t.name, &payload.name))
        {
            return Err(AppError::conflict("Item type with this name already exists"));
        }
        let created = InventoryItemType {
            id: Uuid::new_v4(),
            name: payload.name,
            unit: payload.unit,
            category: payload.category,
            description: payload.description,
            created_at: Utc::now(),
        };
        store.item_types.push(created.clone());
        Ok(created)
    }

    async fn update_item_type(
        &self,
        id: Uuid,
        update: UpdateItemTypePayload,
    ) -> RepoResult<Option<InventoryItemType>> {
        let mut store = self.store.write().await;
        if let Some(name) = &update.name {
            if store
                .item_types
                .iter()
                .any(|t| t.id != id && same_name(&t.name, name))
            {
                return Err(AppError::conflict("Item type with this name already exists"));
            }
        }
        Ok(store.item_types.iter_mut().find(|t| t.id == id).map(|t| {
            if let Some(name) = update.name {
                t.name = name;
            }
            if let Some(unit) = update.unit {
                t.unit = unit;
            }
            if let Some(category) = update.category {
                t.category = category;
            }
            if let Some(description) = update.description {
                t.description = Some(description);
            }
            t.clone()
        }))
    }

    async fn delete_item_type(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.entries.iter().any(|e| e.item_type_id == id) {
            return Err(AppError::conflict("Item type is still held in inventory"));
        }
        let before = store.item_types.len();
        store.item_types.retain(|t| t.id != id);
        Ok(store.item_types.len() < before)
    }

    // --- Inventory entries ---

    async fn list_group_inventory(&self, group_id: Uuid) -> RepoResult<Vec<InventoryEntry>> {
        let store = self.store.read().await;
        let mut entries: Vec<InventoryEntry> = store
            .entries
            .iter()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    async fn search_inventory(&self, filter: &InventoryFilter) -> RepoResult<Vec<InventoryEntry>> {
        let store = self.store.read().await;
        let approved: HashMap<Uuid, &ReliefGroup> = store
            .groups
            .iter()
            .filter(|g| g.status == GroupStatus::Approved)
            .map(|g| (g.id, g))
            .collect();
        let mut entries: Vec<InventoryEntry> = store
            .entries
            .iter()
            .filter(|e| e.availability == Availability::Available && e.quantity > 0)
            .filter(|e| filter.item_type_id.is_none_or(|t| e.item_type_id == t))
            .filter(|e| {
                approved.get(&e.group_id).is_some_and(|g| {
                    filter.state_id.is_none_or(|s| g.state_id == Some(s))
                        && filter.district_id.is_none_or(|d| g.district_id == Some(d))
                })
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    async fn get_inventory_entry(&self, id: Uuid) -> RepoResult<Option<InventoryEntry>> {
        let store = self.store.read().await;
        Ok(store.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn create_inventory_entry(
        &self,
        entry: NewInventoryEntry,
    ) -> RepoResult<InventoryEntry> {
        let mut store = self.store.write().await;
        if !store.item_types.iter().any(|t| t.id == entry.item_type_id) {
            return Err(AppError::conflict(
                "Referenced record is missing or still in use",
            ));
        }
        let now = Utc::now();
        let created = InventoryEntry {
            id: Uuid::new_v4(),
            group_id: entry.group_id,
            item_type_id: entry.item_type_id,
            quantity: entry.quantity,
            availability: entry.availability,
            condition: entry.condition,
            expiry_date: entry.expiry_date,
            village_id: entry.village_id,
            notes: entry.notes,
            created_at: now,
            updated_at: now,
        };
        store.entries.push(created.clone());
        Ok(created)
    }

    async fn update_inventory_entry(
        &self,
        id: Uuid,
        expected_quantity: i32,
        update: EntryUpdate,
    ) -> RepoResult<Option<InventoryEntry>> {
        let mut store = self.store.write().await;
        Ok(store
            .entries
            .iter_mut()
            .find(|e| e.id == id && e.quantity == expected_quantity)
            .map(|e| {
                e.quantity = update.quantity;
                e.availability = update.availability;
                e.condition = update.condition;
                e.expiry_date = update.expiry_date;
                e.village_id = update.village_id;
                e.notes = update.notes;
                e.updated_at = Utc::now();
                e.clone()
            }))
    }

    async fn delete_inventory_entry(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.resupply.iter().any(|r| r.inventory_entry_id == id)
            || store.donations.iter().any(|d| d.inventory_entry_id == id)
        {
            return Err(AppError::conflict(
                "Referenced record is missing or still in use",
            ));
        }
        let before = store.entries.len();
        store.entries.retain(|e| e.id != id);
        Ok(store.entries.len() < before)
    }

    // --- Resupply requests ---

    async fn create_resupply(&self, request: NewResupply) -> RepoResult<ResupplyRequest> {
        let now = Utc::now();
        let created = ResupplyRequest {
            id: Uuid::new_v4(),
            inventory_entry_id: request.inventory_entry_id,
            group_id: request.group_id,
            requested_by: request.requested_by,
            quantity: request.quantity,
            note: request.note,
            status: ResupplyStatus::Pending,
            decision_note: None,
            decided_by: None,
            created_at: now,
            updated_at: now,
        };
        self.store.write().await.resupply.push(created.clone());
        Ok(created)
    }

    async fn get_resupply(&self, id: Uuid) -> RepoResult<Option<ResupplyRequest>> {
        let store = self.store.read().await;
        Ok(store.resupply.iter().find(|r| r.id == id).cloned())
    }

    async fn list_resupply(&self, filter: &ResupplyFilter) -> RepoResult<Vec<ResupplyRequest>> {
        let store = self.store.read().await;
        Ok(store
            .resupply
            .iter()
            .rev()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.group_id.is_none_or(|g| r.group_id == g))
            .cloned()
            .collect())
    }

    async fn transition_resupply(
        &self,
        id: Uuid,
        from: ResupplyStatus,
        to: ResupplyStatus,
        decided_by: Option<Uuid>,
        decision_note: Option<String>,
        stock: Option<StockChange>,
    ) -> RepoResult<Option<ResupplyRequest>> {
        let mut store = self.store.write().await;
        let Some(index) = store
            .resupply
            .iter()
            .position(|r| r.id == id && r.status == from)
        else {
            return Ok(None);
        };
        // Stock first: if it fails nothing has been written.
        if let Some(change) = stock {
            store.apply_stock(change)?;
        }
        let request = &mut store.resupply[index];
        request.status = to;
        if decided_by.is_some() {
            request.decided_by = decided_by;
        }
        if decision_note.is_some() {
            request.decision_note = decision_note;
        }
        request.updated_at = Utc::now();
        Ok(Some(request.clone()))
    }

    // --- Donation offers ---

    async fn create_donation(&self, offer: NewDonation) -> RepoResult<DonationOffer> {
        let now = Utc::now();
        let created = DonationOffer {
            id: Uuid::new_v4(),
            inventory_entry_id: offer.inventory_entry_id,
            group_id: offer.group_id,
            donor_id: offer.donor_id,
            contact_phone: offer.contact_phone,
            quantity: offer.quantity,
            note: offer.note,
            status: DonationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store.write().await.donations.push(created.clone());
        Ok(created)
    }

    async fn get_donation(&self, id: Uuid) -> RepoResult<Option<DonationOffer>> {
        let store = self.store.read().await;
        Ok(store.donations.iter().find(|d| d.id == id).cloned())
    }

    async fn list_donations(
        &self,
        group_id: Option<Uuid>,
        donor_id: Option<Uuid>,
        status: Option<DonationStatus>,
    ) -> RepoResult<Vec<DonationOffer>> {
        let store = self.store.read().await;
        Ok(store
            .donations
            .iter()
            .rev()
            .filter(|d| group_id.is_none_or(|g| d.group_id == g))
            .filter(|d| donor_id.is_none_or(|u| d.donor_id == u))
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect())
    }

    async fn transition_donation(
        &self,
        id: Uuid,
        from: DonationStatus,
        to: DonationStatus,
        stock: Option<StockChange>,
    ) -> RepoResult<Option<DonationOffer>> {
        let mut store = self.store.write().await;
        let Some(index) = store
            .donations
            .iter()
            .position(|d| d.id == id && d.status == from)
        else {
            return Ok(None);
        };
        if let Some(change) = stock {
            store.apply_stock(change)?;
        }
        let offer = &mut store.donations[index];
        offer.status = to;
        offer.updated_at = Utc::now();
        Ok(Some(offer.clone()))
    }

    // --- Service requests ---

    async fn create_service_request(
        &self,
        request: NewServiceRequest,
        day: NaiveDate,
    ) -> RepoResult<ServiceRequest> {
        let mut store = self.store.write().await;
        let sequence = {
            let counter = store.counters.entry(day).or_insert(0);
            *counter += 1;
            *counter
        };
        let now = Utc::now();
        let created = ServiceRequest {
            id: Uuid::new_v4(),
            request_number: workflow::request_number(day, sequence),
            citizen_id: request.citizen_id,
            name: request.name,
            phone: request.phone,
            service_id: request.service_id,
            alert_category_id: request.alert_category_id,
            alert_status_id: None,
            description: request.description,
            people_count: request.people_count,
            village_id: request.village_id,
            address: request.address,
            urgency: request.urgency,
            status: RequestStatus::Pending,
            assigned_group_id: None,
            status_note: None,
            created_at: now,
            updated_at: now,
        };
        store.requests.push(created.clone());
        Ok(created)
    }

    async fn get_service_request(&self, id: Uuid) -> RepoResult<Option<ServiceRequest>> {
        let store = self.store.read().await;
        Ok(store.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn find_request_by_number(&self, number: &str) -> RepoResult<Option<ServiceRequest>> {
        let store = self.store.read().await;
        Ok(store
            .requests
            .iter()
            .find(|r| r.request_number == number)
            .cloned())
    }

    async fn list_service_requests(
        &self,
        filter: &RequestFilter,
    ) -> RepoResult<Vec<ServiceRequest>> {
        let store = self.store.read().await;
        Ok(store
            .requests
            .iter()
            .rev()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.service_id.is_none_or(|s| r.service_id == s))
            .filter(|r| {
                filter
                    .assigned_group_id
                    .is_none_or(|g| r.assigned_group_id == Some(g))
            })
            .filter(|r| filter.village_id.is_none_or(|v| r.village_id == Some(v)))
            .filter(|r| filter.urgency.is_none_or(|u| r.urgency == u))
            .cloned()
            .collect())
    }

    async fn list_citizen_requests(&self, citizen_id: Uuid) -> RepoResult<Vec<ServiceRequest>> {
        let store = self.store.read().await;
        Ok(store
            .requests
            .iter()
            .rev()
            .filter(|r| r.citizen_id == Some(citizen_id))
            .cloned()
            .collect())
    }

    async fn list_provider_requests(
        &self,
        group_id: Uuid,
        service_ids: &[Uuid],
    ) -> RepoResult<Vec<ServiceRequest>> {
        let store = self.store.read().await;
        Ok(store
            .requests
            .iter()
            .rev()
            .filter(|r| {
                r.assigned_group_id == Some(group_id)
                    || (r.status == RequestStatus::Pending && service_ids.contains(&r.service_id))
            })
            .cloned()
            .collect())
    }

    async fn transition_service_request(
        &self,
        id: Uuid,
        transition: RequestTransition,
    ) -> RepoResult<Option<ServiceRequest>> {
        let mut store = self.store.write().await;
        Ok(store
            .requests
            .iter_mut()
            .find(|r| r.id == id && r.status == transition.from)
            .map(|r| {
                r.status = transition.to;
                if let Some(group) = transition.assigned_group {
                    r.assigned_group_id = group;
                }
                if transition.note.is_some() {
                    r.status_note = transition.note;
                }
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn set_request_alert_status(
        &self,
        id: Uuid,
        alert_status_id: Option<Uuid>,
    ) -> RepoResult<Option<ServiceRequest>> {
        let mut store = self.store.write().await;
        Ok(store.requests.iter_mut().find(|r| r.id == id).map(|r| {
            r.alert_status_id = alert_status_id;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    // --- Audit & dashboard ---

    async fn insert_audit(&self, entry: NewAuditLog) -> RepoResult<()> {
        let log = AuditLog {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            created_at: Utc::now(),
        };
        self.store.write().await.audit.push(log);
        Ok(())
    }

    async fn list_audit(&self, filter: &AuditFilter) -> RepoResult<Vec<AuditLog>> {
        let store = self.store.read().await;
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        Ok(store
            .audit
            .iter()
            .rev()
            .filter(|a| {
                filter
                    .entity_type
                    .as_deref()
                    .is_none_or(|t| a.entity_type == t)
            })
            .filter(|a| filter.entity_id.is_none_or(|id| a.entity_id == Some(id)))
            .filter(|a| filter.actor_id.is_none_or(|id| a.actor_id == Some(id)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let store = self.store.read().await;
        let count = |n: usize| n as i64;
        Ok(AdminDashboardStats {
            total_users: count(store.users.len()),
            pending_groups: count(
                store
                    .groups
                    .iter()
                    .filter(|g| g.status == GroupStatus::Pending)
                    .count(),
            ),
            approved_groups: count(
                store
                    .groups
                    .iter()
                    .filter(|g| g.status == GroupStatus::Approved)
                    .count(),
            ),
            open_requests: count(
                store
                    .requests
                    .iter()
                    .filter(|r| {
                        matches!(
                            r.status,
                            RequestStatus::Pending | RequestStatus::Assigned | RequestStatus::InProgress
                        )
                    })
                    .count(),
            ),
            completed_requests: count(
                store
                    .requests
                    .iter()
                    .filter(|r| r.status == RequestStatus::Completed)
                    .count(),
            ),
            inventory_entries: count(store.entries.len()),
            pending_resupply_requests: count(
                store
                    .resupply
                    .iter()
                    .filter(|r| r.status == ResupplyStatus::Pending)
                    .count(),
            ),
            pending_donation_offers: count(
                store
                    .donations
                    .iter()
                    .filter(|d| d.status == DonationStatus::Pending)
                    .count(),
            ),
        })
    }
}
