use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, query_builder::QueryBuilder};
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
    OtpRequest, PasswordReset, ReliefGroup, RequestFilter, RequestTransition, ResupplyFilter,
    ResupplyRequest, ResupplyStatus, ServiceRequest, Session, StockChange, UpdateCatalogPayload,
    UpdateGroupRequest, UpdateItemTypePayload, UpdateLocationRequest, User, UserRole,
};
use crate::validation::MAX_QUANTITY;
use crate::{otp, workflow};

const USER_COLUMNS: &str =
    "id, name, email, phone, password_hash, role, is_active, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token_hash, user_agent, created_at, expires_at, revoked_at, last_used_at";
const RESET_COLUMNS: &str = "id, user_id, token_hash, expires_at, used_at, created_at";
const OTP_COLUMNS: &str =
    "id, phone, purpose, code_hash, attempts, created_at, expires_at, verified_at, consumed_at";
const GROUP_COLUMNS: &str = "id, owner_id, name, kind, description, contact_phone, contact_email, \
     address, state_id, district_id, service_ids, status, status_reason, approved_at, created_at, updated_at";
const REPRESENTATIVE_COLUMNS: &str =
    "id, group_id, user_id, name, phone, email, designation, phone_verified_at, created_at";
const DOCUMENT_COLUMNS: &str =
    "id, group_id, kind, file_name, content_type, storage_key, uploaded_by, created_at";
const CATALOG_COLUMNS: &str = "id, name, description, is_active, created_at";
const ITEM_TYPE_COLUMNS: &str = "id, name, unit, category, description, created_at";
const ENTRY_COLUMNS: &str = "id, group_id, item_type_id, quantity, availability, condition, \
     expiry_date, village_id, notes, created_at, updated_at";
const RESUPPLY_COLUMNS: &str = "id, inventory_entry_id, group_id, requested_by, quantity, note, \
     status, decision_note, decided_by, created_at, updated_at";
const DONATION_COLUMNS: &str = "id, inventory_entry_id, group_id, donor_id, contact_phone, \
     quantity, note, status, created_at, updated_at";
const REQUEST_COLUMNS: &str = "id, request_number, citizen_id, name, phone, service_id, \
     alert_category_id, alert_status_id, description, people_count, village_id, address, urgency, \
     status, assigned_group_id, status_note, created_at, updated_at";
const AUDIT_COLUMNS: &str =
    "id, actor_id, action, entity_type, entity_id, details, created_at";

/// Column list of a location table, exposing the parent foreign key as `parent_id`.
fn location_columns(level: LocationLevel) -> String {
    match level.parent_column() {
        Some(parent) => format!("id, name, code, {} AS parent_id, created_at", parent),
        None => "id, name, code, NULL::uuid AS parent_id, created_at".to_string(),
    }
}

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL. Multi-row changes (registration, status
/// moves with stock, request numbering) run in a single transaction; status moves
/// are guarded by `WHERE status = <expected>`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations in `./migrations`.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Adds `delta` to an entry's stock inside `tx`, keeping availability in line with
/// `workflow::availability_after`. Fails with a conflict when the result would
/// leave `0..=MAX_QUANTITY`.
async fn apply_stock_change(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    change: StockChange,
) -> RepoResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_entries
        SET quantity = quantity + $2,
            availability = CASE
                WHEN quantity + $2 = 0 THEN 'unavailable'::availability
                WHEN quantity = 0 AND availability = 'unavailable' THEN 'available'::availability
                ELSE availability
            END,
            updated_at = NOW()
        WHERE id = $1 AND quantity + $2 BETWEEN 0 AND $3
        "#,
    )
    .bind(change.entry_id)
    .bind(change.delta)
    .bind(MAX_QUANTITY)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict(
            "Stock change would leave the allowed range",
        ));
    }
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, phone, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.phone)
            .bind(user.password_hash)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = LOWER($1)", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_phone(&self, phone: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE phone = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, role: Option<UserRole>) -> RepoResult<Vec<User>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
        if let Some(role) = role {
            builder.push(" WHERE role = ");
            builder.push_bind(role);
        }
        builder.push(" ORDER BY created_at DESC");
        Ok(builder.build_query_as::<User>().fetch_all(&self.pool).await?)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User"));
        }
        Ok(())
    }

    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- SESSIONS ---

    async fn create_session(&self, session: NewSession) -> RepoResult<Session> {
        let sql = format!(
            "INSERT INTO sessions (id, user_id, refresh_token_hash, user_agent, expires_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(session.refresh_token_hash)
            .bind(session.user_agent)
            .bind(session.expires_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_session(&self, id: Uuid) -> RepoResult<Option<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS);
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_session_by_refresh_hash(&self, hash: &str) -> RepoResult<Option<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE refresh_token_hash = $1",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// rotate_session
    ///
    /// Compare-and-set on the stored hash: of two concurrent refreshes with the same
    /// token, only the first UPDATE matches.
    async fn rotate_session(
        &self,
        id: Uuid,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET refresh_token_hash = $3, expires_at = $4, last_used_at = NOW()
            WHERE id = $1 AND refresh_token_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(old_hash)
        .bind(new_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_session(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_sessions(&self, user_id: Uuid, keep: Option<Uuid>) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET revoked_at = NOW()
            WHERE user_id = $1 AND revoked_at IS NULL AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // --- PASSWORD RESETS ---

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<PasswordReset> {
        let sql = format!(
            "INSERT INTO password_resets (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            RESET_COLUMNS
        );
        Ok(sqlx::query_as::<_, PasswordReset>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?)
    }

    /// consume_password_reset
    ///
    /// Burns the presented token and, in the same transaction, every other
    /// outstanding token of that user.
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<PasswordReset>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE password_resets SET used_at = $2 \
             WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2 RETURNING {}",
            RESET_COLUMNS
        );
        let consumed = sqlx::query_as::<_, PasswordReset>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(reset) = &consumed {
            sqlx::query(
                "UPDATE password_resets SET used_at = $2 WHERE user_id = $1 AND used_at IS NULL",
            )
            .bind(reset.user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(consumed)
    }

    // --- OTP ---

    /// issue_otp
    ///
    /// A transaction-scoped advisory lock keyed on phone and purpose keeps two
    /// concurrent sends from both passing the cooldown and quota check.
    async fn issue_otp(
        &self,
        otp: NewOtp,
        policy: &OtpPolicy,
        now: DateTime<Utc>,
    ) -> RepoResult<OtpRequest> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("otp:{}:{:?}", otp.phone, otp.purpose))
            .execute(&mut *tx)
            .await?;

        let recent_sql = format!(
            "SELECT {} FROM otp_requests WHERE phone = $1 AND purpose = $2 AND created_at > $3 \
             ORDER BY created_at DESC",
            OTP_COLUMNS
        );
        let recent = sqlx::query_as::<_, OtpRequest>(&recent_sql)
            .bind(&otp.phone)
            .bind(otp.purpose)
            .bind(now - chrono::Duration::seconds(policy.window_secs))
            .fetch_all(&mut *tx)
            .await?;
        otp::check_send_allowed(policy, &recent, now)?;

        let insert_sql = format!(
            "INSERT INTO otp_requests (id, phone, purpose, code_hash, expires_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            OTP_COLUMNS
        );
        let created = sqlx::query_as::<_, OtpRequest>(&insert_sql)
            .bind(Uuid::new_v4())
            .bind(otp.phone)
            .bind(otp.purpose)
            .bind(otp.code_hash)
            .bind(otp.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn latest_otp(&self, phone: &str, purpose: OtpPurpose) -> RepoResult<Option<OtpRequest>> {
        let sql = format!(
            "SELECT {} FROM otp_requests WHERE phone = $1 AND purpose = $2 \
             ORDER BY created_at DESC LIMIT 1",
            OTP_COLUMNS
        );
        Ok(sqlx::query_as::<_, OtpRequest>(&sql)
            .bind(phone)
            .bind(purpose)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn reserve_otp_attempt(&self, id: Uuid, max_attempts: i32) -> RepoResult<Option<i32>> {
        let row = sqlx::query(
            "UPDATE otp_requests SET attempts = attempts + 1 \
             WHERE id = $1 AND attempts < $2 AND verified_at IS NULL AND consumed_at IS NULL \
             RETURNING attempts",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i32, _>("attempts")))
    }

    async fn mark_otp_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE otp_requests SET verified_at = $2 \
             WHERE id = $1 AND verified_at IS NULL AND consumed_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- RELIEF GROUPS ---

    /// register_group
    ///
    /// One transaction: lock and consume the verified code, then insert the provider
    /// account, the group and the representative. Any failure (duplicate email or
    /// phone included) rolls the code consumption back too.
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

        let mut tx = self.pool.begin().await?;

        let otp_sql = format!(
            "SELECT {} FROM otp_requests \
             WHERE phone = $1 AND purpose = $2 AND verified_at IS NOT NULL \
               AND verified_at >= $3 AND consumed_at IS NULL \
             ORDER BY verified_at DESC LIMIT 1 FOR UPDATE",
            OTP_COLUMNS
        );
        let otp = sqlx::query_as::<_, OtpRequest>(&otp_sql)
            .bind(&representative.phone)
            .bind(OtpPurpose::GroupRegistration)
            .bind(verified_since)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest("Representative phone number is not verified".to_string())
            })?;

        sqlx::query("UPDATE otp_requests SET consumed_at = NOW() WHERE id = $1")
            .bind(otp.id)
            .execute(&mut *tx)
            .await?;

        let user_sql = format!(
            "INSERT INTO users (id, name, email, phone, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        );
        let owner = sqlx::query_as::<_, User>(&user_sql)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.phone)
            .bind(user.password_hash)
            .bind(user.role)
            .fetch_one(&mut *tx)
            .await?;

        let group_sql = format!(
            "INSERT INTO relief_groups (id, owner_id, name, kind, description, contact_phone, \
             contact_email, address, state_id, district_id, service_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
            GROUP_COLUMNS
        );
        let created = sqlx::query_as::<_, ReliefGroup>(&group_sql)
            .bind(Uuid::new_v4())
            .bind(owner.id)
            .bind(group.name)
            .bind(group.kind)
            .bind(group.description)
            .bind(group.contact_phone)
            .bind(group.contact_email)
            .bind(group.address)
            .bind(group.state_id)
            .bind(group.district_id)
            .bind(group.service_ids)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO group_representatives \
             (id, group_id, user_id, name, phone, email, designation, phone_verified_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(created.id)
        .bind(owner.id)
        .bind(representative.name)
        .bind(representative.phone)
        .bind(representative.email)
        .bind(representative.designation)
        .bind(otp.verified_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created, owner))
    }

    async fn get_group(&self, id: Uuid) -> RepoResult<Option<ReliefGroup>> {
        let sql = format!("SELECT {} FROM relief_groups WHERE id = $1", GROUP_COLUMNS);
        Ok(sqlx::query_as::<_, ReliefGroup>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_group_by_owner(&self, owner_id: Uuid) -> RepoResult<Option<ReliefGroup>> {
        let sql = format!(
            "SELECT {} FROM relief_groups WHERE owner_id = $1",
            GROUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, ReliefGroup>(&sql)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_groups(&self, filter: &GroupFilter) -> RepoResult<Vec<ReliefGroup>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM relief_groups WHERE TRUE",
            GROUP_COLUMNS
        ));
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(state_id) = filter.state_id {
            builder.push(" AND state_id = ");
            builder.push_bind(state_id);
        }
        if let Some(district_id) = filter.district_id {
            builder.push(" AND district_id = ");
            builder.push_bind(district_id);
        }
        if let Some(service_id) = filter.service_id {
            builder.push(" AND ");
            builder.push_bind(service_id);
            builder.push(" = ANY(service_ids)");
        }
        builder.push(" ORDER BY name ASC");
        Ok(builder
            .build_query_as::<ReliefGroup>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// update_group
    ///
    /// Partial update via `COALESCE`: a `None` field keeps the stored value.
    async fn update_group(
        &self,
        id: Uuid,
        update: UpdateGroupRequest,
    ) -> RepoResult<Option<ReliefGroup>> {
        let sql = format!(
            r#"
            UPDATE relief_groups
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                contact_phone = COALESCE($4, contact_phone),
                contact_email = COALESCE($5, contact_email),
                address = COALESCE($6, address),
                service_ids = COALESCE($7, service_ids),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            GROUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, ReliefGroup>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.description)
            .bind(update.contact_phone)
            .bind(update.contact_email)
            .bind(update.address)
            .bind(update.service_ids)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_group_status(
        &self,
        id: Uuid,
        from: GroupStatus,
        to: GroupStatus,
        reason: Option<String>,
    ) -> RepoResult<Option<ReliefGroup>> {
        let sql = format!(
            r#"
            UPDATE relief_groups
            SET status = $3,
                status_reason = $4,
                approved_at = CASE WHEN $5 THEN NOW() ELSE approved_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            GROUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, ReliefGroup>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(reason)
            .bind(to == GroupStatus::Approved)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_representatives(&self, group_id: Uuid) -> RepoResult<Vec<GroupRepresentative>> {
        let sql = format!(
            "SELECT {} FROM group_representatives WHERE group_id = $1 ORDER BY created_at",
            REPRESENTATIVE_COLUMNS
        );
        Ok(sqlx::query_as::<_, GroupRepresentative>(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_document(&self, document: NewDocument) -> RepoResult<Document> {
        let sql = format!(
            "INSERT INTO documents (id, group_id, kind, file_name, content_type, storage_key, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            DOCUMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(Uuid::new_v4())
            .bind(document.group_id)
            .bind(document.kind)
            .bind(document.file_name)
            .bind(document.content_type)
            .bind(document.storage_key)
            .bind(document.uploaded_by)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_documents(&self, group_id: Uuid) -> RepoResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE group_id = $1 ORDER BY created_at",
            DOCUMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_document(&self, id: Uuid) -> RepoResult<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- CATALOGS ---
    // Table names come from `CatalogKind::table`, never from user input.

    async fn list_catalog(
        &self,
        kind: CatalogKind,
        include_inactive: bool,
    ) -> RepoResult<Vec<CatalogEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE ($1 OR is_active) ORDER BY name",
            CATALOG_COLUMNS,
            kind.table()
        );
        Ok(sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_catalog_entry(
        &self,
        kind: CatalogKind,
        id: Uuid,
    ) -> RepoResult<Option<CatalogEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            CATALOG_COLUMNS,
            kind.table()
        );
        Ok(sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_catalog_entry(
        &self,
        kind: CatalogKind,
        payload: CatalogPayload,
    ) -> RepoResult<CatalogEntry> {
        let sql = format!(
            "INSERT INTO {} (id, name, description, is_active) VALUES ($1, $2, $3, $4) RETURNING {}",
            kind.table(),
            CATALOG_COLUMNS
        );
        Ok(sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(payload.name)
            .bind(payload.description)
            .bind(payload.is_active)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_catalog_entry(
        &self,
        kind: CatalogKind,
        id: Uuid,
        update: UpdateCatalogPayload,
    ) -> RepoResult<Option<CatalogEntry>> {
        let sql = format!(
            "UPDATE {} SET name = COALESCE($2, name), description = COALESCE($3, description), \
             is_active = COALESCE($4, is_active) WHERE id = $1 RETURNING {}",
            kind.table(),
            CATALOG_COLUMNS
        );
        Ok(sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.description)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_catalog_entry(&self, kind: CatalogKind, id: Uuid) -> RepoResult<bool> {
        // Offered services are an array column without a foreign key.
        if kind == CatalogKind::Services {
            let offered: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM relief_groups WHERE $1 = ANY(service_ids))",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            if offered {
                return Err(AppError::conflict(
                    "Service is still offered by a relief group",
                ));
            }
        }
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // --- LOCATIONS ---

    async fn list_locations(
        &self,
        level: LocationLevel,
        parent_id: Option<Uuid>,
    ) -> RepoResult<Vec<Location>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {}",
            location_columns(level),
            level.table()
        ));
        if let (Some(column), Some(parent_id)) = (level.parent_column(), parent_id) {
            builder.push(format!(" WHERE {} = ", column));
            builder.push_bind(parent_id);
        }
        builder.push(" ORDER BY name");
        Ok(builder.build_query_as::<Location>().fetch_all(&self.pool).await?)
    }

    async fn get_location(&self, level: LocationLevel, id: Uuid) -> RepoResult<Option<Location>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            location_columns(level),
            level.table()
        );
        Ok(sqlx::query_as::<_, Location>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_location(
        &self,
        level: LocationLevel,
        request: CreateLocationRequest,
    ) -> RepoResult<Location> {
        let created = match level.parent_column() {
            Some(parent) => {
                let sql = format!(
                    "INSERT INTO {} (id, {}, name, code) VALUES ($1, $2, $3, $4) RETURNING {}",
                    level.table(),
                    parent,
                    location_columns(level)
                );
                sqlx::query_as::<_, Location>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(request.parent_id)
                    .bind(request.name)
                    .bind(request.code)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "INSERT INTO {} (id, name, code) VALUES ($1, $2, $3) RETURNING {}",
                    level.table(),
                    location_columns(level)
                );
                sqlx::query_as::<_, Location>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(request.name)
                    .bind(request.code)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(created)
    }

    async fn update_location(
        &self,
        level: LocationLevel,
        id: Uuid,
        update: UpdateLocationRequest,
    ) -> RepoResult<Option<Location>> {
        let sql = format!(
            "UPDATE {} SET name = COALESCE($2, name), code = COALESCE($3, code) \
             WHERE id = $1 RETURNING {}",
            level.table(),
            location_columns(level)
        );
        Ok(sqlx::query_as::<_, Location>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_location(&self, level: LocationLevel, id: Uuid) -> RepoResult<bool> {
        if let Some(child) = level.child() {
            let column = child.parent_column().unwrap_or("id");
            let sql = format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
                child.table(),
                column
            );
            let has_children: bool = sqlx::query_scalar(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            if has_children {
                return Err(AppError::conflict(format!(
                    "{} still has {} entries",
                    level.label(),
                    child.label().to_lowercase()
                )));
            }
        }
        let sql = format!("DELETE FROM {} WHERE id = $1", level.table());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // --- INVENTORY ITEM TYPES ---

    async fn list_item_types(&self) -> RepoResult<Vec<InventoryItemType>> {
        let sql = format!(
            "SELECT {} FROM inventory_item_types ORDER BY category, name",
            ITEM_TYPE_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryItemType>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_item_type(&self, id: Uuid) -> RepoResult<Option<InventoryItemType>> {
        let sql = format!(
            "SELECT {} FROM inventory_item_types WHERE id = $1",
            ITEM_TYPE_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryItemType>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_item_type(&self, payload: ItemTypePayload) -> RepoResult<InventoryItemType> {
        let sql = format!(
            "INSERT INTO inventory_item_types (id, name, unit, category, description) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ITEM_TYPE_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryItemType>(&sql)
            .bind(Uuid::new_v4())
            .bind(payload.name)
            .bind(payload.unit)
            .bind(payload.category)
            .bind(payload.description)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_item_type(
        &self,
        id: Uuid,
        update: UpdateItemTypePayload,
    ) -> RepoResult<Option<InventoryItemType>> {
        let sql = format!(
            "UPDATE inventory_item_types SET name = COALESCE($2, name), unit = COALESCE($3, unit), \
             category = COALESCE($4, category), description = COALESCE($5, description) \
             WHERE id = $1 RETURNING {}",
            ITEM_TYPE_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryItemType>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.unit)
            .bind(update.category)
            .bind(update.description)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_item_type(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM inventory_item_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- INVENTORY ENTRIES ---

    async fn list_group_inventory(&self, group_id: Uuid) -> RepoResult<Vec<InventoryEntry>> {
        let sql = format!(
            "SELECT {} FROM inventory_entries WHERE group_id = $1 ORDER BY updated_at DESC",
            ENTRY_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryEntry>(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// search_inventory
    ///
    /// Public stock search. Strictly limited to available, non-empty entries of
    /// approved groups; location filters apply to the holding group.
    async fn search_inventory(&self, filter: &InventoryFilter) -> RepoResult<Vec<InventoryEntry>> {
        let columns = ENTRY_COLUMNS
            .split(", ")
            .map(|c| format!("e.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM inventory_entries e JOIN relief_groups g ON g.id = e.group_id \
             WHERE g.status = 'approved' AND e.availability = 'available' AND e.quantity > 0",
            columns
        ));
        if let Some(item_type_id) = filter.item_type_id {
            builder.push(" AND e.item_type_id = ");
            builder.push_bind(item_type_id);
        }
        if let Some(state_id) = filter.state_id {
            builder.push(" AND g.state_id = ");
            builder.push_bind(state_id);
        }
        if let Some(district_id) = filter.district_id {
            builder.push(" AND g.district_id = ");
            builder.push_bind(district_id);
        }
        builder.push(" ORDER BY e.updated_at DESC");
        Ok(builder
            .build_query_as::<InventoryEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_inventory_entry(&self, id: Uuid) -> RepoResult<Option<InventoryEntry>> {
        let sql = format!(
            "SELECT {} FROM inventory_entries WHERE id = $1",
            ENTRY_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_inventory_entry(
        &self,
        entry: NewInventoryEntry,
    ) -> RepoResult<InventoryEntry> {
        let sql = format!(
            "INSERT INTO inventory_entries (id, group_id, item_type_id, quantity, availability, \
             condition, expiry_date, village_id, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            ENTRY_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(entry.group_id)
            .bind(entry.item_type_id)
            .bind(entry.quantity)
            .bind(entry.availability)
            .bind(entry.condition)
            .bind(entry.expiry_date)
            .bind(entry.village_id)
            .bind(entry.notes)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_inventory_entry(
        &self,
        id: Uuid,
        expected_quantity: i32,
        update: EntryUpdate,
    ) -> RepoResult<Option<InventoryEntry>> {
        let sql = format!(
            "UPDATE inventory_entries SET quantity = $3, availability = $4, condition = $5, \
             expiry_date = $6, village_id = $7, notes = $8, updated_at = NOW() \
             WHERE id = $1 AND quantity = $2 RETURNING {}",
            ENTRY_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryEntry>(&sql)
            .bind(id)
            .bind(expected_quantity)
            .bind(update.quantity)
            .bind(update.availability)
            .bind(update.condition)
            .bind(update.expiry_date)
            .bind(update.village_id)
            .bind(update.notes)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_inventory_entry(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM inventory_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- RESUPPLY ---

    async fn create_resupply(&self, request: NewResupply) -> RepoResult<ResupplyRequest> {
        let sql = format!(
            "INSERT INTO resupply_requests (id, inventory_entry_id, group_id, requested_by, quantity, note) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            RESUPPLY_COLUMNS
        );
        Ok(sqlx::query_as::<_, ResupplyRequest>(&sql)
            .bind(Uuid::new_v4())
            .bind(request.inventory_entry_id)
            .bind(request.group_id)
            .bind(request.requested_by)
            .bind(request.quantity)
            .bind(request.note)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_resupply(&self, id: Uuid) -> RepoResult<Option<ResupplyRequest>> {
        let sql = format!(
            "SELECT {} FROM resupply_requests WHERE id = $1",
            RESUPPLY_COLUMNS
        );
        Ok(sqlx::query_as::<_, ResupplyRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_resupply(&self, filter: &ResupplyFilter) -> RepoResult<Vec<ResupplyRequest>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM resupply_requests WHERE TRUE",
            RESUPPLY_COLUMNS
        ));
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(group_id) = filter.group_id {
            builder.push(" AND group_id = ");
            builder.push_bind(group_id);
        }
        builder.push(" ORDER BY created_at DESC");
        Ok(builder
            .build_query_as::<ResupplyRequest>()
            .fetch_all(&self.pool)
            .await?)
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
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE resupply_requests SET status = $3, decided_by = COALESCE($4, decided_by), \
             decision_note = COALESCE($5, decision_note), updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {}",
            RESUPPLY_COLUMNS
        );
        let updated = sqlx::query_as::<_, ResupplyRequest>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(decided_by)
            .bind(decision_note)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(updated) = updated else {
            return Ok(None);
        };
        if let Some(change) = stock {
            apply_stock_change(&mut tx, change).await?;
        }
        tx.commit().await?;
        Ok(Some(updated))
    }

    // --- DONATIONS ---

    async fn create_donation(&self, offer: NewDonation) -> RepoResult<DonationOffer> {
        let sql = format!(
            "INSERT INTO donation_offers (id, inventory_entry_id, group_id, donor_id, contact_phone, quantity, note) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            DONATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, DonationOffer>(&sql)
            .bind(Uuid::new_v4())
            .bind(offer.inventory_entry_id)
            .bind(offer.group_id)
            .bind(offer.donor_id)
            .bind(offer.contact_phone)
            .bind(offer.quantity)
            .bind(offer.note)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_donation(&self, id: Uuid) -> RepoResult<Option<DonationOffer>> {
        let sql = format!(
            "SELECT {} FROM donation_offers WHERE id = $1",
            DONATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, DonationOffer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_donations(
        &self,
        group_id: Option<Uuid>,
        donor_id: Option<Uuid>,
        status: Option<DonationStatus>,
    ) -> RepoResult<Vec<DonationOffer>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM donation_offers WHERE TRUE",
            DONATION_COLUMNS
        ));
        if let Some(group_id) = group_id {
            builder.push(" AND group_id = ");
            builder.push_bind(group_id);
        }
        if let Some(donor_id) = donor_id {
            builder.push(" AND donor_id = ");
            builder.push_bind(donor_id);
        }
        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        builder.push(" ORDER BY created_at DESC");
        Ok(builder
            .build_query_as::<DonationOffer>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn transition_donation(
        &self,
        id: Uuid,
        from: DonationStatus,
        to: DonationStatus,
        stock: Option<StockChange>,
    ) -> RepoResult<Option<DonationOffer>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE donation_offers SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {}",
            DONATION_COLUMNS
        );
        let updated = sqlx::query_as::<_, DonationOffer>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(updated) = updated else {
            return Ok(None);
        };
        if let Some(change) = stock {
            apply_stock_change(&mut tx, change).await?;
        }
        tx.commit().await?;
        Ok(Some(updated))
    }

    // --- SERVICE REQUESTS ---

    /// create_service_request
    ///
    /// Draws the next daily sequence from `request_counters` with an upsert, which
    /// serializes concurrent submissions on the counter row, then inserts the
    /// request in the same transaction.
    async fn create_service_request(
        &self,
        request: NewServiceRequest,
        day: NaiveDate,
    ) -> RepoResult<ServiceRequest> {
        let mut tx = self.pool.begin().await?;

        let sequence: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO request_counters (day, last_value) VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET last_value = request_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(day)
        .fetch_one(&mut *tx)
        .await?;
        let sequence = u32::try_from(sequence)
            .map_err(|_| AppError::Internal(format!("Invalid request counter {}", sequence)))?;

        let sql = format!(
            "INSERT INTO service_requests (id, request_number, citizen_id, name, phone, service_id, \
             alert_category_id, description, people_count, village_id, address, urgency) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {}",
            REQUEST_COLUMNS
        );
        let created = sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(Uuid::new_v4())
            .bind(workflow::request_number(day, sequence))
            .bind(request.citizen_id)
            .bind(request.name)
            .bind(request.phone)
            .bind(request.service_id)
            .bind(request.alert_category_id)
            .bind(request.description)
            .bind(request.people_count)
            .bind(request.village_id)
            .bind(request.address)
            .bind(request.urgency)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_service_request(&self, id: Uuid) -> RepoResult<Option<ServiceRequest>> {
        let sql = format!(
            "SELECT {} FROM service_requests WHERE id = $1",
            REQUEST_COLUMNS
        );
        Ok(sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_request_by_number(&self, number: &str) -> RepoResult<Option<ServiceRequest>> {
        let sql = format!(
            "SELECT {} FROM service_requests WHERE request_number = $1",
            REQUEST_COLUMNS
        );
        Ok(sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_service_requests(
        &self,
        filter: &RequestFilter,
    ) -> RepoResult<Vec<ServiceRequest>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM service_requests WHERE TRUE",
            REQUEST_COLUMNS
        ));
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(service_id) = filter.service_id {
            builder.push(" AND service_id = ");
            builder.push_bind(service_id);
        }
        if let Some(group_id) = filter.assigned_group_id {
            builder.push(" AND assigned_group_id = ");
            builder.push_bind(group_id);
        }
        if let Some(village_id) = filter.village_id {
            builder.push(" AND village_id = ");
            builder.push_bind(village_id);
        }
        if let Some(urgency) = filter.urgency {
            builder.push(" AND urgency = ");
            builder.push_bind(urgency);
        }
        builder.push(" ORDER BY created_at DESC");
        Ok(builder
            .build_query_as::<ServiceRequest>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_citizen_requests(&self, citizen_id: Uuid) -> RepoResult<Vec<ServiceRequest>> {
        let sql = format!(
            "SELECT {} FROM service_requests WHERE citizen_id = $1 ORDER BY created_at DESC",
            REQUEST_COLUMNS
        );
        Ok(sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(citizen_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_provider_requests(
        &self,
        group_id: Uuid,
        service_ids: &[Uuid],
    ) -> RepoResult<Vec<ServiceRequest>> {
        let sql = format!(
            "SELECT {} FROM service_requests \
             WHERE assigned_group_id = $1 OR (status = 'pending' AND service_id = ANY($2)) \
             ORDER BY created_at DESC",
            REQUEST_COLUMNS
        );
        Ok(sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(group_id)
            .bind(service_ids.to_vec())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn transition_service_request(
        &self,
        id: Uuid,
        transition: RequestTransition,
    ) -> RepoResult<Option<ServiceRequest>> {
        let sql = format!(
            r#"
            UPDATE service_requests
            SET status = $3,
                assigned_group_id = CASE WHEN $4 THEN $5 ELSE assigned_group_id END,
                status_note = COALESCE($6, status_note),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        Ok(sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(id)
            .bind(transition.from)
            .bind(transition.to)
            .bind(transition.assigned_group.is_some())
            .bind(transition.assigned_group.flatten())
            .bind(transition.note)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_request_alert_status(
        &self,
        id: Uuid,
        alert_status_id: Option<Uuid>,
    ) -> RepoResult<Option<ServiceRequest>> {
        let sql = format!(
            "UPDATE service_requests SET alert_status_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            REQUEST_COLUMNS
        );
        Ok(sqlx::query_as::<_, ServiceRequest>(&sql)
            .bind(id)
            .bind(alert_status_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- AUDIT & DASHBOARD ---

    async fn insert_audit(&self, entry: NewAuditLog) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, details) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(&self, filter: &AuditFilter) -> RepoResult<Vec<AuditLog>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM audit_logs WHERE TRUE",
            AUDIT_COLUMNS
        ));
        if let Some(entity_type) = &filter.entity_type {
            builder.push(" AND entity_type = ");
            builder.push_bind(entity_type.clone());
        }
        if let Some(entity_id) = filter.entity_id {
            builder.push(" AND entity_id = ");
            builder.push_bind(entity_id);
        }
        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ");
            builder.push_bind(actor_id);
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(filter.effective_limit());
        Ok(builder.build_query_as::<AuditLog>().fetch_all(&self.pool).await?)
    }

    /// get_stats
    ///
    /// All dashboard counters in a single round trip.
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM relief_groups WHERE status = 'pending') AS pending_groups,
                (SELECT COUNT(*) FROM relief_groups WHERE status = 'approved') AS approved_groups,
                (SELECT COUNT(*) FROM service_requests
                    WHERE status IN ('pending', 'assigned', 'in_progress')) AS open_requests,
                (SELECT COUNT(*) FROM service_requests WHERE status = 'completed') AS completed_requests,
                (SELECT COUNT(*) FROM inventory_entries) AS inventory_entries,
                (SELECT COUNT(*) FROM resupply_requests WHERE status = 'pending') AS pending_resupply_requests,
                (SELECT COUNT(*) FROM donation_offers WHERE status = 'pending') AS pending_donation_offers
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminDashboardStats {
            total_users: row.try_get("total_users")?,
            pending_groups: row.try_get("pending_groups")?,
            approved_groups: row.try_get("approved_groups")?,
            open_requests: row.try_get("open_requests")?,
            completed_requests: row.try_get("completed_requests")?,
            inventory_entries: row.try_get("inventory_entries")?,
            pending_resupply_requests: row.try_get("pending_resupply_requests")?,
            pending_donation_offers: row.try_get("pending_donation_offers")?,
        })
    }
}
