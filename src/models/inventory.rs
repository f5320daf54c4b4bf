use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::validation::{self, Validate};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "availability", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Availability {
    #[default]
    Available,
    Reserved,
    Unavailable,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "item_condition", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ItemCondition {
    New,
    #[default]
    Good,
    Fair,
    Damaged,
    Expired,
}

/// ResupplyStatus
///
/// pending → approved | rejected | cancelled, approved → fulfilled | cancelled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "resupply_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ResupplyStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Fulfilled,
    Cancelled,
}

/// DonationStatus
///
/// pending → accepted | rejected | cancelled, accepted → received | cancelled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "donation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DonationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct InventoryItemType {
    pub id: Uuid,
    pub name: String,
    /// Counting unit, e.g. "kg", "litre", "box".
    pub unit: String,
    pub category: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ItemTypePayload {
    pub name: String,
    pub unit: String,
    pub category: String,
    pub description: Option<String>,
}

impl Validate for ItemTypePayload {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_name(&mut errors, "name", &self.name);
        validation::check_name(&mut errors, "unit", &self.unit);
        validation::check_name(&mut errors, "category", &self.category);
        validation::check_optional_text(&mut errors, "description", self.description.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateItemTypePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Validate for UpdateItemTypePayload {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for (field, value) in [
            ("name", &self.name),
            ("unit", &self.unit),
            ("category", &self.category),
        ] {
            if let Some(v) = value {
                validation::check_name(&mut errors, field, v);
            }
        }
        validation::check_optional_text(&mut errors, "description", self.description.as_deref());
        errors.into_result()
    }
}

/// InventoryEntry
///
/// A quantity of one item type held by a provider group.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct InventoryEntry {
    pub id: Uuid,
    pub group_id: Uuid,
    pub item_type_id: Uuid,
    pub quantity: i32,
    pub availability: Availability,
    pub condition: ItemCondition,
    pub expiry_date: Option<NaiveDate>,
    pub village_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateInventoryEntryRequest {
    pub item_type_id: Uuid,
    pub quantity: i32,
    pub availability: Option<Availability>,
    #[serde(default)]
    pub condition: ItemCondition,
    pub expiry_date: Option<NaiveDate>,
    pub village_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl Validate for CreateInventoryEntryRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_stock_level(&mut errors, "quantity", self.quantity);
        validation::check_optional_text(&mut errors, "notes", self.notes.as_deref());
        errors.into_result()
    }
}

/// Fields for inserting an entry once availability has been settled.
#[derive(Debug, Clone)]
pub struct NewInventoryEntry {
    pub group_id: Uuid,
    pub item_type_id: Uuid,
    pub quantity: i32,
    pub availability: Availability,
    pub condition: ItemCondition,
    pub expiry_date: Option<NaiveDate>,
    pub village_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// UpdateInventoryEntryRequest
///
/// Partial update. For `expiry_date`, `village_id` and `notes` an omitted key keeps
/// the stored value and an explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateInventoryEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ItemCondition>,
    #[serde(default, deserialize_with = "super::nullable", skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<NaiveDate>")]
    #[schema(value_type = Option<String>, format = Date)]
    pub expiry_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "super::nullable", skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<Uuid>")]
    #[schema(value_type = Option<String>, format = Uuid)]
    pub village_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "super::nullable", skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
}

impl Validate for UpdateInventoryEntryRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if let Some(quantity) = self.quantity {
            validation::check_stock_level(&mut errors, "quantity", quantity);
        }
        validation::check_optional_text(&mut errors, "notes", self.notes.as_ref().and_then(|n| n.as_deref()));
        errors.into_result()
    }
}

/// Public stock search (GET /inventory). Only in-stock, available entries of
/// approved groups are returned.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InventoryFilter {
    pub item_type_id: Option<Uuid>,
    pub state_id: Option<Uuid>,
    pub district_id: Option<Uuid>,
}

/// ResupplyRequest
///
/// A provider asking for more stock of one of its entries.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ResupplyRequest {
    pub id: Uuid,
    pub inventory_entry_id: Uuid,
    pub group_id: Uuid,
    pub requested_by: Uuid,
    pub quantity: i32,
    pub note: Option<String>,
    pub status: ResupplyStatus,
    pub decision_note: Option<String>,
    pub decided_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateResupplyRequest {
    pub quantity: i32,
    pub note: Option<String>,
}

impl Validate for CreateResupplyRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_quantity(&mut errors, "quantity", self.quantity);
        validation::check_optional_text(&mut errors, "note", self.note.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Clone)]
pub struct NewResupply {
    pub inventory_entry_id: Uuid,
    pub group_id: Uuid,
    pub requested_by: Uuid,
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ResupplyStatusUpdate {
    pub status: ResupplyStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResupplyFilter {
    pub status: Option<ResupplyStatus>,
    pub group_id: Option<Uuid>,
}

/// DonationOffer
///
/// Someone offering to donate stock to a provider's inventory entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct DonationOffer {
    pub id: Uuid,
    pub inventory_entry_id: Uuid,
    pub group_id: Uuid,
    pub donor_id: Uuid,
    pub contact_phone: String,
    pub quantity: i32,
    pub note: Option<String>,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateDonationOffer {
    pub quantity: i32,
    pub contact_phone: String,
    pub note: Option<String>,
}

impl Validate for CreateDonationOffer {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_quantity(&mut errors, "quantity", self.quantity);
        validation::check_phone(&mut errors, "contact_phone", &self.contact_phone);
        validation::check_optional_text(&mut errors, "note", self.note.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub inventory_entry_id: Uuid,
    pub group_id: Uuid,
    pub donor_id: Uuid,
    pub contact_phone: String,
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DonationStatusUpdate {
    pub status: DonationStatus,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DonationFilter {
    pub status: Option<DonationStatus>,
}

/// A stock adjustment applied in the same transaction as a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub entry_id: Uuid,
    pub delta: i32,
}
