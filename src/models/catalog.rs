use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::validation::{self, Validate};

/// CatalogKind
///
/// The admin-managed lookup lists. They share one row shape and differ only in the
/// table they live in. Used as the `{kind}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum CatalogKind {
    /// Kinds of help a citizen can ask for (food, rescue, medical, shelter, ...).
    Services,
    /// Hazard a request relates to (flood, landslide, ...).
    AlertCategories,
    /// Alert level an admin can attach to a request (red, orange, ...).
    AlertStatuses,
}

impl CatalogKind {
    pub fn table(self) -> &'static str {
        match self {
            CatalogKind::Services => "services",
            CatalogKind::AlertCategories => "alert_categories",
            CatalogKind::AlertStatuses => "alert_statuses",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CatalogKind::Services => "Service",
            CatalogKind::AlertCategories => "Alert category",
            CatalogKind::AlertStatuses => "Alert status",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CatalogPayload {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Validate for CatalogPayload {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_name(&mut errors, "name", &self.name);
        validation::check_optional_text(&mut errors, "description", self.description.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateCatalogPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl Validate for UpdateCatalogPayload {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            validation::check_name(&mut errors, "name", name);
        }
        validation::check_optional_text(&mut errors, "description", self.description.as_deref());
        errors.into_result()
    }
}
