use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::validation::{self, Validate};

/// LocationLevel
///
/// The administrative hierarchy: state → district → tehsil → village.
/// Serialized as the plural path segment (`/locations/districts`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum LocationLevel {
    #[serde(rename = "states")]
    State,
    #[serde(rename = "districts")]
    District,
    #[serde(rename = "tehsils")]
    Tehsil,
    #[serde(rename = "villages")]
    Village,
}

impl LocationLevel {
    pub fn table(self) -> &'static str {
        match self {
            LocationLevel::State => "states",
            LocationLevel::District => "districts",
            LocationLevel::Tehsil => "tehsils",
            LocationLevel::Village => "villages",
        }
    }

    /// The level one step up, `None` for states.
    pub fn parent(self) -> Option<LocationLevel> {
        match self {
            LocationLevel::State => None,
            LocationLevel::District => Some(LocationLevel::State),
            LocationLevel::Tehsil => Some(LocationLevel::District),
            LocationLevel::Village => Some(LocationLevel::Tehsil),
        }
    }

    pub fn child(self) -> Option<LocationLevel> {
        match self {
            LocationLevel::State => Some(LocationLevel::District),
            LocationLevel::District => Some(LocationLevel::Tehsil),
            LocationLevel::Tehsil => Some(LocationLevel::Village),
            LocationLevel::Village => None,
        }
    }

    /// Foreign-key column pointing at the parent row.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            LocationLevel::State => None,
            LocationLevel::District => Some("state_id"),
            LocationLevel::Tehsil => Some("district_id"),
            LocationLevel::Village => Some("tehsil_id"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LocationLevel::State => "State",
            LocationLevel::District => "District",
            LocationLevel::Tehsil => "Tehsil",
            LocationLevel::Village => "Village",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LocationFilter {
    /// Restrict to children of this parent (ignored for states).
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateLocationRequest {
    pub name: String,
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
}

impl CreateLocationRequest {
    pub fn validate_for(&self, level: LocationLevel) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_name(&mut errors, "name", &self.name);
        if let Some(code) = &self.code {
            if code.trim().chars().count() > 16 {
                errors.add("code", "must be at most 16 characters");
            }
        }
        match (level.parent(), self.parent_id) {
            (Some(parent), None) => {
                errors.add("parent_id", format!("a {} is required", parent.label().to_lowercase()))
            }
            (None, Some(_)) => errors.add("parent_id", "states have no parent"),
            _ => {}
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateLocationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Validate for UpdateLocationRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            validation::check_name(&mut errors, "name", name);
        }
        if let Some(code) = &self.code {
            if code.trim().chars().count() > 16 {
                errors.add("code", "must be at most 16 characters");
            }
        }
        errors.into_result()
    }
}
