use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::validation::{self, MAX_PEOPLE_COUNT, Validate};

/// RequestStatus
///
/// Lifecycle of a citizen's service request. `completed`, `cancelled` and
/// `rejected` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RequestStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "urgency", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// ServiceRequest
///
/// A plea for help. `request_number` (PFRYYYYMMDDNNNN) is what the citizen quotes
/// when tracking it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub request_number: String,
    pub citizen_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub service_id: Uuid,
    pub alert_category_id: Option<Uuid>,
    pub alert_status_id: Option<Uuid>,
    pub description: Option<String>,
    pub people_count: i32,
    pub village_id: Option<Uuid>,
    pub address: Option<String>,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub assigned_group_id: Option<Uuid>,
    pub status_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateServiceRequest {
    pub name: String,
    pub phone: String,
    pub service_id: Uuid,
    pub alert_category_id: Option<Uuid>,
    pub description: Option<String>,
    #[serde(default = "default_people_count")]
    pub people_count: i32,
    pub village_id: Option<Uuid>,
    pub address: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

fn default_people_count() -> i32 {
    1
}

impl Validate for CreateServiceRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        validation::check_name(&mut errors, "name", &self.name);
        validation::check_phone(&mut errors, "phone", &self.phone);
        validation::check_optional_text(&mut errors, "description", self.description.as_deref());
        validation::check_optional_text(&mut errors, "address", self.address.as_deref());
        if !(1..=MAX_PEOPLE_COUNT).contains(&self.people_count) {
            errors.add(
                "people_count",
                format!("must be between 1 and {}", MAX_PEOPLE_COUNT),
            );
        }
        if self.village_id.is_none()
            && self.address.as_deref().is_none_or(|a| a.trim().is_empty())
        {
            errors.add("address", "give a village or an address");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub citizen_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub service_id: Uuid,
    pub alert_category_id: Option<Uuid>,
    pub description: Option<String>,
    pub people_count: i32,
    pub village_id: Option<Uuid>,
    pub address: Option<String>,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub service_id: Option<Uuid>,
    pub assigned_group_id: Option<Uuid>,
    pub village_id: Option<Uuid>,
    pub urgency: Option<Urgency>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrackQuery {
    /// Phone number the request was submitted with.
    pub phone: String,
}

/// TrackResponse
///
/// What an anonymous caller may see about a request: progress, never the
/// personal details.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TrackResponse {
    pub request_number: String,
    pub status: RequestStatus,
    pub urgency: Urgency,
    pub service_id: Uuid,
    pub assigned_group_name: Option<String>,
    pub status_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RequestStatusUpdate {
    pub status: RequestStatus,
    pub note: Option<String>,
}

/// Admin assignment. `group_id: null` hands the request back to the open pool.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AssignRequest {
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AlertStatusUpdate {
    pub alert_status_id: Option<Uuid>,
}

/// A guarded status move applied by the repository only if the row is still in
/// `from`. `assigned_group` of `Some(x)` overwrites the assignment with `x`.
#[derive(Debug, Clone)]
pub struct RequestTransition {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub assigned_group: Option<Option<Uuid>>,
    pub note: Option<String>,
}
