//! Persisted entities, request payloads and response schemas.
//!
//! Every enum stored in Postgres maps onto a native enum type declared in
//! `migrations/` (see the `#[sqlx(type_name = ...)]` attributes).

pub mod audit;
pub mod catalog;
pub mod group;
pub mod inventory;
pub mod location;
pub mod otp;
pub mod request;
pub mod user;

pub use audit::*;
pub use catalog::*;
pub use group::*;
pub use inventory::*;
pub use location::*;
pub use otp::*;
pub use request::*;
pub use user::*;

use serde::{Deserialize, Deserializer};

/// Deserializes a patch field so that an absent key stays `None` while an
/// explicit `null` becomes `Some(None)`. Use with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
