/// Router Module Index
///
/// Organizes routing into access-segregated modules. Access control is applied at
/// the module level (via Axum layers) so a protected endpoint can't be exposed by
/// forgetting a check inside its handler.

/// Routes reachable without credentials (directory data, auth entry points,
/// request submission and tracking).
pub mod public;

/// Routes behind the `AuthUser` extractor middleware. Role and ownership checks
/// (citizen, provider) happen in the handlers.
pub mod authenticated;

/// Routes nested under `/admin`, behind the admin-role middleware.
pub mod admin;
