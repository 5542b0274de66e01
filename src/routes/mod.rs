/// Router Module Index
///
/// Splits the API into access groups. Access control is attached to whole groups in
/// `create_router` (via `route_layer`), never per handler, so a new admin endpoint
/// cannot be exposed by forgetting a check.

/// Anonymous, read-only routes under `/api/public`, plus `/health`.
/// Inactive rows are filtered out by the service layer for this surface.
pub mod public;

/// Login and token routes under `/api/auth`. Each handler extracts the token kind it
/// needs, so the group carries no layer.
pub mod auth;

/// Content management under `/api/admin`, gated by the `require_admin` layer.
pub mod admin;
