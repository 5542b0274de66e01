/// Handlers Module Index
///
/// One module per route group. Handlers stay thin: they extract the kind, identity,
/// and payload, then delegate to [`EntityService`](crate::service::EntityService) or
/// the credential store.

/// Login, token refresh, and account self-service.
pub mod auth;

/// Generic CRUD over every content kind plus the about, forms, and dashboard extras.
pub mod admin;

/// Anonymous read-only aggregates for the website.
pub mod public;
