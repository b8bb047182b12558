//! Router Module Index
//!
//! Routes are split by how the caller is authenticated. All three routers are
//! nested under `/api/v1` by `create_router`.

/// Routes open to anonymous callers: health, login and self-registration.
pub mod public;

/// Routes behind the authentication route layer. Handlers additionally
/// enforce their per-operation access requirement.
pub mod authenticated;

/// Administrative routes under `/admin`. Authentication happens in the
/// `Principal` extractor, role checks in the handlers.
pub mod admin;
