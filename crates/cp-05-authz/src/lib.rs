//! # Permission Kernel
//!
//! Token verification and OP-Code-scoped authorization.
//!
//! A request is authenticated once at the edge: the bearer token yields a
//! verified identity, which is widened into an [`EffectiveScope`] (role +
//! courier level + managed prefix) exactly once. Every later permission
//! question is a pure function of that scope and the resource's OP Code.
//!
//! Privacy masking of permission failures is centralized in
//! [`authorize::mask_for_probe`]: a courier probing outside its prefix sees
//! `NotFound`, never `PermissionDenied`, so prefix layouts cannot be mapped
//! by error-code scanning.

pub mod authorize;
pub mod errors;
pub mod scope;
pub mod token;

pub use authorize::{authorize, mask_for_probe, Operation};
pub use errors::AuthError;
pub use scope::{CourierScope, EffectiveScope};
pub use token::{Claims, TokenAuthority};

/// Default token lifetime in seconds (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
