//! App registration and operator review endpoints.

pub(crate) mod admin;
pub(crate) mod register;
pub(crate) mod types;
