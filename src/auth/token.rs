//! Token values and secret wrappers.

pub mod access;
pub mod secret;
