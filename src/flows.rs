//! Authorization-code + PKCE front half: verifier/state generation, redirect URL
//! construction, and callback validation.

pub mod authorize;
pub mod pkce;

pub use authorize::*;
pub use pkce::*;
