//! Token keys, scope lists, and the access token value type.

pub mod id;
pub mod scope;
pub mod token;

pub use id::*;
pub use scope::*;
pub use token::{access::*, secret::*};
