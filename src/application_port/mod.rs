mod auth_service;
mod verification_key;

pub use auth_service::*;
pub use verification_key::*;
