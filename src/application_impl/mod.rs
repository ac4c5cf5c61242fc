mod auth_service_impl;
mod authenticated_cipher;
mod credential_hasher;
mod key_consumer;
mod key_distributor;
mod signing_key_provider;
mod token_issuer;
mod token_validator;

pub use auth_service_impl::*;
pub use authenticated_cipher::*;
pub use credential_hasher::*;
pub use key_consumer::*;
pub use key_distributor::*;
pub use signing_key_provider::*;
pub use token_issuer::*;
pub use token_validator::*;

#[cfg(test)]
pub(crate) mod test_support;
