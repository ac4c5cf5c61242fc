mod issuer;
mod key_refresh_worker;
mod memory_sweeper;
mod verifier;

pub use issuer::*;
pub use key_refresh_worker::*;
pub use memory_sweeper::*;
pub use verifier::*;
