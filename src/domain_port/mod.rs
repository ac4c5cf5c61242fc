// store

mod login_attempt_store;
mod session_store;

pub use login_attempt_store::*;
pub use session_store::*;

// repo

mod credential_repo;

pub use credential_repo::*;
