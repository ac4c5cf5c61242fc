//! In-process backends selected with `backend = "memory"`. Used for local
//! runs and the test suite; state does not survive a restart.

mod credential_repo_memory;
mod login_attempt_store_memory;
mod session_store_memory;

pub use credential_repo_memory::*;
pub use login_attempt_store_memory::*;
pub use session_store_memory::*;
