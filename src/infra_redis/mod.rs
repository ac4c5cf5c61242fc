mod login_attempt_store_redis;
mod session_store_redis;

pub use login_attempt_store_redis::*;
pub use session_store_redis::*;
