mod claims;
mod jwks;
mod session;
mod user;

pub use claims::*;
pub use jwks::*;
pub use session::*;
pub use user::*;
