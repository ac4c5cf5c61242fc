mod cookie;
mod error;
mod handler;
mod router;

pub use cookie::*;
pub use error::*;
pub use handler::ApiResponse;
pub use router::*;
