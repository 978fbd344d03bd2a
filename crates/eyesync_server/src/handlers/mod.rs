pub mod api;
pub mod error;
pub mod replica;

pub use api::api_routes;
pub use error::{ApiError, ApiResult};
pub use replica::replica_routes;
