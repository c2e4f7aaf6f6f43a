pub mod access_token;
pub mod auth;
pub mod rate_limit;
pub mod request_log;
pub mod response;

pub use access_token::{resolve_owner_middleware, DynamicOwner};
pub use auth::{jwt_auth_middleware, AuthUser};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use request_log::request_log_middleware;
pub use response::{ApiResponse, ApiResult, Paginated, Pagination};
