// handlers/public/mod.rs - endpoints reachable without a token
pub mod users;

pub use users::{login_post, register_post};
