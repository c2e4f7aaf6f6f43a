pub mod auth;
pub mod data;
pub mod logs;
pub mod project;
pub mod schema;
pub mod server;
