pub mod activity;
pub mod permission;
pub mod project;
pub mod request_log;
pub mod schema;
pub mod user;

pub use activity::Activity;
pub use permission::{FieldPermissions, PermissionRecord};
pub use project::Project;
pub use request_log::{NewRequestLog, RequestLog};
pub use schema::SchemaRecord;
pub use user::User;
