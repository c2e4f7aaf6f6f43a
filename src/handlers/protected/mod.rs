// handlers/protected/mod.rs - JWT protected management endpoints
//
// Every handler receives the caller as `Extension<AuthUser>`, inserted by
// `jwt_auth_middleware`. Resources are always scoped to that user.
pub mod logs;
pub mod permissions;
pub mod projects;
pub mod schemas;
pub mod users;
