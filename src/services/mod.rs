//! Control-plane services backed by the platform Postgres database.

pub mod activity_service;
pub mod log_service;
pub mod permission_service;
pub mod project_service;
pub mod schema_service;
pub mod user_service;

use thiserror::Error;

use crate::auth::AuthError;
use crate::crypto::CryptoError;
use crate::database::manager::DatabaseError;
use crate::dynamic::DefinitionError;

pub use activity_service::ActivityService;
pub use log_service::{LogQuery, LogService, LogStats};
pub use permission_service::{PermissionInput, PermissionService};
pub use project_service::{ProjectService, ProjectSummary};
pub use schema_service::{SchemaService, SchemaSummary};
pub use user_service::{UserChanges, UserService};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(DatabaseError::Sqlx(err))
    }
}

/// True when a write hit a unique constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
