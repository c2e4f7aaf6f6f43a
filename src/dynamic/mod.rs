//! Dynamic models built from stored field definitions and executed against
//! the owner's MongoDB deployment.

pub mod access;
pub mod connection;
pub mod convert;
pub mod definition;
pub mod model;
pub mod populate;
pub mod validate;

use thiserror::Error;

pub use access::AccessPolicy;
pub use connection::{ConnectionCache, TenantDatabase};
pub use definition::{validate_collection_name, validate_definitions, DynamicSchema, FieldDefinition, FieldSpec, FieldType};
pub use model::{DynamicModel, FindQuery, ModelCache};
pub use validate::{validate_payload, ValidatedPayload};

/// Field names maintained by the model itself
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Fields that can never be filtered on or selected through a dynamic endpoint
pub const RESTRICTED_FIELDS: [&str; 3] = ["password", "ssn", "creditCardNumber"];

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Schema must define at least one field")]
    Empty,

    #[error("Field at position {0} is missing a name or type")]
    Incomplete(usize),

    #[error("Field name '{0}' is reserved")]
    ReservedName(String),

    #[error("Field '{0}' is defined more than once")]
    Duplicate(String),

    #[error("Field '{field}' has an invalid match pattern: {reason}")]
    InvalidPattern { field: String, reason: String },

    #[error("Field '{0}' can only declare ref on an objectid field")]
    InvalidRef(String),

    #[error("Invalid collection name '{0}'. Use letters, digits and underscores, starting with a letter or underscore")]
    InvalidCollectionName(String),

    #[error("Field '{0}' is secure but not a string; only string fields can be secure")]
    SecureType(String),

    #[error("Field '{0}' has a secret key that cannot be opened")]
    SecretKey(String),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid connection string: {0}")]
    InvalidUri(String),

    #[error("Connection failed: {0}")]
    Connect(#[source] mongodb::error::Error),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Duplicate value for unique field {0}")]
    Duplicate(String),

    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}
