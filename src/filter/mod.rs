//! Translation of dynamic list query parameters (`filter`, `select`, `sort`,
//! `page`, `limit`) into a MongoDB find request checked against the schema.

pub mod error;
pub mod filter;
pub mod filter_order;
pub mod filter_where;
pub mod types;

pub use error::FilterError;
pub use filter::{projection_for, Filter};
pub use filter_order::FilterOrder;
pub use filter_where::FilterWhere;
pub use types::*;
