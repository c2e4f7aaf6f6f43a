use thiserror::Error;

/// Query-string problems on a dynamic list request. Every variant is a 400.
#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter format. Must be a valid JSON string.")]
    InvalidFormat,

    #[error("Unsupported query operator in filter.")]
    UnsupportedOperator(String),

    #[error("Filtering on sensitive fields is not allowed.")]
    SensitiveFilter(String),

    #[error("Selection of sensitive fields is not allowed.")]
    SensitiveSelection(String),

    #[error("Filter exceeds the maximum nesting depth of {0}.")]
    TooDeep(u32),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid value for field '{field}': expected {expected}")]
    InvalidValue { field: String, expected: &'static str },

    #[error("Invalid sort field: {0}")]
    InvalidSortField(String),

    #[error("Invalid select field: {0}")]
    InvalidSelectField(String),
}
