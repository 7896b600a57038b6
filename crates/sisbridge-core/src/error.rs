use thiserror::Error;

/// Validation and contract errors exposed by `sisbridge-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("scope id cannot be empty")]
    EmptyScope,
    #[error("scope id length {len} exceeds max {max}")]
    ScopeTooLong { len: usize, max: usize },
    #[error("scope id contains invalid character '{ch}' at index {index}")]
    ScopeInvalidChar { ch: char, index: usize },

    #[error("invalid mode '{value}', expected one of live, sandbox, hybrid")]
    InvalidMode { value: String },
    #[error("invalid entity type '{value}', expected one of schools, learners, staff, parents, marks, lookups")]
    InvalidEntityType { value: String },
    #[error("invalid lookup table '{value}', expected one of grades, languages, subjects, genders, relationships, positions")]
    InvalidLookupTable { value: String },
    #[error("invalid grade '{value}', expected one of R, 1..12")]
    InvalidGrade { value: String },
    #[error("invalid api version '{value}', expected v1 or v2")]
    InvalidApiVersion { value: String },

    #[error("page must be greater than zero")]
    InvalidPage,
    #[error("page size {value} must be between 1 and {max}")]
    InvalidPageSize { value: u32, max: u32 },
    #[error("a page number requires a page size")]
    PageSizeRequired,
    #[error("date range start {from} is after end {to}")]
    InvalidDateRange { from: String, to: String },
    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("lookup requests must name a lookup table")]
    MissingLookupTable,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}
