use thiserror::Error;

/// Failures while building, serializing or re-parsing a structured query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("boolean query requires at least one clause")]
    EmptyBoolean,
    #[error("span query requires at least one clause")]
    EmptySpan,
    #[error("span query cannot contain {0}")]
    NotSpanQuery(String),
    #[error("unexpected query element <{0}>")]
    UnknownElement(String),
    #[error("element <{element}> is missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },
    #[error("invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute { attribute: String, value: String },
    #[error("query syntax error: {0}")]
    Syntax(String),
}

/// Internal-consistency failures of the rewrite pass.
///
/// None of these are caused by unusual input shapes; every variant means a caller
/// broke an invariant of the algebra or the traversal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("slop counter invoked on {0}, which is not a path component")]
    NotPathComponent(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
