use thiserror::Error;

/// Rejections raised while validating or evaluating a document selector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("collection name rejected: {0}")]
    BadCollection(String),

    #[error("field path rejected: {0}")]
    BadField(String),

    #[error("malformed selector: {0}")]
    MalformedSelector(String),

    #[error("operator not supported: {0}")]
    UnknownOperator(String),

    #[error("operator operand rejected: {0}")]
    BadOperand(String),

    #[error("page bounds rejected: {0}")]
    BadPage(String),
}
