use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
