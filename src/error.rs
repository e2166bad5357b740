use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot schedule reply: {0}")]
    NoRuntime(String),
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
