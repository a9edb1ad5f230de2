#[derive(Debug, thiserror::Error)]
pub enum LimsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("profile error: {0}")]
    Profile(#[from] profiles::ProfileError),
    #[error("invalid tenant id: {0}")]
    TenantId(#[from] lims_types::TenantIdError),
    #[error("failed to read custom tests: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize result: {0}")]
    Serialization(serde_json::Error),
}

pub type LimsResult<T> = std::result::Result<T, LimsError>;
