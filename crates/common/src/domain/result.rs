use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("organization_id cannot be empty")]
    EmptyOrganizationId,

    #[error("device_group_id cannot be empty")]
    EmptyDeviceGroupId,

    #[error("device_id cannot be empty")]
    EmptyDeviceId,

    #[error("measure cannot be zero or less than zero")]
    InvalidMeasure,

    #[error("latency list cannot be empty")]
    EmptyLatencyList,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("TLS material error: {0}")]
    TlsMaterial(String),

    #[error("Authorization policy error: {0}")]
    AuthorizationPolicy(String),

    #[error("Missing credential in header {0}")]
    MissingCredential(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    /// True for the request validation reasons that map to `InvalidArgument`.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::EmptyOrganizationId
                | DomainError::EmptyDeviceGroupId
                | DomainError::EmptyDeviceId
                | DomainError::InvalidMeasure
                | DomainError::EmptyLatencyList
                | DomainError::ValidationError(_)
        )
    }
}
