use crate::auth::DeviceClaims;
use crate::domain::DomainResult;

/// Verifies device credentials (JWT device tokens)
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait DeviceTokenProvider: Send + Sync {
    /// Validate a token and return its claims
    fn validate_token(&self, token: &str) -> DomainResult<DeviceClaims>;
}
