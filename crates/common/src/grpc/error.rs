use crate::domain::DomainError;
use tonic::Status;

/// Convert domain error to gRPC Status
pub fn domain_error_to_status(error: DomainError) -> Status {
    if error.is_validation() {
        return Status::invalid_argument(error.to_string());
    }

    match error {
        DomainError::MissingCredential(header) => {
            Status::unauthenticated(format!("Missing credential in header {}", header))
        }

        DomainError::InvalidToken(msg) => {
            Status::unauthenticated(format!("Invalid token: {}", msg))
        }

        DomainError::PermissionDenied(msg) => Status::permission_denied(msg),

        DomainError::Internal(err) => Status::internal(format!("Internal error: {}", err)),

        // Configuration, TLS, policy and login failures
        other => Status::internal(other.to_string()),
    }
}
