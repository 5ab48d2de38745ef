use std::sync::Arc;

use tonic::metadata::MetadataMap;
use tonic::{Request, Status};

use super::{AuthorizationPolicy, DeviceClaims, DeviceTokenProvider, PolicyDecision};
use crate::domain::DomainError;
use crate::grpc::domain_error_to_status;

/// Checks the device credential of incoming calls against the method policy.
///
/// Used by every gRPC handler method, and therefore by the HTTP gateway too,
/// since the gateway calls the same handler in-process.
pub struct Authorizer {
    header: String,
    token_provider: Arc<dyn DeviceTokenProvider>,
    policy: AuthorizationPolicy,
}

impl Authorizer {
    /// `header` is the metadata key carrying the credential. gRPC metadata
    /// keys are lowercase, so the name is normalized.
    pub fn new(
        header: &str,
        token_provider: Arc<dyn DeviceTokenProvider>,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            header: header.to_ascii_lowercase(),
            token_provider,
            policy,
        }
    }

    /// Authorize a call to `method` (full gRPC path).
    ///
    /// Returns the validated claims, or `None` for public methods.
    pub fn authorize<T>(
        &self,
        request: &Request<T>,
        method: &str,
    ) -> Result<Option<DeviceClaims>, Status> {
        self.authorize_metadata(request.metadata(), method)
            .map_err(domain_error_to_status)
    }

    pub fn authorize_metadata(
        &self,
        metadata: &MetadataMap,
        method: &str,
    ) -> Result<Option<DeviceClaims>, DomainError> {
        let required = match self.policy.decide(method) {
            PolicyDecision::Public => return Ok(None),
            PolicyDecision::Denied => {
                return Err(DomainError::PermissionDenied(format!(
                    "method {} is not allowed",
                    method
                )))
            }
            PolicyDecision::Requires(primitives) => primitives,
        };

        let raw = metadata
            .get(self.header.as_str())
            .ok_or_else(|| DomainError::MissingCredential(self.header.clone()))?
            .to_str()
            .map_err(|_| DomainError::InvalidToken("credential is not valid ASCII".to_string()))?;

        let token = raw
            .strip_prefix("Bearer ")
            .or_else(|| raw.strip_prefix("bearer "))
            .unwrap_or(raw)
            .trim();
        if token.is_empty() {
            return Err(DomainError::MissingCredential(self.header.clone()));
        }

        let claims = self.token_provider.validate_token(token)?;

        if let Some(missing) = required.iter().find(|p| !claims.has_primitive(p)) {
            return Err(DomainError::PermissionDenied(format!(
                "device {} lacks primitive {} for {}",
                claims.device_id(),
                missing,
                method
            )));
        }

        Ok(Some(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MethodPermission, MockDeviceTokenProvider};
    use std::collections::BTreeMap;

    const REGISTER: &str = "/device_controller.v1.Connection/RegisterLatency";

    fn claims(primitives: &[&str]) -> DeviceClaims {
        DeviceClaims {
            sub: "dev-1".to_string(),
            organization_id: "org-1".to_string(),
            device_group_id: "group-1".to_string(),
            primitives: primitives.iter().map(|p| p.to_string()).collect(),
            exp: 0,
            iat: 0,
        }
    }

    fn policy() -> AuthorizationPolicy {
        let mut permissions = BTreeMap::new();
        permissions.insert(
            REGISTER.to_string(),
            MethodPermission {
                must: vec!["DEVICE".to_string()],
            },
        );
        AuthorizationPolicy {
            allows_all: false,
            permissions,
        }
    }

    fn request_with(header: &'static str, value: &str) -> Request<()> {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(header, value.parse().unwrap());
        request
    }

    #[test]
    fn test_authorize_bearer_token() {
        let mut provider = MockDeviceTokenProvider::new();
        provider
            .expect_validate_token()
            .with(mockall::predicate::eq("valid_token"))
            .times(1)
            .returning(|_| Ok(claims(&["DEVICE"])));

        let authorizer = Authorizer::new("Authorization", Arc::new(provider), policy());
        let request = request_with("authorization", "Bearer valid_token");

        let result = authorizer.authorize(&request, REGISTER).unwrap();
        assert_eq!(result.unwrap().device_id(), "dev-1");
    }

    #[test]
    fn test_authorize_raw_token_in_custom_header() {
        let mut provider = MockDeviceTokenProvider::new();
        provider
            .expect_validate_token()
            .with(mockall::predicate::eq("raw_token"))
            .returning(|_| Ok(claims(&["DEVICE"])));

        let authorizer = Authorizer::new("x-device-token", Arc::new(provider), policy());
        let request = request_with("x-device-token", "raw_token");

        assert!(authorizer.authorize(&request, REGISTER).is_ok());
    }

    #[test]
    fn test_missing_header_is_unauthenticated() {
        let authorizer =
            Authorizer::new("authorization", Arc::new(MockDeviceTokenProvider::new()), policy());
        let status = authorizer
            .authorize(&Request::new(()), REGISTER)
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_invalid_token_is_unauthenticated() {
        let mut provider = MockDeviceTokenProvider::new();
        provider
            .expect_validate_token()
            .returning(|_| Err(DomainError::InvalidToken("expired".to_string())));

        let authorizer = Authorizer::new("authorization", Arc::new(provider), policy());
        let request = request_with("authorization", "Bearer stale");

        let status = authorizer.authorize(&request, REGISTER).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_missing_primitive_is_permission_denied() {
        let mut provider = MockDeviceTokenProvider::new();
        provider
            .expect_validate_token()
            .returning(|_| Ok(claims(&["PROFILE"])));

        let authorizer = Authorizer::new("authorization", Arc::new(provider), policy());
        let request = request_with("authorization", "Bearer token");

        let status = authorizer.authorize(&request, REGISTER).unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn test_unlisted_method_denied_without_allows_all() {
        let authorizer =
            Authorizer::new("authorization", Arc::new(MockDeviceTokenProvider::new()), policy());
        let status = authorizer
            .authorize(&Request::new(()), "/device_controller.v1.Connection/Other")
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn test_unlisted_method_public_with_allows_all() {
        let mut open = policy();
        open.allows_all = true;
        let authorizer =
            Authorizer::new("authorization", Arc::new(MockDeviceTokenProvider::new()), open);
        let result = authorizer
            .authorize(&Request::new(()), "/device_controller.v1.Connection/Other")
            .unwrap();
        assert!(result.is_none());
    }
}
