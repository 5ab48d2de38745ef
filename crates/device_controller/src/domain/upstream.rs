use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use common::domain::{DomainError, DomainResult};
use relay_proto::cluster_api::v1::device_manager_client::DeviceManagerClient;
use relay_proto::cluster_api::v1::RegisterLatencyRequest as UpstreamRegisterLatencyRequest;
use relay_proto::login_api::v1::login_client::LoginClient;
use relay_proto::login_api::v1::LoginWithBasicCredentialsRequest;
use thiserror::Error;
use tonic::transport::Channel;
use tonic::{Code, Status};
use tracing::debug;

use super::{LatencyReading, LoginAuthority, LoginCredentials, LoginGrant, SessionContext};

/// Failure of a call to the cluster API
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream rejected the session credential")]
    Unauthenticated,

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream call failed: {}: {}", .0.code(), .0.message())]
    Rejected(Status),
}

impl From<Status> for UpstreamError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Unauthenticated => UpstreamError::Unauthenticated,
            _ => UpstreamError::Rejected(status),
        }
    }
}

/// Records accepted latency readings upstream
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LatencyAuthority: Send + Sync {
    async fn register_latency(
        &self,
        session: &SessionContext,
        reading: &LatencyReading,
    ) -> Result<(), UpstreamError>;
}

/// `cluster_api.v1.DeviceManager` client
#[derive(Clone)]
pub struct GrpcLatencyAuthority {
    client: DeviceManagerClient<Channel>,
}

impl GrpcLatencyAuthority {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: DeviceManagerClient::new(channel),
        }
    }
}

#[async_trait]
impl LatencyAuthority for GrpcLatencyAuthority {
    async fn register_latency(
        &self,
        session: &SessionContext,
        reading: &LatencyReading,
    ) -> Result<(), UpstreamError> {
        let mut request = tonic::Request::new(UpstreamRegisterLatencyRequest {
            organization_id: reading.organization_id().to_string(),
            device_group_id: reading.device_group_id().to_string(),
            device_id: reading.device_id().to_string(),
            latency: i32::try_from(reading.measure()).unwrap_or(i32::MAX),
        });
        session
            .attach(&mut request)
            .map_err(|e| UpstreamError::Rejected(Status::internal(e.to_string())))?;

        // tonic clients are cheap to clone and need &mut self
        self.client.clone().register_latency(request).await?;
        Ok(())
    }
}

/// `login_api.v1.Login` client
#[derive(Clone)]
pub struct GrpcLoginAuthority {
    client: LoginClient<Channel>,
}

impl GrpcLoginAuthority {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: LoginClient::new(channel),
        }
    }
}

#[async_trait]
impl LoginAuthority for GrpcLoginAuthority {
    async fn login(&self, credentials: &LoginCredentials) -> DomainResult<LoginGrant> {
        debug!(email = %credentials.email, "Logging in to login API");

        let response = self
            .client
            .clone()
            .login_with_basic_credentials(LoginWithBasicCredentialsRequest {
                username: credentials.email.clone(),
                password: credentials.password.clone(),
            })
            .await
            .map_err(|status| {
                DomainError::Login(format!("{}: {}", status.code(), status.message()))
            })?
            .into_inner();

        if response.token.is_empty() {
            return Err(DomainError::Login("login API returned an empty token".to_string()));
        }

        Ok(LoginGrant {
            token: response.token,
            refresh_token: response.refresh_token,
            expires_at: match response.expiration_time {
                0 => None,
                secs => DateTime::from_timestamp(secs, 0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            UpstreamError::from(Status::unauthenticated("expired")),
            UpstreamError::Unauthenticated
        ));
        assert!(matches!(
            UpstreamError::from(Status::unavailable("down")),
            UpstreamError::Rejected(s) if s.code() == Code::Unavailable
        ));
        assert!(matches!(
            UpstreamError::from(Status::permission_denied("no")),
            UpstreamError::Rejected(_)
        ));
    }

    #[test]
    fn test_rejected_display() {
        let error = UpstreamError::from(Status::unavailable("connection refused"));
        assert!(error.to_string().contains("connection refused"));
    }
}
