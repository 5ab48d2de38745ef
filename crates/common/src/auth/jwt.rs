use crate::auth::{DeviceTokenConfig, DeviceTokenProvider};
use crate::domain::{DomainError, DomainResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a device token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaims {
    pub sub: String, // device_id
    pub organization_id: String,
    pub device_group_id: String,
    #[serde(default)]
    pub primitives: Vec<String>,
    pub exp: usize,
    pub iat: usize,
}

impl DeviceClaims {
    pub fn device_id(&self) -> &str {
        &self.sub
    }

    pub fn has_primitive(&self, primitive: &str) -> bool {
        self.primitives.iter().any(|p| p == primitive)
    }
}

/// HS256 JWT implementation of DeviceTokenProvider
pub struct JwtDeviceTokenProvider {
    config: DeviceTokenConfig,
}

impl JwtDeviceTokenProvider {
    pub fn new(config: DeviceTokenConfig) -> Self {
        Self { config }
    }
}

impl DeviceTokenProvider for JwtDeviceTokenProvider {
    fn validate_token(&self, token: &str) -> DomainResult<DeviceClaims> {
        let token_data = decode::<DeviceClaims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| DomainError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }
}
