/// Configuration for device token validation
#[derive(Debug, Clone)]
pub struct DeviceTokenConfig {
    /// HS256 secret shared with the issuer of device tokens.
    pub secret: String,
}

impl DeviceTokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}
