use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};

/// Primitives a credential must carry to call a method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodPermission {
    #[serde(default)]
    pub must: Vec<String>,
}

/// Method-level authorization policy, loaded from a JSON file.
///
/// ```json
/// {
///   "allows_all": false,
///   "permissions": {
///     "/device_controller.v1.Connection/RegisterLatency": { "must": ["DEVICE"] }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    /// Let methods without an entry in `permissions` through unauthenticated.
    #[serde(default)]
    pub allows_all: bool,
    #[serde(default)]
    pub permissions: BTreeMap<String, MethodPermission>,
}

/// What the policy requires for a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision<'a> {
    /// No credential needed
    Public,
    /// A valid credential carrying every listed primitive
    Requires(&'a [String]),
    /// The method is not callable under this policy
    Denied,
}

impl AuthorizationPolicy {
    /// Load and parse the policy file. Failures are fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::AuthorizationPolicy(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            DomainError::AuthorizationPolicy(msg) => {
                DomainError::AuthorizationPolicy(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> DomainResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DomainError::AuthorizationPolicy(format!("invalid policy: {}", e)))
    }

    pub fn decide(&self, method: &str) -> PolicyDecision<'_> {
        match self.permissions.get(method) {
            Some(permission) => PolicyDecision::Requires(&permission.must),
            None if self.allows_all => PolicyDecision::Public,
            None => PolicyDecision::Denied,
        }
    }
}
