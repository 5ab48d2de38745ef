use common::domain::{DomainError, DomainResult};
use common::garde::validate_with;
use garde::Validate;

/// Service request for registering one latency measurement
#[derive(Debug, Clone, Validate)]
pub struct RegisterLatencyRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub device_group_id: String,
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(range(min = 1))]
    pub latency: i32,
}

/// Service request for selecting a cluster from candidate latencies
#[derive(Debug, Clone, Validate)]
pub struct SelectClusterRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub device_group_id: String,
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(length(min = 1), inner(range(min = 1)))]
    pub latencies: Vec<i32>,
}

/// A validated latency measurement in milliseconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyReading {
    organization_id: String,
    device_group_id: String,
    device_id: String,
    measure: u32,
}

impl LatencyReading {
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn device_group_id(&self) -> &str {
        &self.device_group_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn measure(&self) -> u32 {
        self.measure
    }
}

/// Validated latencies to candidate clusters, in candidate order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyBatch {
    organization_id: String,
    device_group_id: String,
    device_id: String,
    measures: Vec<u32>,
}

impl LatencyBatch {
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn device_group_id(&self) -> &str {
        &self.device_group_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Never empty
    pub fn measures(&self) -> &[u32] {
        &self.measures
    }
}

/// Rejection reason for an invalid field, ranked organization, group,
/// device, measure or list, then list element.
fn classify(path: &str) -> (u8, DomainError) {
    match path {
        "organization_id" => (0, DomainError::EmptyOrganizationId),
        "device_group_id" => (1, DomainError::EmptyDeviceGroupId),
        "device_id" => (2, DomainError::EmptyDeviceId),
        "latency" => (3, DomainError::InvalidMeasure),
        "latencies" => (3, DomainError::EmptyLatencyList),
        p if p.starts_with("latencies") => (4, DomainError::InvalidMeasure),
        other => (5, DomainError::ValidationError(format!("invalid field {}", other))),
    }
}

fn positive(measure: i32) -> DomainResult<u32> {
    u32::try_from(measure)
        .ok()
        .filter(|m| *m > 0)
        .ok_or(DomainError::InvalidMeasure)
}

/// Check identifiers in order (organization, group, device), then the measure.
pub fn validate_reading(request: RegisterLatencyRequest) -> DomainResult<LatencyReading> {
    validate_with(&request, classify)?;

    Ok(LatencyReading {
        measure: positive(request.latency)?,
        organization_id: request.organization_id,
        device_group_id: request.device_group_id,
        device_id: request.device_id,
    })
}

/// Check identifiers in order, then that the list is non-empty and every
/// measure is positive.
pub fn validate_batch(request: SelectClusterRequest) -> DomainResult<LatencyBatch> {
    validate_with(&request, classify)?;

    let measures = request
        .latencies
        .iter()
        .map(|m| positive(*m))
        .collect::<DomainResult<Vec<_>>>()?;

    Ok(LatencyBatch {
        organization_id: request.organization_id,
        device_group_id: request.device_group_id,
        device_id: request.device_id,
        measures,
    })
}
