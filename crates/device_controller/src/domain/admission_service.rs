use std::sync::Arc;

use common::domain::DomainResult;
use tracing::debug;

use super::{validate_reading, ForwardingSink, RegisterLatencyRequest};

/// Whether a measurement is within the configured threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    Ok,
    LatencyCheckRequired,
}

/// Admits latency measurements against a threshold and hands every valid
/// reading to the forwarding pipeline.
pub struct AdmissionService {
    threshold_ms: u32,
    forwarding: Arc<dyn ForwardingSink>,
}

impl AdmissionService {
    pub fn new(threshold_ms: u32, forwarding: Arc<dyn ForwardingSink>) -> Self {
        Self {
            threshold_ms,
            forwarding,
        }
    }

    /// Validate and admit one measurement.
    ///
    /// The reading is submitted for forwarding whatever the result; the
    /// forward never blocks this call or changes its outcome.
    pub fn register_latency(&self, request: RegisterLatencyRequest) -> DomainResult<AdmissionResult> {
        let reading = validate_reading(request)?;
        let result = self.admit(reading.measure());

        debug!(
            organization_id = %reading.organization_id(),
            device_group_id = %reading.device_group_id(),
            device_id = %reading.device_id(),
            latency = reading.measure(),
            result = ?result,
            "Latency admitted"
        );

        self.forwarding.submit(reading);
        Ok(result)
    }

    /// A measurement exactly at the threshold is still `Ok`.
    pub fn admit(&self, measure: u32) -> AdmissionResult {
        if measure > self.threshold_ms {
            AdmissionResult::LatencyCheckRequired
        } else {
            AdmissionResult::Ok
        }
    }
}
