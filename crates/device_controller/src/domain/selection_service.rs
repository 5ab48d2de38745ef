use common::domain::{DomainError, DomainResult};
use tracing::debug;

use super::{validate_batch, SelectClusterRequest};

/// Position of the chosen candidate within the request's latencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterSelection {
    pub index: usize,
}

/// Picks the candidate cluster with the lowest reported latency
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionService;

impl SelectionService {
    pub fn new() -> Self {
        Self
    }

    pub fn select_cluster(&self, request: SelectClusterRequest) -> DomainResult<ClusterSelection> {
        let batch = validate_batch(request)?;
        let index =
            lowest_latency_index(batch.measures()).ok_or(DomainError::EmptyLatencyList)?;

        debug!(
            organization_id = %batch.organization_id(),
            device_group_id = %batch.device_group_id(),
            device_id = %batch.device_id(),
            candidates = batch.measures().len(),
            index,
            "Cluster selected"
        );

        Ok(ClusterSelection { index })
    }
}

/// Index of the minimum; ties go to the first occurrence.
pub fn lowest_latency_index(measures: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &measure) in measures.iter().enumerate() {
        match best {
            Some((_, lowest)) if measure >= lowest => {}
            _ => best = Some((index, measure)),
        }
    }
    best.map(|(index, _)| index)
}
