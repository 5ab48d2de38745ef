use std::sync::Arc;

use common::auth::Authorizer;
use common::grpc::domain_error_to_status;
use relay_proto::device_controller::v1::connection_server::Connection;
use relay_proto::device_controller::v1::{
    Empty, RegisterLatencyRequest, RegisterLatencyResult, RegisterResult, SelectClusterRequest,
    SelectedCluster, Success,
};
use tonic::{Request, Response, Status};
use tracing::{debug, instrument};

use crate::domain::{
    AdmissionResult, AdmissionService, RegisterLatencyRequest as DomainRegisterLatencyRequest,
    SelectClusterRequest as DomainSelectClusterRequest, SelectionService,
};

pub const PING_METHOD: &str = "/device_controller.v1.Connection/Ping";
pub const REGISTER_LATENCY_METHOD: &str = "/device_controller.v1.Connection/RegisterLatency";
pub const SELECT_CLUSTER_METHOD: &str = "/device_controller.v1.Connection/SelectCluster";

/// gRPC handler for the Connection service.
/// Authorizes the call, maps proto to domain, and converts errors.
pub struct ConnectionHandler {
    admission_service: Arc<AdmissionService>,
    selection_service: SelectionService,
    authorizer: Arc<Authorizer>,
}

impl ConnectionHandler {
    pub fn new(
        admission_service: Arc<AdmissionService>,
        selection_service: SelectionService,
        authorizer: Arc<Authorizer>,
    ) -> Self {
        Self {
            admission_service,
            selection_service,
            authorizer,
        }
    }
}

fn to_proto_register_result(result: AdmissionResult) -> RegisterResult {
    match result {
        AdmissionResult::Ok => RegisterResult::Ok,
        AdmissionResult::LatencyCheckRequired => RegisterResult::LatencyCheckRequired,
    }
}

#[tonic::async_trait]
impl Connection for ConnectionHandler {
    #[instrument(name = "Ping", skip(self, _request))]
    async fn ping(&self, _request: Request<Empty>) -> Result<Response<Success>, Status> {
        Ok(Response::new(Success {}))
    }

    #[instrument(
        name = "RegisterLatency",
        skip(self, request),
        fields(
            organization_id = %request.get_ref().organization_id,
            device_group_id = %request.get_ref().device_group_id,
            device_id = %request.get_ref().device_id,
            latency = request.get_ref().latency,
        )
    )]
    async fn register_latency(
        &self,
        request: Request<RegisterLatencyRequest>,
    ) -> Result<Response<RegisterLatencyResult>, Status> {
        self.authorizer.authorize(&request, REGISTER_LATENCY_METHOD)?;
        let req = request.into_inner();

        let result = self
            .admission_service
            .register_latency(DomainRegisterLatencyRequest {
                organization_id: req.organization_id,
                device_group_id: req.device_group_id,
                device_id: req.device_id,
                latency: req.latency,
            })
            .map_err(domain_error_to_status)?;

        debug!(result = ?result, "Latency registered");

        Ok(Response::new(RegisterLatencyResult {
            result: to_proto_register_result(result) as i32,
        }))
    }

    #[instrument(
        name = "SelectCluster",
        skip(self, request),
        fields(
            organization_id = %request.get_ref().organization_id,
            device_group_id = %request.get_ref().device_group_id,
            device_id = %request.get_ref().device_id,
            candidates = request.get_ref().latencies.len(),
        )
    )]
    async fn select_cluster(
        &self,
        request: Request<SelectClusterRequest>,
    ) -> Result<Response<SelectedCluster>, Status> {
        self.authorizer.authorize(&request, SELECT_CLUSTER_METHOD)?;
        let req = request.into_inner();

        let selection = self
            .selection_service
            .select_cluster(DomainSelectClusterRequest {
                organization_id: req.organization_id,
                device_group_id: req.device_group_id,
                device_id: req.device_id,
                latencies: req.latencies,
            })
            .map_err(domain_error_to_status)?;

        let cluster_index = i32::try_from(selection.index)
            .map_err(|_| Status::invalid_argument("too many candidate clusters"))?;

        Ok(Response::new(SelectedCluster { cluster_index }))
    }
}
