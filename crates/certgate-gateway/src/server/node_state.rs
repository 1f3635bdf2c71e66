//! The intercepted certificate-header lookup.
//!
//! A certificate the gateway is still holding does not exist upstream yet,
//! so its header is answered locally as PENDING. Unknown ids,
//! already-released records, and the latest-header query all belong to the
//! upstream.

use tonic::{Request, Response, Status};
use tracing::{error, info};

use certgate_proto::interop_v1::FixedBytes32;
use certgate_proto::node_v1::node_state_service_server::NodeStateService;
use certgate_proto::node_v1::{
    GetCertificateHeaderRequest, GetCertificateHeaderResponse, GetLatestCertificateHeaderRequest,
    GetLatestCertificateHeaderResponse,
};
use certgate_proto::types_v1::{CertificateHeader, CertificateStatus};

use crate::storage::GatewayStore;
use crate::upstream::UpstreamClient;

pub struct NodeStateInterceptor {
    store: GatewayStore,
    upstream: UpstreamClient,
}

impl NodeStateInterceptor {
    pub fn new(store: GatewayStore, upstream: UpstreamClient) -> Self {
        Self { store, upstream }
    }
}

#[tonic::async_trait]
impl NodeStateService for NodeStateInterceptor {
    async fn get_certificate_header(
        &self,
        request: Request<GetCertificateHeaderRequest>,
    ) -> Result<Response<GetCertificateHeaderResponse>, Status> {
        let req = request.into_inner();
        let id_bytes = req
            .certificate_id
            .as_ref()
            .and_then(|id| id.value.as_ref())
            .map(|v| v.value.clone())
            .unwrap_or_default();
        let id_hex = hex::encode(&id_bytes);

        let record = self.store.get_by_cert_id(&id_bytes).await.map_err(|err| {
            error!(error = %err, "failed to look up certificate by id");
            Status::internal(format!("failed to get certificate by id: {err}"))
        })?;

        match record {
            None => {
                info!(id = %id_hex, "certificate not held locally, querying upstream");
                let response = self.upstream.get_certificate_header(req).await?;
                Ok(Response::new(response))
            }
            Some(record) if record.processed_at.is_some() => {
                // released records are now authoritatively owned upstream
                info!(id = %id_hex, "certificate already released, querying upstream");
                let response = self.upstream.get_certificate_header(req).await?;
                Ok(Response::new(response))
            }
            Some(_) => {
                info!(id = %id_hex, "certificate held locally, returning pending header");
                let zero = || {
                    Some(FixedBytes32 {
                        value: vec![0u8; 32],
                    })
                };
                Ok(Response::new(GetCertificateHeaderResponse {
                    certificate_header: Some(CertificateHeader {
                        height: 1,
                        certificate_id: req.certificate_id,
                        status: CertificateStatus::Pending as i32,
                        prev_local_exit_root: zero(),
                        new_local_exit_root: zero(),
                        metadata: zero(),
                        ..Default::default()
                    }),
                }))
            }
        }
    }

    async fn get_latest_certificate_header(
        &self,
        request: Request<GetLatestCertificateHeaderRequest>,
    ) -> Result<Response<GetLatestCertificateHeaderResponse>, Status> {
        let response = self
            .upstream
            .get_latest_certificate_header(request.into_inner())
            .await?;
        Ok(Response::new(response))
    }
}
