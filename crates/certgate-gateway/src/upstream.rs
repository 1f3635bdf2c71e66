//! Shared client connection to the upstream aggregation-layer node.
//!
//! The channel is lazy and multiplexed: the submission path, the header
//! interceptor, the release scheduler, and the transparent forwarder all
//! share it.

use std::time::Duration;

use bytes::Bytes;
use http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use certgate_proto::methods;
use certgate_proto::node_v1::node_state_service_client::NodeStateServiceClient;
use certgate_proto::node_v1::{
    GetCertificateHeaderRequest, GetCertificateHeaderResponse, GetLatestCertificateHeaderRequest,
    GetLatestCertificateHeaderResponse, SubmitCertificateResponse,
};

use crate::codec::RawRequestCodec;

/// Per-call send/receive limit: 50 MiB.
pub const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

/// Deadline applied to every outbound upstream call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct UpstreamClient {
    channel: Channel,
}

impl UpstreamClient {
    /// Create a lazy connection to the upstream backend. The first RPC
    /// establishes the transport.
    pub fn connect(addr: &str) -> Result<Self, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(format!("http://{addr}"))?;
        Ok(Self {
            channel: endpoint.connect_lazy(),
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Submit the exact serialized request bytes to the upstream submission
    /// method and decode its response. The payload is never re-serialized,
    /// so the bytes delivered upstream equal the bytes given here.
    pub async fn submit_raw(&self, raw: Vec<u8>) -> Result<SubmitCertificateResponse, Status> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone())
            .max_encoding_message_size(MAX_MESSAGE_SIZE)
            .max_decoding_message_size(MAX_MESSAGE_SIZE);
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("upstream unavailable: {e}")))?;

        let mut request = Request::new(Bytes::from(raw));
        request.set_timeout(CALL_TIMEOUT);

        let path = PathAndQuery::from_static(methods::METHOD_SUBMIT_CERTIFICATE);
        let codec = RawRequestCodec::<SubmitCertificateResponse>::default();
        let response = grpc.unary(request, path, codec).await?;
        Ok(response.into_inner())
    }

    pub async fn get_certificate_header(
        &self,
        req: GetCertificateHeaderRequest,
    ) -> Result<GetCertificateHeaderResponse, Status> {
        let mut client = NodeStateServiceClient::new(self.channel.clone())
            .max_encoding_message_size(MAX_MESSAGE_SIZE)
            .max_decoding_message_size(MAX_MESSAGE_SIZE);

        let mut request = Request::new(req);
        request.set_timeout(CALL_TIMEOUT);
        Ok(client.get_certificate_header(request).await?.into_inner())
    }

    pub async fn get_latest_certificate_header(
        &self,
        req: GetLatestCertificateHeaderRequest,
    ) -> Result<GetLatestCertificateHeaderResponse, Status> {
        let mut client = NodeStateServiceClient::new(self.channel.clone())
            .max_encoding_message_size(MAX_MESSAGE_SIZE)
            .max_decoding_message_size(MAX_MESSAGE_SIZE);

        let mut request = Request::new(req);
        request.set_timeout(CALL_TIMEOUT);
        Ok(client
            .get_latest_certificate_header(request)
            .await?
            .into_inner())
    }
}
