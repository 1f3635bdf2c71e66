//! gRPC surface of the gateway.
//!
//! Two methods are intercepted (certificate submission and the
//! certificate-header lookup); everything else falls through to the
//! transparent forwarder.

pub mod forwarder;
pub mod node_state;
pub mod submission;

pub use forwarder::TransparentForwarder;
pub use node_state::NodeStateInterceptor;
pub use submission::SubmissionService;

use certgate_proto::node_v1::certificate_submission_service_server::CertificateSubmissionServiceServer;
use certgate_proto::node_v1::node_state_service_server::NodeStateServiceServer;

use crate::upstream::MAX_MESSAGE_SIZE;

/// Build the producer-facing gRPC router: the intercepted services on the
/// registered path, the forwarder as the fallback for every other method.
pub fn build_grpc_router(
    submission: SubmissionService,
    node_state: NodeStateInterceptor,
    forwarder: TransparentForwarder,
) -> axum::Router {
    let routes = tonic::service::Routes::new(
        CertificateSubmissionServiceServer::new(submission)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE),
    )
    .add_service(
        NodeStateServiceServer::new(node_state)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE),
    );

    routes.into_axum_router().fallback_service(forwarder)
}
