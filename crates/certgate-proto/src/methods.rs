//! Named constants for the gRPC method paths used across the gateway.
//!
//! These are derived from the protobuf service definitions and are shared
//! between the interceptors, the upstream client, and the transparent
//! forwarder so that method paths stay in sync without duplicating string
//! literals.

/// `CertificateSubmissionService/SubmitCertificate`
pub const METHOD_SUBMIT_CERTIFICATE: &str =
    "/agglayer.node.v1.CertificateSubmissionService/SubmitCertificate";

/// `NodeStateService/GetCertificateHeader`
pub const METHOD_GET_CERTIFICATE_HEADER: &str =
    "/agglayer.node.v1.NodeStateService/GetCertificateHeader";

/// `NodeStateService/GetLatestCertificateHeader`
pub const METHOD_GET_LATEST_CERTIFICATE_HEADER: &str =
    "/agglayer.node.v1.NodeStateService/GetLatestCertificateHeader";
