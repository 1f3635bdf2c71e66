//! Agglayer Protocol Buffers
//!
//! Generated protobuf code for the aggregation-layer gRPC API the gateway
//! intercepts and forwards.
//!
//! This crate contains:
//! - `CertificateSubmissionService` for certificate submission
//! - `NodeStateService` for certificate header queries
//! - The interop types (bridge exits, claims, proofs) they are built from

/// Generated agglayer API definitions, nested by protobuf package.
#[allow(
    clippy::derive_partial_eq_without_eq,
    clippy::pedantic,
    clippy::nursery
)]
pub mod agglayer {
    pub mod interop {
        pub mod types {
            pub mod v1 {
                tonic::include_proto!("agglayer.interop.types.v1");
            }
        }
    }

    pub mod node {
        pub mod types {
            pub mod v1 {
                tonic::include_proto!("agglayer.node.types.v1");
            }
        }

        pub mod v1 {
            tonic::include_proto!("agglayer.node.v1");
        }
    }
}

// Short aliases for the three packages downstream code actually touches.
pub use agglayer::interop::types::v1 as interop_v1;
pub use agglayer::node::types::v1 as types_v1;
pub use agglayer::node::v1 as node_v1;

/// Named constants for the gRPC method paths the gateway intercepts.
pub mod methods;
