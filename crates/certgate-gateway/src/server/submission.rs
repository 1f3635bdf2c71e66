//! The intercepted certificate submission method.
//!
//! Every submission is classified into one of two outcomes: forwarded to
//! the upstream immediately, or stored for delayed release. The producer
//! cannot tell the difference; a held submission is answered with the
//! locally computed certificate id.

use num_traits::Zero;
use prost::Message;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use certgate_proto::interop_v1::FixedBytes32;
use certgate_proto::node_v1::certificate_submission_service_server::CertificateSubmissionService;
use certgate_proto::node_v1::{SubmitCertificateRequest, SubmitCertificateResponse};
use certgate_proto::types_v1::{Certificate, CertificateId};

use crate::metrics::MetricsHandle;
use crate::storage::{GatewayStore, StoreError};
use crate::tokens;
use crate::upstream::UpstreamClient;
use crate::{hashing, meta};

pub struct SubmissionService {
    store: GatewayStore,
    upstream: UpstreamClient,
    metrics: MetricsHandle,
}

impl SubmissionService {
    pub fn new(store: GatewayStore, upstream: UpstreamClient, metrics: MetricsHandle) -> Self {
        Self {
            store,
            upstream,
            metrics,
        }
    }

    async fn classify_and_dispatch(
        &self,
        req: SubmitCertificateRequest,
    ) -> Result<SubmitCertificateResponse, Status> {
        info!("received certificate submission request");

        let raw = req.encode_to_vec();
        let cert = req.certificate.unwrap_or_default();
        let network_id = cert.network_id;

        let metadata_json = meta::extract(&cert).to_string();
        let cert_id = hashing::certificate_id(&cert);
        let cert_hex = format!("0x{}", hex::encode(cert_id));

        let delayed = match self.is_chain_delayed(network_id).await {
            Ok(delayed) => delayed,
            Err(err) => {
                error!(chain = network_id, error = %err, "failed to check delayed chains");
                // unknown configuration state never lets a submission slip past
                true
            }
        };

        if !delayed {
            let response = self.forward_immediately(raw, network_id).await?;
            return Ok(response);
        }

        let withdrawal = tokens::total_withdrawal_value(&cert);
        info!(network = network_id, value = %withdrawal, "withdrawal value");

        if withdrawal.is_zero() {
            // pure-inbound certificates are never held
            let response = self.forward_immediately(raw, network_id).await?;
            return Ok(response);
        }

        let suspicious = self
            .check_suspicious(&cert, &cert_hex)
            .await
            .map_err(|err| {
                error!(error = %err, "failed to check for suspicious value");
                Status::internal(format!("failed to check for suspicious value: {err}"))
            })?;

        if suspicious {
            info!(network = network_id, cert = %cert_hex, "certificate is suspicious, holding");
            let id = self
                .store
                .insert_certificate(&raw, &metadata_json, &cert_id)
                .await
                .map_err(|err| {
                    error!(error = %err, "failed to store certificate");
                    Status::internal(format!("failed to store certificate: {err}"))
                })?;
            info!(id, cert = %cert_hex, "certificate held for delayed release");

            Ok(SubmitCertificateResponse {
                certificate_id: Some(CertificateId {
                    value: Some(FixedBytes32 {
                        value: cert_id.to_vec(),
                    }),
                }),
            })
        } else {
            info!(network = network_id, "certificate doesn't appear suspicious, sending immediately");
            self.forward_immediately(raw, network_id).await
        }
    }

    async fn forward_immediately(
        &self,
        raw: Vec<u8>,
        network_id: u32,
    ) -> Result<SubmitCertificateResponse, Status> {
        match self.upstream.submit_raw(raw).await {
            Ok(response) => {
                info!(network = network_id, "forwarded certificate upstream");
                Ok(response)
            }
            Err(status) => {
                error!(network = network_id, error = %status, "failed to forward certificate upstream");
                Err(status)
            }
        }
    }

    async fn is_chain_delayed(&self, network_id: u32) -> Result<bool, StoreError> {
        Ok(self
            .delayed_chains()
            .await?
            .contains(&network_id))
    }

    pub(crate) async fn delayed_chains(&self) -> Result<Vec<u32>, StoreError> {
        let value = self.store.get_config("delayed_chains").await?;
        Ok(parse_chain_ids(&value))
    }

    /// Evaluate the dollar value of all outgoing movements against the
    /// configured threshold. Anything the configuration cannot price is
    /// suspicious; only store I/O failures surface as errors.
    async fn check_suspicious(&self, cert: &Certificate, cert_hex: &str) -> Result<bool, StoreError> {
        let threshold_raw = self.store.get_config("suspicious_value").await?;
        let token_values_raw = self.store.get_config("token_values").await?;

        if threshold_raw.is_empty() && token_values_raw.is_empty() {
            info!(cert = %cert_hex, "no suspicious value configuration found, treating as suspicious");
            return Ok(true);
        }

        let threshold: u64 = match threshold_raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(cert = %cert_hex, value = %threshold_raw, "unparseable suspicious_value, treating as suspicious");
                return Ok(true);
            }
        };

        let prices = match tokens::parse_token_values(&token_values_raw) {
            Ok(prices) => prices,
            Err(err) => {
                warn!(cert = %cert_hex, error = %err, "unparseable token_values, treating as suspicious");
                return Ok(true);
            }
        };

        match tokens::certificate_dollar_value(cert, &prices) {
            None => {
                warn!(cert = %cert_hex, "token address not found in configuration");
                Ok(true)
            }
            Some(total) => {
                info!(cert = %cert_hex, value = %total, limit = threshold, "suspicious value calculation");
                Ok(total > threshold.into())
            }
        }
    }
}

/// Parse a comma-separated chain id list, skipping malformed entries.
pub fn parse_chain_ids(value: &str) -> Vec<u32> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse::<u32>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(chain = part, "invalid chain id in configuration");
                None
            }
        })
        .collect()
}

#[tonic::async_trait]
impl CertificateSubmissionService for SubmissionService {
    async fn submit_certificate(
        &self,
        request: Request<SubmitCertificateRequest>,
    ) -> Result<Response<SubmitCertificateResponse>, Status> {
        let result = self.classify_and_dispatch(request.into_inner()).await;
        self.metrics.trigger();
        result.map(Response::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_parsing_skips_garbage() {
        assert_eq!(parse_chain_ids("1,137"), vec![1, 137]);
        assert_eq!(parse_chain_ids(" 1 , 137 "), vec![1, 137]);
        assert_eq!(parse_chain_ids("1,abc,137"), vec![1, 137]);
        assert_eq!(parse_chain_ids(""), Vec::<u32>::new());
    }
}
