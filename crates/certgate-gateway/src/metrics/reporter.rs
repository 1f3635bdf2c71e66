//! Prometheus metric registration and publication.

use std::collections::HashMap;

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use prometheus::{Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};

/// A snapshot of the held-certificate queue.
#[derive(Debug, Default)]
pub struct Totals {
    pub cert_count: u64,
    pub networks: HashMap<u32, BigUint>,
}

pub struct PrometheusReporter {
    registry: Registry,
    certificate_total: IntCounter,
    certificate_total_eth: Gauge,
    network_gauges: HashMap<u32, Gauge>,
}

impl PrometheusReporter {
    /// Register the queue metrics plus one gauge per configured network.
    /// Networks outside this list never get a gauge.
    pub fn new(networks: &[u32]) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let certificate_total = IntCounter::with_opts(Opts::new(
            "certificate_total_count",
            "Total number of certificates open in the queue",
        ))?;
        registry.register(Box::new(certificate_total.clone()))?;

        let certificate_total_eth = Gauge::with_opts(Opts::new(
            "certificate_total_eth",
            "Total value of ETH open in the queue across all networks",
        ))?;
        registry.register(Box::new(certificate_total_eth.clone()))?;

        let mut network_gauges = HashMap::new();
        for &network in networks {
            let gauge = Gauge::with_opts(Opts::new(
                format!("network_{network}_total_eth"),
                format!("Total amount of tokens bridged on network {network} in ETH"),
            ))?;
            registry.register(Box::new(gauge.clone()))?;
            network_gauges.insert(network, gauge);
        }

        Ok(Self {
            registry,
            certificate_total,
            certificate_total_eth,
            network_gauges,
        })
    }

    pub fn report_totals(&self, totals: &Totals) {
        self.certificate_total.inc_by(totals.cert_count);

        let mut grand_total = BigUint::default();
        for (network, gauge) in &self.network_gauges {
            match totals.networks.get(network) {
                Some(total) => {
                    gauge.set(wei_to_eth(total));
                    grand_total += total;
                }
                None => gauge.set(0.0),
            }
        }

        self.certificate_total_eth.set(wei_to_eth(&grand_total));
    }

    /// Prometheus text exposition for the scrape endpoint.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {e}")))
    }
}

/// Convert wei to ETH with the fixed 10^18 denominator, regardless of the
/// underlying token.
fn wei_to_eth(wei: &BigUint) -> f64 {
    const WEI_PER_ETH: f64 = 1e18;
    wei.to_f64().unwrap_or(f64::MAX) / WEI_PER_ETH
}
