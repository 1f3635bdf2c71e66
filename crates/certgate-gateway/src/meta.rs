//! Display metadata derived from a certificate at intercept time.
//!
//! The summary is stored alongside the raw request and is the only thing
//! the status page and the metrics aggregator ever parse; the raw bytes
//! stay opaque.

use serde_json::{json, Map, Value};

use certgate_proto::interop_v1::{aggchain_data, BridgeExit};
use certgate_proto::types_v1::Certificate;

/// Build the JSON summary of a certificate.
pub fn extract(cert: &Certificate) -> Value {
    let mut meta = Map::new();

    meta.insert("height".into(), json!(cert.height));
    meta.insert("network_id".into(), json!(cert.network_id));

    if let Some(root) = &cert.prev_local_exit_root {
        meta.insert("prev_local_exit_root".into(), json!(hex_0x(&root.value)));
    }
    if let Some(root) = &cert.new_local_exit_root {
        meta.insert("new_local_exit_root".into(), json!(hex_0x(&root.value)));
    }

    meta.insert("bridge_exits_count".into(), json!(cert.bridge_exits.len()));
    if !cert.bridge_exits.is_empty() {
        let exits: Vec<Value> = cert.bridge_exits.iter().map(bridge_exit_summary).collect();
        meta.insert("bridge_exits".into(), Value::Array(exits));
    }

    meta.insert(
        "imported_bridge_exits_count".into(),
        json!(cert.imported_bridge_exits.len()),
    );
    if !cert.imported_bridge_exits.is_empty() {
        let exits: Vec<Value> = cert
            .imported_bridge_exits
            .iter()
            .filter_map(|imported| {
                let inner = imported.bridge_exit.as_ref()?;
                let mut summary = bridge_exit_summary(inner);
                if let (Some(map), Some(global_index)) =
                    (summary.as_object_mut(), imported.global_index.as_ref())
                {
                    map.insert("global_index".into(), json!(hex_0x(&global_index.value)));
                }
                Some(summary)
            })
            .collect();
        meta.insert("imported_bridge_exits".into(), Value::Array(exits));
    }

    if let Some(metadata) = &cert.metadata {
        meta.insert("metadata".into(), json!(hex_0x(&metadata.value)));
    }

    if let Some(custom) = &cert.custom_chain_data {
        if !custom.is_empty() {
            meta.insert("custom_chain_data".into(), json!(hex_0x(custom)));
        }
    }

    if cert.l1_info_tree_leaf_count.unwrap_or(0) != 0 {
        meta.insert(
            "l1_info_tree_leaf_count".into(),
            json!(cert.l1_info_tree_leaf_count),
        );
    }

    if let Some(aggchain) = &cert.aggchain_data {
        let mut aggchain_meta = Map::new();
        match &aggchain.data {
            Some(aggchain_data::Data::Signature(signature)) => {
                aggchain_meta.insert("signature".into(), json!(hex_0x(&signature.value)));
            }
            Some(aggchain_data::Data::Generic(generic)) => {
                let mut generic_meta = Map::new();
                if let Some(params) = &generic.aggchain_params {
                    generic_meta.insert("aggchain_params".into(), json!(hex_0x(&params.value)));
                }
                if let Some(signature) = &generic.signature {
                    generic_meta.insert("signature".into(), json!(hex_0x(&signature.value)));
                }
                if !generic.context.is_empty() {
                    generic_meta.insert("context_size".into(), json!(generic.context.len()));
                }
                if let Some(certgate_proto::interop_v1::aggchain_proof::Proof::Sp1Stark(sp1)) =
                    &generic.proof
                {
                    let mut sp1_meta = Map::new();
                    sp1_meta.insert("version".into(), json!(sp1.version));
                    if !sp1.proof.is_empty() {
                        sp1_meta.insert("proof".into(), json!(hex_0x(&sp1.proof)));
                    }
                    if !sp1.vkey.is_empty() {
                        sp1_meta.insert("vkey".into(), json!(hex_0x(&sp1.vkey)));
                    }
                    generic_meta.insert("sp1_stark".into(), Value::Object(sp1_meta));
                }
                aggchain_meta.insert("generic".into(), Value::Object(generic_meta));
            }
            None => {}
        }
        meta.insert("aggchain_data".into(), Value::Object(aggchain_meta));
    }

    Value::Object(meta)
}

fn bridge_exit_summary(exit: &BridgeExit) -> Value {
    let mut summary = Map::new();
    summary.insert("dest_network".into(), json!(exit.dest_network));
    if let Some(amount) = &exit.amount {
        summary.insert(
            "amount".into(),
            json!(bytes_to_u64(&amount.value).to_string()),
        );
    }
    if let Some(dest) = &exit.dest_address {
        summary.insert("dest_address".into(), json!(hex_0x(&dest.value)));
    }
    if let Some(token) = exit
        .token_info
        .as_ref()
        .and_then(|t| t.origin_token_address.as_ref())
    {
        summary.insert("token_address".into(), json!(hex_0x(&token.value)));
    }
    Value::Object(summary)
}

/// Big-endian bytes to u64, keeping the rightmost eight bytes of longer
/// inputs. Display only; value arithmetic elsewhere stays arbitrary
/// precision.
pub fn bytes_to_u64(bytes: &[u8]) -> u64 {
    let start = bytes.len().saturating_sub(8);
    bytes[start..]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn hex_0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
