//! Deterministic certificate identifier computation.
//!
//! The identifier must match what the aggregation layer computes for the
//! same submission: Keccak-256 throughout, all integers big-endian.

use sha3::{Digest, Keccak256};

use certgate_proto::interop_v1::{imported_bridge_exit::Claim, BridgeExit, ImportedBridgeExit, LeafType};
use certgate_proto::types_v1::Certificate;

/// keccak256 of the canonical empty metadata, used when a bridge exit
/// carries no metadata field.
pub const EMPTY_METADATA_HASH: [u8; 32] = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
];

/// Compute the 32-byte certificate identifier.
pub fn certificate_id(cert: &Certificate) -> [u8; 32] {
    let exit_hashes: Vec<[u8; 32]> = cert.bridge_exits.iter().map(hash_bridge_exit).collect();
    let combined_exits = keccak_concat(exit_hashes.iter().map(|h| h.as_slice()));

    let imported_hashes: Vec<[u8; 32]> = cert
        .imported_bridge_exits
        .iter()
        .map(hash_imported_bridge_exit)
        .collect();
    let combined_imported = keccak_concat(imported_hashes.iter().map(|h| h.as_slice()));

    let mut hasher = Keccak256::new();
    hasher.update(cert.network_id.to_be_bytes());
    hasher.update(cert.height.to_be_bytes());
    hasher.update(fixed32(&cert.prev_local_exit_root));
    hasher.update(fixed32(&cert.new_local_exit_root));
    hasher.update(combined_exits);
    hasher.update(combined_imported);
    match &cert.metadata {
        Some(metadata) => hasher.update(&metadata.value),
        None => hasher.update([0u8; 32]),
    }
    hasher.finalize().into()
}

/// Hash one bridge exit leaf.
pub fn hash_bridge_exit(exit: &BridgeExit) -> [u8; 32] {
    let mut hasher = Keccak256::new();

    // leaf type collapses to a single byte: 0 for transfers, 1 otherwise
    let leaf_byte: u8 = if exit.leaf_type == LeafType::Transfer as i32 {
        0
    } else {
        1
    };
    hasher.update([leaf_byte]);

    let origin_network = exit
        .token_info
        .as_ref()
        .map(|t| t.origin_network)
        .unwrap_or_default();
    hasher.update(origin_network.to_be_bytes());

    let origin_token = exit
        .token_info
        .as_ref()
        .and_then(|t| t.origin_token_address.as_ref())
        .map(|a| a.value.as_slice())
        .unwrap_or_default();
    hasher.update(origin_token);

    hasher.update(exit.dest_network.to_be_bytes());
    hasher.update(
        exit.dest_address
            .as_ref()
            .map(|a| a.value.as_slice())
            .unwrap_or_default(),
    );

    hasher.update(amount_bytes(
        exit.amount
            .as_ref()
            .map(|a| a.value.as_slice())
            .unwrap_or_default(),
    ));

    match &exit.metadata {
        Some(metadata) => hasher.update(&metadata.value),
        None => hasher.update(EMPTY_METADATA_HASH),
    }

    hasher.finalize().into()
}

/// Hash one imported bridge exit, including its claim digest and global index.
pub fn hash_imported_bridge_exit(imported: &ImportedBridgeExit) -> [u8; 32] {
    let mut hasher = Keccak256::new();

    let inner = imported.bridge_exit.clone().unwrap_or_default();
    hasher.update(hash_bridge_exit(&inner));

    match &imported.claim {
        Some(Claim::Mainnet(mainnet)) => {
            let leaf_mer = proof_hash(
                mainnet
                    .proof_leaf_mer
                    .as_ref()
                    .map(|p| (fixed32(&p.root), &p.siblings)),
            );
            let ger_l1root = proof_hash(
                mainnet
                    .proof_ger_l1root
                    .as_ref()
                    .map(|p| (fixed32(&p.root), &p.siblings)),
            );
            let l1_leaf = mainnet.l1_leaf.clone().unwrap_or_default();
            let ger = keccak2(fixed32(&l1_leaf.mer), fixed32(&l1_leaf.rer));
            let inner_leaf = l1_leaf.inner.unwrap_or_default();

            let mut leaf_hasher = Keccak256::new();
            leaf_hasher.update(ger);
            leaf_hasher.update(fixed32(&inner_leaf.block_hash));
            leaf_hasher.update(inner_leaf.timestamp.to_be_bytes());
            let l1_leaf_hash: [u8; 32] = leaf_hasher.finalize().into();

            let mut claim_hasher = Keccak256::new();
            claim_hasher.update(leaf_mer);
            claim_hasher.update(ger_l1root);
            claim_hasher.update(l1_leaf_hash);
            let claim_hash: [u8; 32] = claim_hasher.finalize().into();
            hasher.update(claim_hash);
        }
        Some(Claim::Rollup(rollup)) => {
            let leaf_ler = proof_hash(
                rollup
                    .proof_leaf_ler
                    .as_ref()
                    .map(|p| (fixed32(&p.root), &p.siblings)),
            );
            let ler_rer = proof_hash(
                rollup
                    .proof_ler_rer
                    .as_ref()
                    .map(|p| (fixed32(&p.root), &p.siblings)),
            );
            let ger_l1root = proof_hash(
                rollup
                    .proof_ger_l1root
                    .as_ref()
                    .map(|p| (fixed32(&p.root), &p.siblings)),
            );
            let l1_leaf = rollup.l1_leaf.clone().unwrap_or_default();
            let ger = keccak2(fixed32(&l1_leaf.mer), fixed32(&l1_leaf.rer));
            let inner_leaf = l1_leaf.inner.unwrap_or_default();

            // the rollup layout keeps the L1 leaf preimage raw, not pre-hashed
            let mut claim_hasher = Keccak256::new();
            claim_hasher.update(leaf_ler);
            claim_hasher.update(ler_rer);
            claim_hasher.update(ger_l1root);
            claim_hasher.update(ger);
            claim_hasher.update(fixed32(&inner_leaf.block_hash));
            claim_hasher.update(inner_leaf.timestamp.to_be_bytes());
            let claim_hash: [u8; 32] = claim_hasher.finalize().into();
            hasher.update(claim_hash);
        }
        None => {}
    }

    hasher.update(
        imported
            .global_index
            .as_ref()
            .map(|g| g.value.as_slice())
            .unwrap_or_default(),
    );

    hasher.finalize().into()
}

/// keccak256(root || sibling_0 || sibling_1 || ...); empty input when the
/// proof itself is missing.
fn proof_hash(
    proof: Option<(&[u8], &Vec<certgate_proto::interop_v1::FixedBytes32>)>,
) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    if let Some((root, siblings)) = proof {
        hasher.update(root);
        for sibling in siblings {
            hasher.update(&sibling.value);
        }
    }
    hasher.finalize().into()
}

fn keccak2(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

fn keccak_concat<'a>(parts: impl Iterator<Item = &'a [u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Amounts are 32 bytes big-endian: left-zero-padded when short, the
/// rightmost 32 bytes when longer.
fn amount_bytes(value: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    if value.len() <= 32 {
        out[32 - value.len()..].copy_from_slice(value);
    } else {
        out.copy_from_slice(&value[value.len() - 32..]);
    }
    out
}

fn fixed32(value: &Option<certgate_proto::interop_v1::FixedBytes32>) -> &[u8] {
    value.as_ref().map(|v| v.value.as_slice()).unwrap_or_default()
}
