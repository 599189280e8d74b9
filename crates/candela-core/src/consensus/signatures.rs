//! Block-signature verification: reconstruct the signing subset, check every
//! ed25519 signature, and enforce the two-thirds weight threshold.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::collections::HashMap;

use crate::cell::sha256;
use crate::schema::{CatchainConfig, ValidatorDescr, ValidatorSet};
use crate::types::{MASTERCHAIN, MASTERCHAIN_SHARD};

use super::{prng::ValidatorSetPrng, ConsensusError};

/// Magic prefix of the signed payload for block signatures.
const BLOCK_SIGN_MAGIC: [u8; 4] = [0x70, 0x6e, 0x0b, 0xc5];
/// Magic prefix of the short node-id hash.
const NODE_ID_MAGIC: [u8; 4] = [0xc6, 0xb4, 0x13, 0x48];
/// Magic leading the validator-list CRC buffer.
const VALIDATOR_LIST_MAGIC: u32 = 0x901660ED;

const CRC32C: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);

/// A signature as delivered by a provider: short node id plus raw bytes.
#[derive(Clone, Copy, Debug)]
pub struct BlockSignature {
    pub node_id_short: [u8; 32],
    pub signature: [u8; 64],
}

/// SHA-256 over the node-id magic and the public key.
pub fn node_id_short(public_key: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 36];
    buf[..4].copy_from_slice(&NODE_ID_MAGIC);
    buf[4..].copy_from_slice(public_key);
    sha256(&buf)
}

/// The 68-byte payload every validator signs for a block.
pub fn block_sign_payload(root_hash: &[u8; 32], file_hash: &[u8; 32]) -> [u8; 68] {
    let mut buf = [0u8; 68];
    buf[..4].copy_from_slice(&BLOCK_SIGN_MAGIC);
    buf[4..36].copy_from_slice(root_hash);
    buf[36..].copy_from_slice(file_hash);
    buf
}

/// Short hash of a validator subset, as embedded in block headers.
pub fn validators_list_hash(nodes: &[ValidatorDescr], cc_seqno: u32) -> u32 {
    let mut buf = Vec::with_capacity(12 + nodes.len() * 72);
    buf.extend_from_slice(&VALIDATOR_LIST_MAGIC.to_le_bytes());
    buf.extend_from_slice(&cc_seqno.to_le_bytes());
    buf.extend_from_slice(&(nodes.len() as u32).to_le_bytes());
    for node in nodes {
        buf.extend_from_slice(&node.public_key);
        buf.extend_from_slice(&node.weight.to_le_bytes());
        buf.extend_from_slice(&node.adnl_addr.unwrap_or([0u8; 32]));
    }
    CRC32C.checksum(&buf)
}

/// Selects the masterchain signing subset for one catchain session,
/// shuffling with [`ValidatorSetPrng`] when the config says so.
pub fn compute_mc_validator_subset(
    vset: &ValidatorSet,
    catchain: &CatchainConfig,
    cc_seqno: u32,
) -> Vec<ValidatorDescr> {
    let count = (vset.main.min(vset.total) as usize).min(vset.list.len());
    if !catchain.shuffle_mc_validators {
        return vset.list[..count].to_vec();
    }
    let mut prng = ValidatorSetPrng::new(MASTERCHAIN_SHARD, MASTERCHAIN, cc_seqno);
    let mut idx = vec![0usize; count];
    for i in 0..count {
        let j = prng.next_ranged(i as u64 + 1) as usize;
        idx[i] = idx[j];
        idx[j] = i;
    }
    idx.into_iter().map(|i| vset.list[i]).collect()
}

/// Verifies the signature set against the subset and enforces the strict
/// `signed·3 > total·2` threshold. Returns the signed weight.
pub fn check_block_signatures(
    nodes: &[ValidatorDescr],
    signatures: &[BlockSignature],
    root_hash: &[u8; 32],
    file_hash: &[u8; 32],
) -> Result<u64, ConsensusError> {
    let mut by_id: HashMap<[u8; 32], &ValidatorDescr> = HashMap::with_capacity(nodes.len());
    let mut total_weight: u128 = 0;
    for node in nodes {
        total_weight += node.weight as u128;
        by_id.insert(node_id_short(&node.public_key), node);
    }
    if total_weight == 0 {
        return Err(ConsensusError::InsufficientSignatureWeight {
            signed: 0,
            total: 0,
        });
    }

    let payload = block_sign_payload(root_hash, file_hash);
    let mut seen: Vec<[u8; 32]> = Vec::with_capacity(signatures.len());
    let mut signed_weight: u128 = 0;
    for sig in signatures {
        let node = by_id
            .get(&sig.node_id_short)
            .ok_or(ConsensusError::UnknownSigner {
                node_id: sig.node_id_short,
            })?;
        if seen.contains(&sig.node_id_short) {
            return Err(ConsensusError::DuplicateSignature {
                node_id: sig.node_id_short,
            });
        }
        seen.push(sig.node_id_short);

        let key = VerifyingKey::from_bytes(&node.public_key).map_err(|_| {
            ConsensusError::InvalidSignature {
                node_id: sig.node_id_short,
            }
        })?;
        key.verify(&payload, &Signature::from_bytes(&sig.signature))
            .map_err(|_| ConsensusError::InvalidSignature {
                node_id: sig.node_id_short,
            })?;

        signed_weight += node.weight as u128;
        if signed_weight * 3 > total_weight * 2 {
            break;
        }
    }

    if signed_weight * 3 <= total_weight * 2 {
        return Err(ConsensusError::InsufficientSignatureWeight {
            signed: signed_weight as u64,
            total: total_weight as u64,
        });
    }
    Ok(signed_weight as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn make_validators(n: usize, weight: u64) -> (Vec<SigningKey>, Vec<ValidatorDescr>) {
        let mut keys = Vec::new();
        let mut descrs = Vec::new();
        for i in 0..n {
            let key = SigningKey::from_bytes(&[i as u8 + 1; 32]);
            descrs.push(ValidatorDescr {
                public_key: key.verifying_key().to_bytes(),
                weight,
                adnl_addr: None,
            });
            keys.push(key);
        }
        (keys, descrs)
    }

    fn sign_all(keys: &[SigningKey], root: &[u8; 32], file: &[u8; 32]) -> Vec<BlockSignature> {
        let payload = block_sign_payload(root, file);
        keys.iter()
            .map(|k| BlockSignature {
                node_id_short: node_id_short(&k.verifying_key().to_bytes()),
                signature: k.sign(&payload).to_bytes(),
            })
            .collect()
    }

    #[test]
    fn test_all_signatures_pass() {
        let (keys, descrs) = make_validators(3, 10);
        let sigs = sign_all(&keys, &[1; 32], &[2; 32]);
        let signed = check_block_signatures(&descrs, &sigs, &[1; 32], &[2; 32]).unwrap();
        assert!(signed * 3 > 30 * 2);
    }

    #[test]
    fn test_two_thirds_is_not_enough() {
        // 20 of 30: 60 > 60 is false, strictly-greater must fail
        let (keys, descrs) = make_validators(3, 10);
        let sigs = sign_all(&keys[..2], &[1; 32], &[2; 32]);
        assert!(matches!(
            check_block_signatures(&descrs, &sigs, &[1; 32], &[2; 32]),
            Err(ConsensusError::InsufficientSignatureWeight {
                signed: 20,
                total: 30
            })
        ));
    }

    #[test]
    fn test_unknown_signer() {
        let (_, descrs) = make_validators(2, 10);
        let stranger = SigningKey::from_bytes(&[0x77; 32]);
        let sigs = sign_all(&[stranger], &[1; 32], &[2; 32]);
        assert!(matches!(
            check_block_signatures(&descrs, &sigs, &[1; 32], &[2; 32]),
            Err(ConsensusError::UnknownSigner { .. })
        ));
    }

    #[test]
    fn test_duplicate_signer() {
        let (keys, descrs) = make_validators(2, 10);
        let mut sigs = sign_all(&keys, &[1; 32], &[2; 32]);
        sigs.push(sigs[0]);
        assert!(matches!(
            check_block_signatures(&descrs, &sigs, &[1; 32], &[2; 32]),
            Err(ConsensusError::DuplicateSignature { .. })
        ));
    }

    #[test]
    fn test_tampered_payload() {
        let (keys, descrs) = make_validators(3, 10);
        let sigs = sign_all(&keys, &[1; 32], &[2; 32]);
        // same signatures presented for a different block
        assert!(matches!(
            check_block_signatures(&descrs, &sigs, &[9; 32], &[2; 32]),
            Err(ConsensusError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_zero_weight_set() {
        let (keys, descrs) = make_validators(2, 0);
        let sigs = sign_all(&keys, &[1; 32], &[2; 32]);
        assert!(matches!(
            check_block_signatures(&descrs, &sigs, &[1; 32], &[2; 32]),
            Err(ConsensusError::InsufficientSignatureWeight { total: 0, .. })
        ));
    }

    #[test]
    fn test_list_hash_changes_with_session() {
        let (_, descrs) = make_validators(3, 10);
        assert_ne!(
            validators_list_hash(&descrs, 7),
            validators_list_hash(&descrs, 8)
        );
        assert_eq!(
            validators_list_hash(&descrs, 7),
            validators_list_hash(&descrs, 7)
        );
    }

    fn dummy_set(n: usize, main: u16) -> ValidatorSet {
        let (_, list) = make_validators(n, 1);
        ValidatorSet {
            utime_since: 0,
            utime_until: 0,
            total: n as u16,
            main,
            total_weight: Some(n as u64),
            list,
        }
    }

    #[test]
    fn test_subset_without_shuffle_takes_prefix() {
        let vset = dummy_set(5, 3);
        let catchain = CatchainConfig {
            shuffle_mc_validators: false,
            mc_catchain_lifetime: 0,
            shard_catchain_lifetime: 0,
            shard_validators_lifetime: 0,
            shard_validators_num: 0,
        };
        let subset = compute_mc_validator_subset(&vset, &catchain, 9);
        assert_eq!(subset.len(), 3);
        assert_eq!(subset[0].public_key, vset.list[0].public_key);
    }

    #[test]
    fn test_subset_shuffle_is_a_permutation() {
        let vset = dummy_set(7, 7);
        let catchain = CatchainConfig {
            shuffle_mc_validators: true,
            mc_catchain_lifetime: 0,
            shard_catchain_lifetime: 0,
            shard_validators_lifetime: 0,
            shard_validators_num: 0,
        };
        let subset = compute_mc_validator_subset(&vset, &catchain, 9);
        assert_eq!(subset.len(), 7);
        let mut seen: Vec<[u8; 32]> = subset.iter().map(|v| v.public_key).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
        // deterministic across runs
        let again = compute_mc_validator_subset(&vset, &catchain, 9);
        assert_eq!(
            subset.iter().map(|v| v.public_key).collect::<Vec<_>>(),
            again.iter().map(|v| v.public_key).collect::<Vec<_>>()
        );
    }
}
