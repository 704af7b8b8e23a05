//! Test utilities associated with ids.

use crate::random_bytes;
use bytes::Bytes;
use lassie_api::{Cid, ProviderId};

/// CIDv1 prefix: version 1, raw codec, sha2-256 multihash of 32 bytes.
const CID_V1_RAW_SHA256: [u8; 4] = [0x01, 0x55, 0x12, 0x20];

/// The CIDv1 (raw, sha2-256) of `data`.
pub fn cid_for(data: &[u8]) -> Cid {
    use sha2::{Digest, Sha256};
    let mut out = CID_V1_RAW_SHA256.to_vec();
    out.extend_from_slice(&Sha256::digest(data));
    Bytes::from(out).into()
}

/// Create a random, well-formed cid.
pub fn random_cid() -> Cid {
    cid_for(&random_bytes(32))
}

/// Create a random provider id.
pub fn random_provider_id() -> ProviderId {
    Bytes::from(random_bytes(32)).into()
}
