//! Cached data for compiled modules
//!
//! The artifact is the serialized [`CompiledUnit`] tagged with a format version
//! and the SHA-256 of the source it was compiled from. It is only accepted for
//! the exact same source text.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::unit::CompiledUnit;

/// Bumped whenever [`CompiledUnit`] changes shape
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheArtifact {
    version: u32,
    source_hash: String,
    unit: CompiledUnit,
}

/// Hex SHA-256 of module source
pub fn source_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Serialize `unit` for the source hashing to `source_hash`
pub fn encode(source_hash: &str, unit: &CompiledUnit) -> Result<Vec<u8>, serde_json::Error> {
    let artifact = CacheArtifact {
        version: CACHE_FORMAT_VERSION,
        source_hash: source_hash.to_string(),
        unit: unit.clone(),
    };
    serde_json::to_vec(&artifact)
}

/// Decode an artifact, returning `None` when it is malformed, from another
/// format version, or compiled from different source.
pub fn decode(bytes: &[u8], expected_hash: &str) -> Option<CompiledUnit> {
    let artifact: CacheArtifact = match serde_json::from_slice(bytes) {
        Ok(artifact) => artifact,
        Err(err) => {
            log::debug!("rejecting cached data: {}", err);
            return None;
        }
    };
    if artifact.version != CACHE_FORMAT_VERSION {
        log::debug!(
            "rejecting cached data: format version {} (expected {})",
            artifact.version,
            CACHE_FORMAT_VERSION
        );
        return None;
    }
    if artifact.source_hash != expected_hash {
        log::debug!("rejecting cached data: source hash mismatch");
        return None;
    }
    Some(artifact.unit)
}
