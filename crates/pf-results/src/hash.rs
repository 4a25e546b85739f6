//! Content-based hashing for run IDs.

use pf_protocol::Protocol;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash of everything that determines a run's results.
///
/// `options` is any serializable description of the run settings (backend,
/// initial state, cut-offs).
pub fn compute_run_id<T: Serialize>(
    pack_id: &str,
    protocol: &Protocol,
    options: &T,
    solver_version: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pack_id.as_bytes());

    let protocol_json = serde_json::to_string(protocol).unwrap_or_default();
    hasher.update(protocol_json.as_bytes());

    let options_json = serde_json::to_string(options).unwrap_or_default();
    hasher.update(options_json.as_bytes());

    hasher.update(solver_version.as_bytes());
    format!("{:x}", hasher.finalize())
}
