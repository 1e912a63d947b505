//! Canonical JSON serialization used as hash input.
//!
//! Per spec.md §3/§6: "Canonical serialization" means deterministic JSON —
//! sorted keys, UTF-8, no optional whitespace. `serde_json::Value`'s
//! `BTreeMap`-backed object already sorts keys on serialize, so canonicalizing
//! is just: serialize to a `Value`, then re-serialize compact.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Implemented by anything that needs a stable hash input.
pub trait CanonicalJson: Serialize {
    /// Canonical, whitespace-free, sorted-key JSON bytes.
    fn canonical_bytes(&self) -> Vec<u8> {
        canonical_json(self).into_bytes()
    }

    /// Hex-encoded SHA-256 of `canonical_bytes`.
    fn canonical_hash(&self) -> String {
        sha256_hex(&self.canonical_bytes())
    }
}

impl<T: Serialize> CanonicalJson for T {}

/// Serialize `value` to compact JSON with keys sorted at every level.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    let v = serde_json::to_value(value).expect("canonical serialization is infallible for domain types");
    // serde_json::Value's Map is a BTreeMap (default feature set), so object
    // keys are already emitted in sorted order; `to_string` (not `to_string_pretty`)
    // gives us the no-whitespace form spec.md requires.
    serde_json::to_string(&v).expect("canonical serialization is infallible for domain types")
}

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
