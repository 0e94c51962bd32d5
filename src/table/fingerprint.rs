//! Collection fingerprints for optimistic concurrency
//!
//! The fingerprint is a CRC32 over the sorted concatenation of each record's
//! id and updated-timestamp. It only needs to detect change between plan and
//! commit, not resist tampering.

use crc32fast::Hasher;

use super::record::Record;

/// Computes the change-detection fingerprint of a collection.
///
/// Deterministic and order-independent: the id/updated pairs are sorted
/// before hashing, so two loads of the same data always agree.
pub fn compute_fingerprint(records: &[Record]) -> u32 {
    let mut pairs: Vec<String> = records
        .iter()
        .map(|r| format!("{}|{}", r.id, r.updated.to_rfc3339()))
        .collect();
    pairs.sort_unstable();

    let mut hasher = Hasher::new();
    for pair in &pairs {
        hasher.update(pair.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize()
}
