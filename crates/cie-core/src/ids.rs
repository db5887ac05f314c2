// ids.rs — identifier newtypes shared across every cie-* crate.
//
// Three distinct id schemes are in play, matching the external interface
// this engine exposes (spec §6 "Persisted state layout"):
//   - `NodeId` is a human-readable slug the sync coordinator assigns
//     (e.g. "FW-DC1-01"); it is just a newtype around `String`.
//   - `ChangeId` sorts lexicographically by creation time (a ULID-like
//     26-character string), so listing changes by id order is listing
//     them by age.
//   - `ApprovalId`/`AuditId` are monotonic 64-bit integers, issued by an
//     `AtomicU64` counter owned by the store that hands them out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A human-readable slug identifying a topology node (e.g. `"FW-DC1-01"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

const CROCKFORD_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A ULID-like, lexicographically sortable change identifier.
///
/// 10 characters encode the millisecond timestamp, 16 encode randomness —
/// 26 characters total, matching spec §6's "ULID-like 26-char string".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(pub String);

impl ChangeId {
    /// Generate a new id from the given millisecond timestamp.
    ///
    /// Takes the timestamp explicitly (rather than calling `Utc::now()`
    /// internally) so callers can produce deterministic ids in tests.
    pub fn generate(timestamp_millis: u64) -> Self {
        let mut out = String::with_capacity(26);
        out.push_str(&encode_crockford(timestamp_millis, 10));
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let idx = rng.gen_range(0..CROCKFORD_ALPHABET.len());
            out.push(CROCKFORD_ALPHABET[idx] as char);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn encode_crockford(mut value: u64, width: usize) -> String {
    let mut chars = vec![b'0'; width];
    for slot in chars.iter_mut().rev() {
        *slot = CROCKFORD_ALPHABET[(value % 32) as usize];
        value /= 32;
    }
    String::from_utf8(chars).expect("crockford alphabet is ASCII")
}

/// A monotonically increasing id, used for approvals and audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(pub u64);

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonically increasing id, used for audit journal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub u64);

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues monotonically increasing ids starting at 1.
///
/// One instance is owned by each store that needs them (`cie-store` for
/// `ApprovalId`, `cie-audit` for `AuditId`) — no global counter, per the
/// "no global singletons" design note.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Resume a sequence after the given last-issued value (0 if none issued yet).
    pub fn resume_after(last: u64) -> Self {
        Self(AtomicU64::new(last))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_id_is_26_chars() {
        let id = ChangeId::generate(1_700_000_000_000);
        assert_eq!(id.as_str().len(), 26);
    }

    #[test]
    fn change_id_sorts_by_timestamp() {
        let earlier = ChangeId::generate(1_700_000_000_000);
        let later = ChangeId::generate(1_700_000_000_001);
        assert!(earlier.as_str() < later.as_str());
    }

    #[test]
    fn change_ids_with_same_timestamp_are_distinct() {
        let a = ChangeId::generate(1_700_000_000_000);
        let b = ChangeId::generate(1_700_000_000_000);
        assert_ne!(a, b);
    }

    #[test]
    fn id_sequence_is_monotonic_and_starts_at_one() {
        let seq = IdSequence::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
    }

    #[test]
    fn id_sequence_resumes_after_last_issued() {
        let seq = IdSequence::resume_after(41);
        assert_eq!(seq.next(), 42);
    }

    #[test]
    fn node_id_displays_as_its_slug() {
        let id = NodeId::new("FW-DC1-01");
        assert_eq!(id.to_string(), "FW-DC1-01");
    }
}
