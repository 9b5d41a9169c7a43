//! Catalogue fingerprints

use sha2::{Digest, Sha256};
use std::fmt;

use crate::schema::SchemaEntry;

/// SHA256 fingerprint, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Fingerprint of a set of catalogue entries
    ///
    /// Covers `name`, `kind` and `id` only, one `name|kind|id` line per entry
    /// in name order, so two stores with the same layout agree regardless of
    /// registration order or timestamps.
    pub fn of_entries<'a>(entries: impl IntoIterator<Item = &'a SchemaEntry>) -> Self {
        let mut lines: Vec<String> = entries
            .into_iter()
            .map(|e| format!("{}|{}|{}", e.name, e.kind, e.id.get()))
            .collect();
        lines.sort();
        Self::from_bytes(lines.join("\n").as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for display
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, SchemaId};
    use chrono::{Duration, Utc};

    fn entry(name: &str, kind: FieldKind, id: u32) -> SchemaEntry {
        SchemaEntry {
            name: name.to_string(),
            kind,
            id: SchemaId(id),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_order_and_time() {
        let a = entry("peers", FieldKind::Index, 1);
        let mut b = entry("counter", FieldKind::Uint64, 2);
        let first = Checksum::of_entries([&a, &b]);

        b.created_at = b.created_at - Duration::days(3);
        let second = Checksum::of_entries([&b, &a]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprint_tracks_layout() {
        let a = entry("peers", FieldKind::Index, 1);
        let b = entry("peers", FieldKind::Index, 2);
        assert_ne!(Checksum::of_entries([&a]), Checksum::of_entries([&b]));
    }

    #[test]
    fn test_hex_length() {
        let checksum = Checksum::from_bytes(b"");
        assert_eq!(checksum.as_str().len(), 64);
        assert_eq!(checksum.short().len(), 12);
    }
}
