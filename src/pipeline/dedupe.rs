use std::collections::HashSet;

use super::OwnerRow;

/// Which owner identity collapses duplicate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DedupeStrategy {
    /// First row per owner DID
    Did,
    /// First row per owner address
    Address,
}

/// Keep the first row per owner, in first-occurrence order.
///
/// Rows carrying the sentinel for the chosen key are never matched against each other,
/// so every unlinked row survives.
pub fn dedupe(rows: Vec<OwnerRow>, strategy: DedupeStrategy) -> Vec<OwnerRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let (key, linked) = match strategy {
                DedupeStrategy::Did => (&row.owner_encoded_id, row.has_did()),
                DedupeStrategy::Address => (&row.owner_address_encoded_id, row.has_address()),
            };
            !linked || seen.insert(key.clone())
        })
        .collect()
}
