use std::collections::HashMap;

use super::OwnerRow;

/// One DID owner with every address it holds NFTs through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSummary {
    pub owner_encoded_id: String,
    pub addresses: Vec<String>,
    pub nft_count: usize,
}

/// Group rows by owner DID in first-seen order. Rows without a DID are skipped.
pub fn summarize(rows: &[OwnerRow]) -> Vec<OwnerSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut owners: Vec<OwnerSummary> = Vec::new();

    for row in rows.iter().filter(|r| r.has_did()) {
        let slot = *index.entry(row.owner_encoded_id.as_str()).or_insert_with(|| {
            owners.push(OwnerSummary {
                owner_encoded_id: row.owner_encoded_id.clone(),
                addresses: Vec::new(),
                nft_count: 0,
            });
            owners.len() - 1
        });

        let owner = &mut owners[slot];
        owner.nft_count += 1;
        if row.has_address() && !owner.addresses.contains(&row.owner_address_encoded_id) {
            owner.addresses.push(row.owner_address_encoded_id.clone());
        }
    }

    owners
}

/// Number of rows not linked to any DID.
pub fn unlinked_count(rows: &[OwnerRow]) -> usize {
    rows.iter().filter(|r| !r.has_did()).count()
}
