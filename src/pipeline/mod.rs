pub mod dedupe;
pub mod extract;
pub mod summary;

use crate::fetcher::Item;
pub use dedupe::DedupeStrategy;

pub const NO_NFT: &str = "No NFT";
pub const NO_ADDRESS: &str = "No Address";
pub const NO_DID: &str = "No DID";

/// Output column order.
pub const COLUMNS: [&str; 3] = ["encoded_id", "owner_address_encoded_id", "owner_encoded_id"];

/// One normalized NFT/owner record. Absent source fields hold the sentinel values above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRow {
    pub encoded_id: String,
    pub owner_address_encoded_id: String,
    pub owner_encoded_id: String,
}

impl OwnerRow {
    pub fn fields(&self) -> [&str; 3] {
        [
            self.encoded_id.as_str(),
            self.owner_address_encoded_id.as_str(),
            self.owner_encoded_id.as_str(),
        ]
    }

    pub fn has_did(&self) -> bool {
        self.owner_encoded_id != NO_DID
    }

    pub fn has_address(&self) -> bool {
        self.owner_address_encoded_id != NO_ADDRESS
    }
}

/// Two-stage pipeline: items → rows → (optionally) one row per owner.
pub fn process(items: Vec<Item>, dedupe: Option<DedupeStrategy>) -> Vec<OwnerRow> {
    let rows = extract::extract(items);
    match dedupe {
        Some(strategy) => dedupe::dedupe(rows, strategy),
        None => rows,
    }
}
