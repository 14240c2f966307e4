use super::{OwnerRow, NO_ADDRESS, NO_DID, NO_NFT};
use crate::fetcher::Item;

/// Normalize every item into a row, in input order. Never drops an item.
pub fn extract(items: Vec<Item>) -> Vec<OwnerRow> {
    items.into_iter().map(normalize).collect()
}

fn normalize(item: Item) -> OwnerRow {
    OwnerRow {
        encoded_id: item.encoded_id.unwrap_or_else(|| NO_NFT.to_string()),
        owner_address_encoded_id: item
            .owner_address_encoded_id
            .unwrap_or_else(|| NO_ADDRESS.to_string()),
        owner_encoded_id: item.owner_encoded_id.unwrap_or_else(|| NO_DID.to_string()),
    }
}
