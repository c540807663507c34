// Inventory collaborator.
//
// The simulation does not own an economy model; work states only need to
// ask whether goods exist, take them, and hand new ones over. `Inventory`
// is that narrow seam, and `Stockpile` is the default settlement-wide store
// used when the host does not plug in its own.
//
// See also: `work.rs` for the handler that consumes and produces goods,
// `agent.rs` for Survival eating from the stock.

use crate::types::ItemKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait Inventory {
    fn has_item(&self, item: ItemKind, count: u32) -> bool;

    /// Take `count` of `item`. Returns `false` (and takes nothing) when the
    /// stock is insufficient.
    fn consume_item(&mut self, item: ItemKind, count: u32) -> bool;

    fn add_item(&mut self, item: ItemKind, count: u32);

    fn count(&self, item: ItemKind) -> u32;
}

/// A simple counted store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stockpile {
    items: BTreeMap<ItemKind, u32>,
}

impl Stockpile {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stockpile pre-filled with `items`.
    pub fn with_items(items: impl IntoIterator<Item = (ItemKind, u32)>) -> Self {
        let mut pile = Self::new();
        for (item, count) in items {
            pile.add_item(item, count);
        }
        pile
    }
}

impl Inventory for Stockpile {
    fn has_item(&self, item: ItemKind, count: u32) -> bool {
        self.count(item) >= count
    }

    fn consume_item(&mut self, item: ItemKind, count: u32) -> bool {
        match self.items.get_mut(&item) {
            Some(have) if *have >= count => {
                *have -= count;
                if *have == 0 {
                    self.items.remove(&item);
                }
                true
            }
            _ => count == 0,
        }
    }

    fn add_item(&mut self, item: ItemKind, count: u32) {
        if count > 0 {
            *self.items.entry(item).or_insert(0) += count;
        }
    }

    fn count(&self, item: ItemKind) -> u32 {
        self.items.get(&item).copied().unwrap_or(0)
    }
}
