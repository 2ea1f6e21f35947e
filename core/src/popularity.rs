use std::collections::HashMap;

use crate::ItemId;

pub const DEFAULT_TOP_N: usize = 20;

/// Globally popular items, most popular first. Served to cold-start users.
#[derive(Debug, Clone, Default)]
pub struct PopularityFallback {
    items: Vec<ItemId>,
}

impl PopularityFallback {
    pub fn new(items: Vec<ItemId>) -> Self { Self { items } }

    /// Prefix of the list; the whole list when `k` exceeds it.
    pub fn top_items(&self, k: usize) -> &[ItemId] {
        &self.items[..k.min(self.items.len())]
    }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// Rank items by how many ratings reach `threshold`. Ties go to the lower item id.
pub fn most_popular<I>(ratings: I, threshold: f32, top_n: usize) -> Vec<ItemId>
where
    I: IntoIterator<Item = (ItemId, f32)>,
{
    let mut counts: HashMap<ItemId, u64> = HashMap::new();
    for (item, rating) in ratings {
        if rating >= threshold {
            *counts.entry(item).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(ItemId, u64)> = counts.into_iter().collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(top_n).map(|(item, _)| item).collect()
}
