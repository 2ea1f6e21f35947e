use std::collections::HashMap;

use rand::seq::IteratorRandom;
use rand::Rng;

use crate::{ItemId, UserId};

pub const UNKNOWN_USER: &str = "Unknown User";
pub const UNKNOWN_ITEM: &str = "Unknown Item";

/// Display names for users and items. Only used to decorate responses.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    users: HashMap<UserId, String>,
    items: HashMap<ItemId, String>,
}

impl NameResolver {
    pub fn new(users: HashMap<UserId, String>, items: HashMap<ItemId, String>) -> Self {
        Self { users, items }
    }

    pub fn user_name(&self, user: UserId) -> &str {
        self.users.get(&user).map(String::as_str).unwrap_or(UNKNOWN_USER)
    }

    pub fn item_name(&self, item: ItemId) -> &str {
        self.items.get(&item).map(String::as_str).unwrap_or(UNKNOWN_ITEM)
    }

    /// Up to `n` distinct (user, name) pairs drawn uniformly.
    pub fn sample_users<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<(UserId, &str)> {
        self.users
            .iter()
            .map(|(id, name)| (*id, name.as_str()))
            .choose_multiple(rng, n)
    }

    pub fn num_users(&self) -> usize { self.users.len() }

    pub fn num_items(&self) -> usize { self.items.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn resolver() -> NameResolver {
        let users = (1..=30u64).map(|i| (i, format!("user {i}"))).collect();
        let items = [(7u64, "Trail Shoe".to_string())].into_iter().collect();
        NameResolver::new(users, items)
    }

    #[test]
    fn falls_back_to_placeholders() {
        let r = resolver();
        assert_eq!(r.user_name(3), "user 3");
        assert_eq!(r.user_name(999), UNKNOWN_USER);
        assert_eq!(r.item_name(7), "Trail Shoe");
        assert_eq!(r.item_name(8), UNKNOWN_ITEM);
    }

    #[test]
    fn sample_is_bounded_and_distinct() {
        let r = resolver();
        let mut rng = StdRng::seed_from_u64(42);
        let sample = r.sample_users(10, &mut rng);
        assert_eq!(sample.len(), 10);
        let mut ids: Vec<u64> = sample.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        for (id, name) in sample {
            assert_eq!(name, format!("user {id}"));
        }
    }

    #[test]
    fn sample_of_small_table_returns_everything() {
        let r = NameResolver::new([(1, "a".to_string()), (2, "b".to_string())].into_iter().collect(), HashMap::new());
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(r.sample_users(10, &mut rng).len(), 2);
    }
}
