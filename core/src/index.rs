use std::collections::{HashMap, HashSet};

use crate::error::StartupDataError;

pub type UserId = u64;
pub type ItemId = u64;
/// Dense zero-based position inside the scoring model.
pub type InternalIndex = u32;

/// One-to-one mapping between external ids and dense internal indices.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    forward: HashMap<u64, InternalIndex>,
    inverse: Vec<u64>,
}

impl IdMapping {
    /// Build the inverse table from a forward map. The targets must cover
    /// `0..forward.len()` exactly once.
    pub fn from_forward(table: &'static str, forward: HashMap<u64, InternalIndex>) -> Result<Self, StartupDataError> {
        let len = forward.len();
        let mut slots: Vec<Option<u64>> = vec![None; len];
        for (&external, &index) in forward.iter() {
            let slot = slots
                .get_mut(index as usize)
                .ok_or(StartupDataError::NonDenseIndex { table, index, len })?;
            if let Some(existing) = *slot {
                let (first, second) = if existing < external { (existing, external) } else { (external, existing) };
                return Err(StartupDataError::IndexCollision { table, index, first, second });
            }
            *slot = Some(external);
        }
        // len slots, len distinct in-range targets: every slot is filled
        let inverse = slots.into_iter().flatten().collect();
        Ok(Self { forward, inverse })
    }

    pub fn len(&self) -> usize { self.inverse.len() }

    pub fn is_empty(&self) -> bool { self.inverse.is_empty() }

    pub fn to_internal(&self, external: u64) -> Option<InternalIndex> {
        self.forward.get(&external).copied()
    }

    pub fn to_external(&self, index: InternalIndex) -> Option<u64> {
        self.inverse.get(index as usize).copied()
    }
}

/// User and item id spaces of one model snapshot.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMapper {
    users: IdMapping,
    items: IdMapping,
}

impl IdentifierMapper {
    pub fn from_tables(
        users: HashMap<UserId, InternalIndex>,
        items: HashMap<ItemId, InternalIndex>,
    ) -> Result<Self, StartupDataError> {
        Ok(Self {
            users: IdMapping::from_forward("user_id_map", users)?,
            items: IdMapping::from_forward("item_id_map", items)?,
        })
    }

    pub fn to_internal_user(&self, user: UserId) -> Option<InternalIndex> { self.users.to_internal(user) }

    pub fn to_internal_item(&self, item: ItemId) -> Option<InternalIndex> { self.items.to_internal(item) }

    pub fn to_external_item(&self, index: InternalIndex) -> Option<ItemId> { self.items.to_external(index) }

    pub fn num_users(&self) -> usize { self.users.len() }

    pub fn num_items(&self) -> usize { self.items.len() }
}

/// Items each user has already interacted with.
#[derive(Debug, Clone, Default)]
pub struct InteractionIndex {
    known: HashMap<UserId, HashSet<ItemId>>,
    empty: HashSet<ItemId>,
}

impl InteractionIndex {
    pub fn new(known: HashMap<UserId, HashSet<ItemId>>) -> Self {
        Self { known, empty: HashSet::new() }
    }

    /// Empty for users with no recorded interactions.
    pub fn known_items(&self, user: UserId) -> &HashSet<ItemId> {
        self.known.get(&user).unwrap_or(&self.empty)
    }
}
