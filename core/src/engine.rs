//! Top-N recommendation over a loaded model snapshot.
//!
//! Known users get every catalog item scored in one batch, minus the items
//! they already interacted with, ranked by descending score. Users the model
//! has never seen get the offline popularity list instead.
//!
//! Equal scores are ordered by ascending internal item index, so results are
//! reproducible for a given snapshot.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RecommendationError, ScoringError, Violation};
use crate::index::{IdentifierMapper, InteractionIndex};
use crate::model::ScoringModel;
use crate::popularity::PopularityFallback;
use crate::{InternalIndex, ItemId, UserId};

pub const DEFAULT_K: i64 = 5;
pub const MAX_K: i64 = 100;
/// Exclusive upper bound on accepted user ids.
pub const USER_ID_LIMIT: i64 = 1_000_000;

/// A request whose fields passed range validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationRequest {
    user_id: UserId,
    k: usize,
}

impl RecommendationRequest {
    pub fn new(user_id: i64, k: i64) -> Result<Self, RecommendationError> {
        let mut violations = Vec::new();
        if user_id <= 0 || user_id >= USER_ID_LIMIT {
            violations.push(Violation::new("user_id", format!("must be > 0 and < {USER_ID_LIMIT}"), user_id));
        }
        if !(1..=MAX_K).contains(&k) {
            violations.push(Violation::new("k", format!("must be > 0 and <= {MAX_K}"), k));
        }
        if !violations.is_empty() {
            return Err(RecommendationError::InvalidInput(violations));
        }
        Ok(Self { user_id: user_id as UserId, k: k as usize })
    }

    pub fn user_id(&self) -> UserId { self.user_id }

    pub fn k(&self) -> usize { self.k }
}

/// How a result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Personalized,
    Popular,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationResult {
    pub items: Vec<ItemId>,
    pub source: Source,
}

pub struct RecommendationEngine {
    mapper: IdentifierMapper,
    interactions: InteractionIndex,
    popularity: PopularityFallback,
    model: Arc<dyn ScoringModel>,
}

impl RecommendationEngine {
    pub fn new(
        mapper: IdentifierMapper,
        interactions: InteractionIndex,
        popularity: PopularityFallback,
        model: Arc<dyn ScoringModel>,
    ) -> Self {
        Self { mapper, interactions, popularity, model }
    }

    /// Validate raw inputs, then rank. Invalid inputs never reach the indexes.
    pub fn recommend(&self, user_id: i64, k: i64) -> Result<RecommendationResult, RecommendationError> {
        let request = RecommendationRequest::new(user_id, k)?;
        self.recommend_validated(request)
    }

    pub fn recommend_validated(&self, request: RecommendationRequest) -> Result<RecommendationResult, RecommendationError> {
        let user_id = request.user_id();
        let k = request.k();

        let user = match self.mapper.to_internal_user(user_id) {
            Some(user) => user,
            None => {
                debug!(user_id, "unknown user, serving popular items");
                return Ok(RecommendationResult { items: self.popularity.top_items(k).to_vec(), source: Source::Popular });
            }
        };

        let n_items = self.mapper.num_items();
        let candidates: Vec<InternalIndex> = (0..n_items as InternalIndex).collect();
        let scores = self.model.score(user, &candidates)?;
        if scores.len() != n_items {
            return Err(ScoringError::SizeMismatch { expected: n_items, got: scores.len() }.into());
        }

        if let Some((index, &score)) = scores.iter().enumerate().find(|(_, s)| !s.is_finite()) {
            return Err(ScoringError::NonFiniteScore { item: index as InternalIndex, score }.into());
        }

        let mask = self.exclusion_mask(user_id, n_items);
        let scored: Vec<(InternalIndex, f32)> = candidates
            .into_iter()
            .zip(scores)
            .filter(|(index, _)| !mask[*index as usize])
            .collect();

        let top = top_k(scored, k);
        let mut items = Vec::with_capacity(top.len());
        for (index, _) in top {
            // the inverse table is dense over 0..n_items
            if let Some(item) = self.mapper.to_external_item(index) {
                items.push(item);
            }
        }
        Ok(RecommendationResult { items, source: Source::Personalized })
    }

    /// `true` marks an item the user already knows. Known items missing from
    /// the current catalog are skipped.
    fn exclusion_mask(&self, user_id: UserId, n_items: usize) -> Vec<bool> {
        let mut mask = vec![false; n_items];
        let mut dropped = 0usize;
        for &item in self.interactions.known_items(user_id) {
            match self.mapper.to_internal_item(item) {
                Some(index) => mask[index as usize] = true,
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(user_id, dropped, "known items absent from model catalog");
        }
        mask
    }

    pub fn popularity(&self) -> &PopularityFallback { &self.popularity }
}

/// Descending score, ascending index on ties.
fn rank_order(a: &(InternalIndex, f32), b: &(InternalIndex, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

fn top_k(mut scored: Vec<(InternalIndex, f32)>, k: usize) -> Vec<(InternalIndex, f32)> {
    let take = k.min(scored.len());
    if take == 0 {
        return Vec::new();
    }
    if take < scored.len() {
        scored.select_nth_unstable_by(take - 1, rank_order);
        scored.truncate(take);
    }
    scored.sort_unstable_by(rank_order);
    scored
}
