use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, StartupDataError};
use crate::InternalIndex;

/// Relevance scoring over internal indices. Implementations must be pure
/// functions of their loaded state.
pub trait ScoringModel: Send + Sync {
    fn n_users(&self) -> usize;
    fn n_items(&self) -> usize;
    /// One score per entry of `items`, in the same order.
    fn score(&self, user: InternalIndex, items: &[InternalIndex]) -> Result<Vec<f32>, ScoringError>;
}

/// Embedding model: `dot(user, item) + user_bias + item_bias`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatentFactorModel {
    dim: usize,
    /// Row-major, `n_users * dim`.
    user_factors: Vec<f32>,
    /// Row-major, `n_items * dim`.
    item_factors: Vec<f32>,
    user_biases: Vec<f32>,
    item_biases: Vec<f32>,
}

impl LatentFactorModel {
    pub fn new(
        dim: usize,
        user_factors: Vec<f32>,
        item_factors: Vec<f32>,
        user_biases: Vec<f32>,
        item_biases: Vec<f32>,
    ) -> Result<Self, StartupDataError> {
        let model = Self { dim, user_factors, item_factors, user_biases, item_biases };
        model.validate()?;
        Ok(model)
    }

    /// Check that factor matrices and bias vectors agree on their shapes.
    pub fn validate(&self) -> Result<(), StartupDataError> {
        if self.dim == 0 {
            return Err(StartupDataError::ZeroDimension);
        }
        check_len("user_factors", self.user_biases.len() * self.dim, self.user_factors.len())?;
        check_len("item_factors", self.item_biases.len() * self.dim, self.item_factors.len())?;
        Ok(())
    }

    pub fn dim(&self) -> usize { self.dim }

    fn user_row(&self, user: usize) -> &[f32] { &self.user_factors[user * self.dim..(user + 1) * self.dim] }

    fn item_row(&self, item: usize) -> &[f32] { &self.item_factors[item * self.dim..(item + 1) * self.dim] }
}

fn check_len(table: &'static str, expected: usize, found: usize) -> Result<(), StartupDataError> {
    if expected != found {
        return Err(StartupDataError::LengthMismatch { table, expected, found });
    }
    Ok(())
}

impl ScoringModel for LatentFactorModel {
    fn n_users(&self) -> usize { self.user_biases.len() }

    fn n_items(&self) -> usize { self.item_biases.len() }

    fn score(&self, user: InternalIndex, items: &[InternalIndex]) -> Result<Vec<f32>, ScoringError> {
        let u = user as usize;
        if u >= self.n_users() {
            return Err(ScoringError::UnknownUser(user));
        }
        let user_vec = self.user_row(u);
        let user_bias = self.user_biases[u];
        let n_items = self.n_items();
        items
            .iter()
            .map(|&item| {
                let i = item as usize;
                if i >= n_items {
                    return Err(ScoringError::UnknownItem(item));
                }
                Ok(dot(user_vec, self.item_row(i)) + user_bias + self.item_biases[i])
            })
            .collect()
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
