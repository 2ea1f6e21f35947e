use serde::Serialize;
use thiserror::Error;

use crate::InternalIndex;

/// A single failed request constraint, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub constraint: String,
    pub value: String,
}

impl Violation {
    pub fn new(field: &'static str, constraint: impl Into<String>, value: impl ToString) -> Self {
        Self { field, constraint: constraint.into(), value: value.to_string() }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("user index {0} is outside the model")]
    UnknownUser(InternalIndex),

    #[error("item index {0} is outside the model")]
    UnknownItem(InternalIndex),

    #[error("model returned {got} scores for {expected} items")]
    SizeMismatch { expected: usize, got: usize },

    #[error("non-finite score {score} for item index {item}")]
    NonFiniteScore { item: InternalIndex, score: f32 },
}

#[derive(Debug, Error, PartialEq)]
pub enum RecommendationError {
    #[error("Input validation failed")]
    InvalidInput(Vec<Violation>),

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),
}

impl RecommendationError {
    /// Message that is safe to hand to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            RecommendationError::InvalidInput(_) => "Input validation failed",
            RecommendationError::Scoring(_) => "An error occurred while processing the recommendation.",
        }
    }
}

/// Inconsistent artifact contents detected while loading a snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartupDataError {
    #[error("{table}: external ids {first} and {second} both map to internal index {index}")]
    IndexCollision { table: &'static str, index: InternalIndex, first: u64, second: u64 },

    #[error("{table}: internal index {index} is outside 0..{len}")]
    NonDenseIndex { table: &'static str, index: InternalIndex, len: usize },

    #[error("{table}: expected {expected} entries, found {found}")]
    LengthMismatch { table: &'static str, expected: usize, found: usize },

    #[error("model dimension must be positive")]
    ZeroDimension,

    #[error("meta.json disagrees with {table}: expected {expected}, found {found}")]
    MetaMismatch { table: &'static str, expected: usize, found: usize },

    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u32),
}
