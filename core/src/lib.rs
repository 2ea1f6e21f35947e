pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod names;
pub mod persist;
pub mod popularity;
pub mod snapshot;

pub use engine::{RecommendationEngine, RecommendationRequest, RecommendationResult, Source};
pub use error::{RecommendationError, ScoringError, StartupDataError, Violation};
pub use index::{IdMapping, IdentifierMapper, InteractionIndex, InternalIndex, ItemId, UserId};
pub use model::{LatentFactorModel, ScoringModel};
pub use names::NameResolver;
pub use popularity::PopularityFallback;
pub use snapshot::Snapshot;
