use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::error::StartupDataError;
use crate::persist::{load_artifact, ArtifactPaths, ArtifactTables, MetaFile, ARTIFACT_VERSION};
use crate::{IdentifierMapper, InteractionIndex, NameResolver, PopularityFallback, RecommendationEngine, ScoringModel};

/// Everything a request needs, built once and shared read-only.
pub struct Snapshot {
    pub engine: RecommendationEngine,
    pub names: NameResolver,
    pub meta: MetaFile,
}

impl Snapshot {
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let tables = load_artifact(&ArtifactPaths::new(dir))?;
        let snapshot = Self::from_tables(tables).with_context(|| format!("inconsistent artifact in {}", dir.display()))?;
        info!(
            dir = %dir.display(),
            users = snapshot.meta.num_users,
            items = snapshot.meta.num_items,
            created_at = %snapshot.meta.created_at,
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn from_tables(tables: ArtifactTables) -> Result<Self, StartupDataError> {
        let ArtifactTables { model, user_id_map, item_id_map, user_names, item_names, interactions, top_items, meta } = tables;
        if meta.version != ARTIFACT_VERSION {
            return Err(StartupDataError::UnsupportedVersion(meta.version));
        }
        model.validate()?;
        let mapper = IdentifierMapper::from_tables(user_id_map, item_id_map)?;

        check("user_id_map", model.n_users(), mapper.num_users(), length_mismatch)?;
        check("item_id_map", model.n_items(), mapper.num_items(), length_mismatch)?;
        check("num_users", meta.num_users, mapper.num_users(), meta_mismatch)?;
        check("num_items", meta.num_items, mapper.num_items(), meta_mismatch)?;
        check("dim", meta.dim, model.dim(), meta_mismatch)?;

        let engine = RecommendationEngine::new(
            mapper,
            InteractionIndex::new(interactions),
            PopularityFallback::new(top_items),
            Arc::new(model),
        );
        Ok(Self { engine, names: NameResolver::new(user_names, item_names), meta })
    }
}

type Mismatch = fn(&'static str, usize, usize) -> StartupDataError;

fn length_mismatch(table: &'static str, expected: usize, found: usize) -> StartupDataError {
    StartupDataError::LengthMismatch { table, expected, found }
}

fn meta_mismatch(table: &'static str, expected: usize, found: usize) -> StartupDataError {
    StartupDataError::MetaMismatch { table, expected, found }
}

fn check(table: &'static str, expected: usize, found: usize, mismatch: Mismatch) -> Result<(), StartupDataError> {
    if expected == found { Ok(()) } else { Err(mismatch(table, expected, found)) }
}
