use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use recs_core::persist::{now_rfc3339, save_artifact, ArtifactPaths, ArtifactTables, MetaFile, ARTIFACT_VERSION};
use recs_core::popularity::{most_popular, DEFAULT_TOP_N};
use recs_core::{InternalIndex, ItemId, LatentFactorModel, Snapshot, UserId};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Sparse users and items are dropped before packing, as in the training job.
const DEFAULT_MIN_RATINGS: usize = 10;

/// One row of the ratings export.
#[derive(Debug, Clone, Deserialize)]
struct InputRating {
    user_id: UserId,
    item_id: ItemId,
    rating: f32,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    item_name: Option<String>,
}

/// Learned factors as exported by the training job.
#[derive(Debug, Deserialize)]
struct FactorsFile {
    dim: usize,
    users: Vec<FactorRow>,
    items: Vec<FactorRow>,
}

#[derive(Debug, Deserialize)]
struct FactorRow {
    id: u64,
    #[serde(default)]
    bias: f32,
    factors: Vec<f32>,
}

#[derive(Debug, Clone)]
struct BuildOptions {
    rating_threshold: f32,
    top_n: usize,
    min_user_ratings: usize,
    min_item_ratings: usize,
}

#[derive(Parser)]
#[command(name = "builder")]
#[command(about = "Pack ratings and trained factors into a recommendation artifact", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the artifact directory from a ratings export and a factors file
    Build {
        /// Ratings path (JSON/JSONL file or directory)
        #[arg(long)]
        ratings: String,
        /// Trained factors JSON file
        #[arg(long)]
        factors: String,
        /// Output artifact directory
        #[arg(long)]
        output: String,
        /// Minimum rating for an interaction to count toward popularity
        #[arg(long, default_value_t = 4.0)]
        rating_threshold: f32,
        /// Length of the popularity fallback list
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
        /// Drop users with fewer ratings than this
        #[arg(long, default_value_t = DEFAULT_MIN_RATINGS)]
        min_user_ratings: usize,
        /// Drop items with fewer ratings than this (applied after the user filter)
        #[arg(long, default_value_t = DEFAULT_MIN_RATINGS)]
        min_item_ratings: usize,
    },
    /// Load an artifact with full validation and report its size
    Inspect {
        #[arg(long)]
        artifact: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { ratings, factors, output, rating_threshold, top_n, min_user_ratings, min_item_ratings } => {
            let opts = BuildOptions { rating_threshold, top_n, min_user_ratings, min_item_ratings };
            build_artifact(&ratings, &factors, &output, &opts)
        }
        Commands::Inspect { artifact } => {
            let snap = Snapshot::load(&artifact)?;
            tracing::info!(
                users = snap.meta.num_users,
                items = snap.meta.num_items,
                dim = snap.meta.dim,
                named_users = snap.names.num_users(),
                named_items = snap.names.num_items(),
                popular = snap.engine.popularity().len(),
                created_at = %snap.meta.created_at,
                "artifact ok"
            );
            Ok(())
        }
    }
}

fn build_artifact(ratings: &str, factors: &str, output: &str, opts: &BuildOptions) -> Result<()> {
    let mut rows = Vec::new();
    for file in collect_files(Path::new(ratings)) {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_ratings_jsonl(&file, &mut rows)?;
        } else {
            read_ratings_json(&file, &mut rows)?;
        }
    }
    tracing::info!(rows = rows.len(), "ingested ratings");

    let factors: FactorsFile = serde_json::from_reader(BufReader::new(File::open(factors)?))?;
    let tables = build_tables(rows, factors, opts)?;
    tracing::info!(
        users = tables.meta.num_users,
        items = tables.meta.num_items,
        known_users = tables.interactions.len(),
        popular = tables.top_items.len(),
        "tables built"
    );

    save_artifact(&ArtifactPaths::new(output), &tables)?;
    tracing::info!(output, "artifact build complete");
    Ok(())
}

fn collect_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn read_ratings_jsonl(file: &Path, rows: &mut Vec<InputRating>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        rows.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

fn read_ratings_json(file: &Path, rows: &mut Vec<InputRating>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                rows.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => rows.push(serde_json::from_value(json)?),
        _ => {}
    }
    Ok(())
}

/// Drop sparse users, then sparse items, one pass each.
fn filter_by_interactions(rows: Vec<InputRating>, min_user: usize, min_item: usize) -> Vec<InputRating> {
    let mut per_user: HashMap<UserId, usize> = HashMap::new();
    for r in &rows {
        *per_user.entry(r.user_id).or_insert(0) += 1;
    }
    let rows: Vec<InputRating> = rows.into_iter().filter(|r| per_user[&r.user_id] >= min_user).collect();

    let mut per_item: HashMap<ItemId, usize> = HashMap::new();
    for r in &rows {
        *per_item.entry(r.item_id).or_insert(0) += 1;
    }
    rows.into_iter().filter(|r| per_item[&r.item_id] >= min_item).collect()
}

/// Sort rows by id and assign dense indices in that order.
fn pack_factors(kind: &str, dim: usize, mut rows: Vec<FactorRow>) -> Result<(HashMap<u64, InternalIndex>, Vec<f32>, Vec<f32>)> {
    rows.sort_by_key(|r| r.id);
    let mut ids = HashMap::with_capacity(rows.len());
    let mut factors = Vec::with_capacity(rows.len() * dim);
    let mut biases = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        if row.factors.len() != dim {
            bail!("{kind} {} has {} factors, expected {dim}", row.id, row.factors.len());
        }
        if ids.insert(row.id, index as InternalIndex).is_some() {
            bail!("duplicate {kind} id {} in factors file", row.id);
        }
        factors.extend(row.factors);
        biases.push(row.bias);
    }
    Ok((ids, factors, biases))
}

fn build_tables(rows: Vec<InputRating>, factors: FactorsFile, opts: &BuildOptions) -> Result<ArtifactTables> {
    let rows = filter_by_interactions(rows, opts.min_user_ratings, opts.min_item_ratings);

    let mut user_names: HashMap<UserId, String> = HashMap::new();
    let mut item_names: HashMap<ItemId, String> = HashMap::new();
    let mut interactions: HashMap<UserId, HashSet<ItemId>> = HashMap::new();
    for r in &rows {
        if let Some(name) = &r.user_name {
            user_names.insert(r.user_id, name.clone());
        }
        if let Some(name) = &r.item_name {
            item_names.insert(r.item_id, name.clone());
        }
        interactions.entry(r.user_id).or_default().insert(r.item_id);
    }
    let top_items = most_popular(rows.iter().map(|r| (r.item_id, r.rating)), opts.rating_threshold, opts.top_n);

    let dim = factors.dim;
    let (user_id_map, user_factors, user_biases) = pack_factors("user", dim, factors.users)?;
    let (item_id_map, item_factors, item_biases) = pack_factors("item", dim, factors.items)?;
    let model = LatentFactorModel::new(dim, user_factors, item_factors, user_biases, item_biases)?;

    let meta = MetaFile {
        num_users: user_id_map.len(),
        num_items: item_id_map.len(),
        dim,
        created_at: now_rfc3339(),
        version: ARTIFACT_VERSION,
    };
    Ok(ArtifactTables { model, user_id_map, item_id_map, user_names, item_names, interactions, top_items, meta })
}
