use crate::{InternalIndex, ItemId, LatentFactorModel, UserId};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_users: usize,
    pub num_items: usize,
    pub dim: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct ArtifactPaths {
    pub root: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn model(&self) -> PathBuf { self.root.join("model.bin") }
    fn user_id_map(&self) -> PathBuf { self.root.join("user_id_map.bin") }
    fn item_id_map(&self) -> PathBuf { self.root.join("item_id_map.bin") }
    fn user_names(&self) -> PathBuf { self.root.join("user_names.bin") }
    fn item_names(&self) -> PathBuf { self.root.join("item_names.bin") }
    fn interactions(&self) -> PathBuf { self.root.join("interactions.bin") }
    fn top_items(&self) -> PathBuf { self.root.join("top_items.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Every table of one artifact, as stored on disk.
#[derive(Debug, Clone)]
pub struct ArtifactTables {
    pub model: LatentFactorModel,
    pub user_id_map: HashMap<UserId, InternalIndex>,
    pub item_id_map: HashMap<ItemId, InternalIndex>,
    pub user_names: HashMap<UserId, String>,
    pub item_names: HashMap<ItemId, String>,
    pub interactions: HashMap<UserId, HashSet<ItemId>>,
    pub top_items: Vec<ItemId>,
    pub meta: MetaFile,
}

fn save_bin<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let bytes = bincode::serialize(value).with_context(|| format!("encoding {}", path.display()))?;
    f.write_all(&bytes)?;
    Ok(())
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let value = bincode::deserialize(&buf).with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}

pub fn save_model(paths: &ArtifactPaths, model: &LatentFactorModel) -> Result<()> {
    create_dir_all(&paths.root)?;
    save_bin(&paths.model(), model)
}

pub fn load_model(paths: &ArtifactPaths) -> Result<LatentFactorModel> {
    let model: LatentFactorModel = load_bin(&paths.model())?;
    model.validate().with_context(|| format!("validating {}", paths.model().display()))?;
    Ok(model)
}

pub fn save_id_maps(paths: &ArtifactPaths, users: &HashMap<UserId, InternalIndex>, items: &HashMap<ItemId, InternalIndex>) -> Result<()> {
    save_bin(&paths.user_id_map(), users)?;
    save_bin(&paths.item_id_map(), items)
}

pub fn load_id_maps(paths: &ArtifactPaths) -> Result<(HashMap<UserId, InternalIndex>, HashMap<ItemId, InternalIndex>)> {
    Ok((load_bin(&paths.user_id_map())?, load_bin(&paths.item_id_map())?))
}

pub fn save_names(paths: &ArtifactPaths, users: &HashMap<UserId, String>, items: &HashMap<ItemId, String>) -> Result<()> {
    save_bin(&paths.user_names(), users)?;
    save_bin(&paths.item_names(), items)
}

pub fn load_names(paths: &ArtifactPaths) -> Result<(HashMap<UserId, String>, HashMap<ItemId, String>)> {
    Ok((load_bin(&paths.user_names())?, load_bin(&paths.item_names())?))
}

pub fn save_interactions(paths: &ArtifactPaths, known: &HashMap<UserId, HashSet<ItemId>>) -> Result<()> {
    save_bin(&paths.interactions(), known)
}

pub fn load_interactions(paths: &ArtifactPaths) -> Result<HashMap<UserId, HashSet<ItemId>>> {
    load_bin(&paths.interactions())
}

pub fn save_top_items(paths: &ArtifactPaths, items: &[ItemId]) -> Result<()> {
    save_bin(&paths.top_items(), items)
}

pub fn load_top_items(paths: &ArtifactPaths) -> Result<Vec<ItemId>> {
    load_bin(&paths.top_items())
}

pub fn save_meta(paths: &ArtifactPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &ArtifactPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf).with_context(|| format!("decoding {}", paths.meta().display()))?;
    Ok(meta)
}

pub fn save_artifact(paths: &ArtifactPaths, tables: &ArtifactTables) -> Result<()> {
    save_model(paths, &tables.model)?;
    save_id_maps(paths, &tables.user_id_map, &tables.item_id_map)?;
    save_names(paths, &tables.user_names, &tables.item_names)?;
    save_interactions(paths, &tables.interactions)?;
    save_top_items(paths, &tables.top_items)?;
    save_meta(paths, &tables.meta)
}

/// Read all tables. Cross-table consistency is checked by `Snapshot::from_tables`.
pub fn load_artifact(paths: &ArtifactPaths) -> Result<ArtifactTables> {
    let meta = load_meta(paths)?;
    let model = load_model(paths)?;
    let (user_id_map, item_id_map) = load_id_maps(paths)?;
    let (user_names, item_names) = load_names(paths)?;
    let interactions = load_interactions(paths)?;
    let top_items = load_top_items(paths)?;
    Ok(ArtifactTables { model, user_id_map, item_id_map, user_names, item_names, interactions, top_items, meta })
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
