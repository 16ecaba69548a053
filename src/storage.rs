//! JSON storage for saved chains
//!
//! A saved chain records only the request (target, rate and selection
//! policy). Loading re-resolves it against the current catalog, so saved
//! chains follow catalog updates.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::calculator::{NodeOverride, ResolveError, SelectionPolicy, resolve};
use crate::catalog::Catalog;
use crate::models::RecipeSelection;
use crate::tree::ProductionTree;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid chain file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error("{path} is not a chain file in {dir}")]
    OutsideDir { path: PathBuf, dir: PathBuf },
}

/// Persisted form of a production chain request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedChain {
    /// Assigned on first save; part of the file name
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target_item: String,
    pub target_rate: f64,
    #[serde(default)]
    pub selection_policy: BTreeMap<String, RecipeSelection>,
    #[serde(default)]
    pub speed_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub node_overrides: Vec<NodeOverride>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SavedChain {
    pub fn new(
        name: impl Into<String>,
        target_item: impl Into<String>,
        target_rate: f64,
        policy: &SelectionPolicy,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            target_item: target_item.into(),
            target_rate,
            selection_policy: policy.selections.clone(),
            speed_multipliers: policy.speed_multipliers.clone(),
            node_overrides: policy.node_overrides.clone(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            selections: self.selection_policy.clone(),
            speed_multipliers: self.speed_multipliers.clone(),
            node_overrides: self.node_overrides.clone(),
        }
    }

    /// Rebuild the production tree against `catalog`
    pub fn resolve(&self, catalog: &Catalog) -> Result<ProductionTree, ResolveError> {
        resolve(catalog, &self.target_item, self.target_rate, &self.policy())
    }
}

/// Chain name reduced to characters safe in a file name
pub fn sanitize_name(name: &str) -> Result<String, StorageError> {
    let unsafe_chars = Regex::new(r"[^A-Za-z0-9_-]")?;
    let safe = unsafe_chars.replace_all(name.trim(), "_");
    if safe.is_empty() {
        Ok("chain".to_string())
    } else {
        Ok(safe.into_owned())
    }
}

fn chain_file_name(safe_name: &str, id: &str) -> String {
    format!("{}_{}.json", safe_name, id)
}

/// A saved chain found on disk
#[derive(Debug, Clone)]
pub struct ChainListing {
    pub path: PathBuf,
    pub name: String,
    pub target_item: String,
    pub target_rate: f64,
}

/// Saves and loads chains as JSON files in one directory
#[derive(Debug, Clone)]
pub struct ChainStorage {
    dir: PathBuf,
}

impl ChainStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `chain` as `<sanitized name>_<id>.json`, stamping its timestamps
    ///
    /// A chain saved for the first time gets an id no other file in the
    /// directory uses; saving it again rewrites the same file.
    pub fn save(&self, chain: &mut SavedChain) -> Result<PathBuf, StorageError> {
        let now = Utc::now();
        chain.updated_at = Some(now);
        chain.created_at.get_or_insert(now);

        let safe_name = sanitize_name(&chain.name)?;
        if chain.id.is_empty() {
            chain.id = self.unused_id(&safe_name, &now.format("%Y%m%d%H%M%S%3f").to_string());
        }
        let path = self.dir.join(chain_file_name(&safe_name, &chain.id));
        let json = serde_json::to_string_pretty(chain).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), item = %chain.target_item, "saved chain");
        Ok(path)
    }

    fn unused_id(&self, safe_name: &str, base: &str) -> String {
        let mut id = base.to_string();
        let mut n = 1;
        while self.dir.join(chain_file_name(safe_name, &id)).exists() {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }

    /// Relative paths are taken inside the storage directory, falling back
    /// to the working directory only when nothing matches there
    fn chain_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let inside = self.dir.join(path);
        if inside.exists() || !path.exists() {
            inside
        } else {
            path.to_path_buf()
        }
    }

    /// `.json` file directly inside the storage directory
    fn is_chain_file(&self, path: &Path) -> Result<bool, StorageError> {
        if !path.extension().is_some_and(|ext| ext == "json") {
            return Ok(false);
        }
        let Some(parent) = path.parent() else {
            return Ok(false);
        };
        let dir = self.dir.canonicalize().map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        Ok(parent.canonicalize().is_ok_and(|p| p == dir))
    }

    pub fn load(&self, path: &Path) -> Result<SavedChain, StorageError> {
        let path = &self.chain_path(path);
        let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let chain = serde_json::from_str(&content).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded chain");
        Ok(chain)
    }

    /// Load a chain and resolve it against the current catalog
    pub fn load_resolved(
        &self,
        path: &Path,
        catalog: &Catalog,
    ) -> Result<(SavedChain, ProductionTree), StorageError> {
        let chain = self.load(path)?;
        let tree = chain.resolve(catalog)?;
        Ok((chain, tree))
    }

    /// Saved chains in the directory, sorted by file name; unreadable files are skipped
    pub fn list(&self) -> Vec<ChainListing> {
        WalkDir::new(&self.dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| {
                let chain = self.load(e.path()).ok()?;
                Some(ChainListing {
                    path: e.path().to_path_buf(),
                    name: if chain.name.is_empty() {
                        "Unnamed".to_string()
                    } else {
                        chain.name
                    },
                    target_item: chain.target_item,
                    target_rate: chain.target_rate,
                })
            })
            .collect()
    }

    /// Delete a saved chain; `false` if it did not exist
    pub fn delete(&self, path: &Path) -> Result<bool, StorageError> {
        let path = &self.chain_path(path);
        if !self.is_chain_file(path)? {
            return Err(StorageError::OutsideDir {
                path: path.clone(),
                dir: self.dir.clone(),
            });
        }
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
