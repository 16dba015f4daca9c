use crate::error::{Error, Result};
use crate::index::types::{IndexConfig, SearchConfig, ShardPlan, ShardScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_NAME: &str = "docshard";
const CONFIG_FILE: &str = "config.json";
const INDEXES_DIR: &str = "indexes";

const GROUP_FILE: &str = "group.json";
const METADATA_FILE: &str = "metadata.json";
const CHECKPOINT_FILE: &str = "checkpoint.jsonl";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Override for the base directory holding every shard-group
    #[serde(default)]
    pub index_dir: Option<PathBuf>,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            debug!(path = ?config_path, "Loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the base index directory this configuration points at
    pub fn index_dir(&self) -> Result<PathBuf> {
        match &self.index_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_app_data_dir()?.join(INDEXES_DIR)),
        }
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.ok_or_else(|| Error::NotFound(PathBuf::from("<app data directory>")))?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// SHA-256 of the path string, rendered as lowercase hex.
///
/// The path is hashed exactly as given; callers decide on canonicalisation.
pub fn hash_path(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    format!("{:x}", digest)
}

/// Directory name of a shard inside its group.
/// Format: up to 16 chars of the folder name + 16 hex chars of the scoped path hash
pub fn shard_dir_name(plan: &ShardPlan) -> String {
    let dir_name = plan
        .root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("root");

    let sanitized: String = dir_name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(16)
        .collect();

    let scope = match plan.scope {
        ShardScope::Subtree => "subtree",
        ShardScope::TopLevel => "top",
    };
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b":");
    hasher.update(plan.root.to_string_lossy().as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    format!("{}-{}", sanitized, &hash[..16])
}

/// Maps indexed roots to shard-group directories under one base directory
#[derive(Debug, Clone)]
pub struct IndexLocator {
    base_dir: PathBuf,
}

impl IndexLocator {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(config.index_dir()?))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve the shard-group of a root path. Pure: touches no files.
    pub fn locate(&self, root: &Path) -> ShardGroup {
        ShardGroup {
            root: root.to_path_buf(),
            dir: self.base_dir.join(hash_path(root)),
        }
    }

    /// List every shard-group that has a descriptor
    pub fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut groups = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(content) = fs::read_to_string(path.join(GROUP_FILE)) else {
                continue;
            };
            if let Ok(meta) = serde_json::from_str::<GroupMeta>(&content) {
                groups.push(GroupInfo {
                    group: ShardGroup {
                        root: meta.root_path.clone(),
                        dir: path,
                    },
                    meta,
                });
            }
        }

        groups.sort_by(|a, b| a.group.root.cmp(&b.group.root));
        Ok(groups)
    }

    /// Remove the entire base index directory
    pub fn clear_all(&self) -> Result<()> {
        if self.base_dir.exists() {
            fs::remove_dir_all(&self.base_dir)?;
            info!(path = ?self.base_dir, "Cleared all indexes");
        }
        Ok(())
    }
}

/// Explicit handle to the on-disk state of one indexed root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardGroup {
    pub root: PathBuf,
    pub dir: PathBuf,
}

impl ShardGroup {
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn shard_dir(&self, plan: &ShardPlan) -> PathBuf {
        self.dir.join(shard_dir_name(plan))
    }

    /// Shard index directories currently present, sorted by name
    pub fn shard_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.exists() {
            return Err(Error::NotFound(self.dir.clone()));
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Create the group directory and refresh its descriptor
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let now = Utc::now();
        let created_at = self
            .read_meta()
            .map(|m| m.created_at)
            .unwrap_or(now);
        let meta = GroupMeta {
            root_path: self.root.clone(),
            created_at,
            updated_at: now,
        };
        write_json_atomic(&self.dir.join(GROUP_FILE), &meta)
    }

    pub fn read_meta(&self) -> Option<GroupMeta> {
        let content = fs::read_to_string(self.dir.join(GROUP_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// Descriptor stored in `group.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMeta {
    pub root_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shard-group found on disk
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub group: ShardGroup,
    pub meta: GroupMeta,
}

/// Serialize to a temp file in the same directory, then rename over `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let file = fs::File::create(&temp_path)?;
        let mut writer = std::io::BufWriter::new(file);
        std::io::Write::write_all(&mut writer, &json)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hash_path_stable() {
        let hash1 = hash_path(Path::new("/home/user/docs"));
        let hash2 = hash_path(Path::new("/home/user/docs"));
        let hash3 = hash_path(Path::new("/home/user/Docs"));

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
        assert!(hash1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_path_known_value() {
        // sha256("abc")
        assert_eq!(
            hash_path(Path::new("abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_shard_dir_name_distinguishes_scope() {
        let subtree = shard_dir_name(&ShardPlan::subtree("/docs/Annual Reports"));
        let top = shard_dir_name(&ShardPlan::top_level("/docs/Annual Reports"));

        assert!(subtree.starts_with("AnnualReports-"));
        assert_ne!(subtree, top);
        assert_eq!(subtree, shard_dir_name(&ShardPlan::subtree("/docs/Annual Reports")));
    }

    #[test]
    fn test_locate_is_pure() {
        let temp = tempdir().unwrap();
        let locator = IndexLocator::new(temp.path().join("indexes"));
        let group = locator.locate(Path::new("/data/library"));

        assert_eq!(group.dir.parent().unwrap(), locator.base_dir());
        assert!(!group.exists());
        assert!(!locator.base_dir().exists());
    }

    #[test]
    fn test_group_lifecycle() {
        let temp = tempdir().unwrap();
        let locator = IndexLocator::new(temp.path().join("indexes"));
        let group = locator.locate(Path::new("/data/library"));

        assert!(matches!(group.shard_dirs(), Err(Error::NotFound(_))));

        group.ensure().unwrap();
        fs::create_dir_all(group.shard_dir(&ShardPlan::subtree("/data/library"))).unwrap();
        fs::write(group.metadata_path(), "{}").unwrap();

        assert_eq!(group.shard_dirs().unwrap().len(), 1);

        let listed = locator.list_groups().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].group.root, PathBuf::from("/data/library"));

        locator.clear_all().unwrap();
        assert!(!locator.base_dir().exists());
        assert!(locator.list_groups().unwrap().is_empty());
    }

    #[test]
    fn test_app_config_partial_json() {
        let json = r#"{"index_dir": "/tmp/idx", "index": {"small_document_workers": 3}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.index_dir().unwrap(), PathBuf::from("/tmp/idx"));
        assert_eq!(config.index.small_document_workers, 3);
        assert_eq!(config.index.page_batch_size, 100);
        assert_eq!(config.search.max_hits, 1000);
    }

    #[test]
    fn test_app_config_empty_json() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(config.index_dir.is_none());
        assert_eq!(config.index.commit_interval_pages, 2000);
    }

    #[test]
    fn test_write_json_atomic_replaces() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("value.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let value: Vec<u32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, vec![4]);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
