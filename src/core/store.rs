use crate::core::item::{parse_sidecar, render_sidecar, Item};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SIDECAR_EXTENSION: &str = ".txt";
const TEMP_EXTENSION: &str = ".tmp";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid item id: {id}")]
    InvalidId { id: String },
}

/// One sidecar text file per screenshot; the only record of what has been
/// captioned.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sidecar_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{SIDECAR_EXTENSION}"))
    }

    /// Unreadable records count as absent and are logged.
    pub fn get(&self, id: &str) -> Option<Item> {
        let path = self.sidecar_path(id);
        if !path.exists() {
            return None;
        }
        match fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => Some(parse_sidecar(id, &content)),
                Err(e) => {
                    tracing::warn!("Ignoring malformed sidecar {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Ignoring unreadable sidecar {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Stored record, or an empty item when there is none yet.
    pub fn get_or_default(&self, id: &str) -> Item {
        self.get(id).unwrap_or_else(|| Item::new(id))
    }

    /// Replaces the whole record. Readers see either the old or the new file.
    pub fn put(&self, item: &Item) -> Result<(), StoreError> {
        if item.id.is_empty() || item.id.contains(['/', '\\']) {
            return Err(StoreError::InvalidId {
                id: item.id.clone(),
            });
        }
        let path = self.sidecar_path(&item.id);
        let tmp = self.root.join(format!(".{}{}{}", item.id, SIDECAR_EXTENSION, TEMP_EXTENSION));
        fs::write(&tmp, render_sidecar(item))?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Every stored record, sorted by id.
    pub fn all(&self) -> Result<Vec<Item>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(TEMP_EXTENSION) || !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = name.strip_suffix(SIDECAR_EXTENSION) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }
}
