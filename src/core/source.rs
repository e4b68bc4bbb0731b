use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions accepted as screenshots, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Screenshot folder does not exist: {path}")]
    Missing { path: String },

    #[error("Image not found in source: {id}")]
    NotFound { id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Where screenshots come from.
pub trait ImageSource: Send + Sync {
    /// Image ids in lexicographic order.
    fn list(&self) -> Result<Vec<String>, SourceError>;

    fn read(&self, id: &str) -> Result<Vec<u8>, SourceError>;
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Flat folder of screenshots; subdirectories are not descended into.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageSource for DirectorySource {
    fn list(&self) -> Result<Vec<String>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::Missing {
                path: self.root.to_string_lossy().to_string(),
            });
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() && is_supported_image(entry.path()) {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.root.join(id);
        if !path.is_file() {
            return Err(SourceError::NotFound { id: id.to_string() });
        }
        Ok(fs::read(path)?)
    }
}
