use crate::core::source::is_supported_image;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Membership as it exists on disk: one directory per album holding copies of
/// its screenshots.
#[derive(Debug, Clone, Default)]
pub struct AlbumIndex {
    albums: BTreeMap<String, BTreeSet<String>>,
    owner: BTreeMap<String, String>,
}

impl AlbumIndex {
    pub fn load(root: &Path) -> std::io::Result<Self> {
        let mut index = Self::default();
        if !root.is_dir() {
            return Ok(index);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let name = dir
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let mut members = BTreeSet::new();
            for entry in fs::read_dir(&dir)?.filter_map(Result::ok) {
                let path = entry.path();
                if path.is_file() && is_supported_image(&path) {
                    members.insert(entry.file_name().to_string_lossy().to_string());
                }
            }
            for id in &members {
                index.record(&name, id);
            }
            index.albums.entry(name).or_default().extend(members);
        }
        Ok(index)
    }

    fn record(&mut self, album: &str, id: &str) {
        match self.owner.get(id) {
            Some(existing) if existing != album => {
                tracing::warn!(
                    "{} is present in albums {:?} and {:?}; keeping {:?}",
                    id,
                    existing,
                    album,
                    existing
                );
            }
            Some(_) => {}
            None => {
                self.owner.insert(id.to_string(), album.to_string());
            }
        }
    }

    /// Album the item was first found in, by album name order.
    pub fn album_of(&self, id: &str) -> Option<&str> {
        self.owner.get(id).map(String::as_str)
    }

    /// Case-insensitive lookup returning the album's on-disk spelling.
    pub fn find(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        self.albums
            .keys()
            .find(|existing| existing.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn members(&self, album: &str) -> Option<&BTreeSet<String>> {
        self.albums.get(album)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.albums.iter().map(|(name, members)| (name.as_str(), members))
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }
}
