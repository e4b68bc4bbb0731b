use crate::core::hash::HashService;
use crate::core::item::{render_sidecar, Item};
use crate::core::source::ImageSource;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Cannot create album folder {path}: {source}")]
    CreateAlbum {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot read source image {id}: {reason}")]
    Read { id: String, reason: String },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Something the organizer did that the metadata store has to learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizeEvent {
    Created { album: String },
    Moved { id: String, album: String },
    Failed { id: String, album: String, reason: String },
}

/// Result of materializing one album.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialization {
    pub album: String,
    pub created: bool,
    /// Ids now present in the album folder.
    pub moved: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl Materialization {
    pub fn events(&self) -> Vec<OrganizeEvent> {
        let mut events = Vec::new();
        if self.created {
            events.push(OrganizeEvent::Created {
                album: self.album.clone(),
            });
        }
        events.extend(self.moved.iter().map(|id| OrganizeEvent::Moved {
            id: id.clone(),
            album: self.album.clone(),
        }));
        events.extend(self.failed.iter().map(|(id, reason)| OrganizeEvent::Failed {
            id: id.clone(),
            album: self.album.clone(),
            reason: reason.clone(),
        }));
        events
    }
}

/// Writes album folders: a copy of each member screenshot plus its sidecar.
pub struct Organizer {
    root: PathBuf,
}

impl Organizer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn album_path(&self, album: &str) -> PathBuf {
        self.root.join(album)
    }

    /// Ensures `album` exists and holds every member. Running it again with
    /// the same input changes nothing on disk. A member that cannot be copied
    /// is reported and the rest carry on; only a folder that cannot be
    /// created fails the whole album.
    pub fn materialize(
        &self,
        album: &str,
        members: &[Item],
        source: &dyn ImageSource,
    ) -> Result<Materialization, OrganizeError> {
        let dir = self.album_path(album);
        let created = !dir.is_dir();
        fs::create_dir_all(&dir).map_err(|source| OrganizeError::CreateAlbum {
            path: dir.to_string_lossy().to_string(),
            source,
        })?;

        let hashes = HashService::new();
        let mut result = Materialization {
            album: album.to_string(),
            created,
            ..Materialization::default()
        };

        for member in members {
            let mut placed = member.clone();
            placed.album = Some(album.to_string());
            match self.place(&dir, &placed, source, &hashes) {
                Ok(()) => result.moved.push(member.id.clone()),
                Err(e) => {
                    tracing::warn!("Could not add {} to {}: {}", member.id, album, e);
                    result.failed.push((member.id.clone(), e.to_string()));
                }
            }
        }
        Ok(result)
    }

    fn place(
        &self,
        dir: &Path,
        item: &Item,
        source: &dyn ImageSource,
        hashes: &HashService,
    ) -> Result<(), OrganizeError> {
        let image = source.read(&item.id).map_err(|e| OrganizeError::Read {
            id: item.id.clone(),
            reason: e.to_string(),
        })?;
        write_if_changed(&dir.join(&item.id), &image, hashes)?;
        let sidecar = render_sidecar(item);
        write_if_changed(&dir.join(format!("{}.txt", item.id)), sidecar.as_bytes(), hashes)
    }
}

/// Leaves `path` alone when it already holds `bytes`.
fn write_if_changed(path: &Path, bytes: &[u8], hashes: &HashService) -> Result<(), OrganizeError> {
    if hashes.same_content(path, bytes).unwrap_or(false) {
        return Ok(());
    }
    fs::write(path, bytes).map_err(|source| OrganizeError::Write {
        path: path.to_string_lossy().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::DirectorySource;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DirectorySource, Organizer) {
        let temp_dir = TempDir::new().unwrap();
        let shots = temp_dir.path().join("shots");
        fs::create_dir_all(&shots).unwrap();
        fs::write(shots.join("a.png"), b"image-a").unwrap();
        fs::write(shots.join("b.png"), b"image-b").unwrap();
        let source = DirectorySource::new(&shots);
        let organizer = Organizer::new(temp_dir.path().join("albums"));
        (temp_dir, source, organizer)
    }

    fn captioned(id: &str) -> Item {
        Item {
            id: id.to_string(),
            title: "Chat".to_string(),
            description: "A chat".to_string(),
            tags: vec!["chat".to_string()],
            album: None,
        }
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>, SystemTime)> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().to_string(),
                    fs::read(e.path()).unwrap(),
                    e.metadata().unwrap().modified().unwrap(),
                )
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    #[test]
    fn test_materialize_copies_image_and_sidecar() {
        let (_temp, source, organizer) = setup();
        let result = organizer
            .materialize("Chats", &[captioned("a.png")], &source)
            .unwrap();

        assert!(result.created);
        assert_eq!(result.moved, vec!["a.png"]);
        let dir = organizer.album_path("Chats");
        assert_eq!(fs::read(dir.join("a.png")).unwrap(), b"image-a");
        let sidecar = fs::read_to_string(dir.join("a.png.txt")).unwrap();
        assert!(sidecar.contains("Album:\nChats"));
        assert_eq!(
            result.events(),
            vec![
                OrganizeEvent::Created {
                    album: "Chats".to_string()
                },
                OrganizeEvent::Moved {
                    id: "a.png".to_string(),
                    album: "Chats".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_materialize_twice_is_idempotent() {
        let (_temp, source, organizer) = setup();
        let members = vec![captioned("a.png"), captioned("b.png")];

        organizer.materialize("Chats", &members, &source).unwrap();
        let first = snapshot(&organizer.album_path("Chats"));
        let again = organizer.materialize("Chats", &members, &source).unwrap();
        let second = snapshot(&organizer.album_path("Chats"));

        assert!(!again.created);
        assert_eq!(again.moved.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_member_does_not_abort_album() {
        let (_temp, source, organizer) = setup();
        let members = vec![captioned("gone.png"), captioned("b.png")];

        let result = organizer.materialize("Chats", &members, &source).unwrap();
        assert_eq!(result.moved, vec!["b.png"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "gone.png");
        assert!(organizer.album_path("Chats").join("b.png").exists());
    }

    #[test]
    fn test_changed_source_is_recopied() {
        let (temp, source, organizer) = setup();
        organizer
            .materialize("Chats", &[captioned("a.png")], &source)
            .unwrap();
        fs::write(temp.path().join("shots").join("a.png"), b"image-a-v2").unwrap();
        organizer
            .materialize("Chats", &[captioned("a.png")], &source)
            .unwrap();

        assert_eq!(
            fs::read(organizer.album_path("Chats").join("a.png")).unwrap(),
            b"image-a-v2"
        );
    }
}
