use crate::core::album::AlbumIndex;
use crate::core::item::Item;
use crate::core::store::MetadataStore;

/// What a run has to do, computed from the source listing, the metadata
/// store and the album index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Items without a complete caption, in listing order.
    pub to_caption: Vec<Item>,
    /// Captioned items that never made it into an album.
    pub pending: Vec<Item>,
    /// Terminal items whose stored album field disagrees with the index.
    pub repairs: Vec<Item>,
    /// Items skipped as terminal.
    pub terminal: usize,
}

impl Reconciliation {
    /// Nothing to caption and nothing to cluster.
    pub fn is_settled(&self) -> bool {
        self.to_caption.is_empty() && self.pending.is_empty()
    }

    pub fn work_len(&self) -> usize {
        self.to_caption.len() + self.pending.len()
    }
}

/// Splits `ids` into caption work, pending clustering work and terminal
/// items. `ids` is sorted first so the result never depends on listing order.
pub fn reconcile(ids: &[String], store: &MetadataStore, albums: &AlbumIndex) -> Reconciliation {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();

    let mut result = Reconciliation::default();
    for id in ids {
        let mut item = store.get_or_default(&id);
        let indexed = albums.album_of(&id);

        match (item.is_captioned(), indexed) {
            (true, Some(album)) => {
                result.terminal += 1;
                if item.album.as_deref() != Some(album) {
                    item.album = Some(album.to_string());
                    result.repairs.push(item);
                }
            }
            (true, None) => {
                // Stale album field from a deleted album folder.
                item.album = None;
                result.pending.push(item);
            }
            (false, indexed) => {
                // Keeps an existing membership so captioning alone finishes it.
                item.album = indexed.map(str::to_string);
                result.to_caption.push(item);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn captioned(id: &str) -> Item {
        Item {
            id: id.to_string(),
            title: "Invoice".to_string(),
            description: "A payment receipt".to_string(),
            tags: vec!["invoice".to_string()],
            album: None,
        }
    }

    fn add_to_album(root: &std::path::Path, album: &str, id: &str) {
        let dir = root.join(album);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(id), b"x").unwrap();
    }

    #[test]
    fn test_new_items_need_captions() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::open(temp_dir.path().join("meta")).unwrap();
        let ids = vec!["b.png".to_string(), "a.png".to_string()];

        let result = reconcile(&ids, &store, &AlbumIndex::default());
        let order: Vec<&str> = result.to_caption.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, vec!["a.png", "b.png"]);
        assert!(result.pending.is_empty());
        assert!(!result.is_settled());
    }

    #[test]
    fn test_captioned_without_album_is_pending() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::open(temp_dir.path().join("meta")).unwrap();
        store.put(&captioned("a.png")).unwrap();

        let result = reconcile(&["a.png".to_string()], &store, &AlbumIndex::default());
        assert!(result.to_caption.is_empty());
        assert_eq!(result.pending, vec![captioned("a.png")]);
    }

    #[test]
    fn test_partial_caption_is_carried_forward() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::open(temp_dir.path().join("meta")).unwrap();
        let mut partial = captioned("a.png");
        partial.tags.clear();
        store.put(&partial).unwrap();

        let result = reconcile(&["a.png".to_string()], &store, &AlbumIndex::default());
        assert_eq!(result.to_caption[0].title, "Invoice");
    }

    #[test]
    fn test_terminal_items_are_skipped_and_repaired() {
        let temp_dir = TempDir::new().unwrap();
        let albums_root = temp_dir.path().join("albums");
        let store = MetadataStore::open(temp_dir.path().join("meta")).unwrap();
        store.put(&captioned("a.png")).unwrap();
        add_to_album(&albums_root, "Bills", "a.png");

        let albums = AlbumIndex::load(&albums_root).unwrap();
        let result = reconcile(&["a.png".to_string()], &store, &albums);

        assert!(result.is_settled());
        assert_eq!(result.terminal, 1);
        assert_eq!(result.repairs.len(), 1);
        assert_eq!(result.repairs[0].album.as_deref(), Some("Bills"));
    }

    #[test]
    fn test_reconcile_twice_is_idempotent_once_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let albums_root = temp_dir.path().join("albums");
        let store = MetadataStore::open(temp_dir.path().join("meta")).unwrap();
        let mut item = captioned("a.png");
        item.album = Some("Bills".to_string());
        store.put(&item).unwrap();
        add_to_album(&albums_root, "Bills", "a.png");

        let albums = AlbumIndex::load(&albums_root).unwrap();
        let ids = vec!["a.png".to_string()];
        let first = reconcile(&ids, &store, &albums);
        let second = reconcile(&ids, &store, &albums);

        assert!(first.is_settled());
        assert!(first.repairs.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_in_album_but_uncaptioned_needs_caption() {
        let temp_dir = TempDir::new().unwrap();
        let albums_root = temp_dir.path().join("albums");
        let store = MetadataStore::open(temp_dir.path().join("meta")).unwrap();
        add_to_album(&albums_root, "Bills", "a.png");

        let albums = AlbumIndex::load(&albums_root).unwrap();
        let result = reconcile(&["a.png".to_string()], &store, &albums);
        assert_eq!(result.to_caption.len(), 1);
        assert_eq!(result.to_caption[0].album.as_deref(), Some("Bills"));
    }
}
