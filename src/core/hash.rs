use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
}

/// Content digests for copy idempotence and mean hashes for visual grouping.
pub struct HashService {
    hasher: Hasher,
}

impl HashService {
    pub fn new() -> Self {
        Self {
            hasher: HasherConfig::new().hash_alg(HashAlg::Mean).to_hasher(),
        }
    }

    /// blake3 digest of a file, streamed in 8 KB chunks.
    pub fn file_digest(&self, file_path: &Path) -> Result<blake3::Hash, HashError> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(hasher.finalize())
    }

    pub fn bytes_digest(&self, bytes: &[u8]) -> blake3::Hash {
        blake3::hash(bytes)
    }

    /// True when `path` already holds exactly `bytes`.
    pub fn same_content(&self, path: &Path, bytes: &[u8]) -> Result<bool, HashError> {
        if !path.is_file() {
            return Ok(false);
        }
        Ok(self.file_digest(path)? == self.bytes_digest(bytes))
    }

    /// Mean perceptual hash of encoded image bytes.
    pub fn visual_hash(&self, bytes: &[u8]) -> Result<ImageHash, HashError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.hasher.hash_image(&img))
    }
}

impl Default for HashService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// PNG with the left `split` columns dark and the rest light.
    pub(crate) fn split_png(split: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, _| {
            if x < split {
                Rgb([10, 10, 10])
            } else {
                Rgb([245, 245, 245])
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// PNG split horizontally instead.
    pub(crate) fn banded_png(split: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |_, y| {
            if y < split {
                Rgb([10, 10, 10])
            } else {
                Rgb([245, 245, 245])
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_file_digest_matches_bytes_digest() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("shot.png");
        fs::write(&file_path, b"Hello, World!").unwrap();

        let service = HashService::new();
        assert_eq!(
            service.file_digest(&file_path).unwrap(),
            service.bytes_digest(b"Hello, World!")
        );
        assert!(service.same_content(&file_path, b"Hello, World!").unwrap());
        assert!(!service.same_content(&file_path, b"Other").unwrap());
        assert!(!service
            .same_content(&temp_dir.path().join("missing"), b"x")
            .unwrap());
    }

    #[test]
    fn test_visual_hash_separates_layouts() {
        let service = HashService::new();
        let left = service.visual_hash(&split_png(32)).unwrap();
        let near = service.visual_hash(&split_png(33)).unwrap();
        let banded = service.visual_hash(&banded_png(32)).unwrap();

        assert!(left.dist(&near) < left.dist(&banded));
        assert_eq!(left.dist(&left), 0);
    }

    #[test]
    fn test_visual_hash_rejects_garbage() {
        let service = HashService::new();
        assert!(matches!(
            service.visual_hash(b"not an image"),
            Err(HashError::Image(_))
        ));
    }
}
