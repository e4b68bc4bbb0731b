use crate::core::item::{Item, UNCATEGORIZED};
use crate::core::oracle::CaptionOracle;
use crate::core::source::ImageSource;

/// Characters no album folder name may contain.
const ILLEGAL_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Makes `raw` usable as a folder name, `Uncategorized` when nothing is left.
pub fn sanitize_album_name(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    let mut cleaned = filtered.as_str();
    loop {
        let next = cleaned.trim().trim_end_matches('.');
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    if cleaned.chars().all(|c| c == '.') {
        UNCATEGORIZED.to_string()
    } else {
        cleaned.to_string()
    }
}

/// First reply line with any `Label:` prefix removed.
pub fn name_from_reply(reply: &str) -> String {
    let first = reply.lines().next().unwrap_or_default();
    let value = match first.split_once(':') {
        Some((_, rest)) => rest,
        None => first,
    };
    sanitize_album_name(value)
}

pub fn naming_prompt(members: &[&Item]) -> String {
    let files: Vec<&str> = members.iter().map(|item| item.id.as_str()).collect();
    let tags: Vec<&str> = members
        .iter()
        .flat_map(|item| item.tags.iter().map(String::as_str))
        .collect();
    format!(
        "You are a folder-organization expert.\n\
Given these filenames and tags, suggest ONE concise (1-2 word) folder name.\n\
Files: {files:?}\nTags: {tags:?}\n\
Return just the name."
    )
}

/// Outcome of naming one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumName {
    pub name: String,
    /// The oracle could not be asked or did not answer.
    pub fallback: bool,
}

/// Asks the oracle for a short album label, anchored on the first member's
/// screenshot.
pub struct AlbumNamer<'a> {
    oracle: &'a CaptionOracle,
}

impl<'a> AlbumNamer<'a> {
    pub fn new(oracle: &'a CaptionOracle) -> Self {
        Self { oracle }
    }

    /// Never fails; any error yields `Uncategorized`.
    pub fn name(&self, members: &[&Item], source: &dyn ImageSource) -> AlbumName {
        let Some(anchor) = members.first() else {
            return AlbumName {
                name: UNCATEGORIZED.to_string(),
                fallback: true,
            };
        };

        let image = match source.read(&anchor.id) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Cannot read {} for album naming: {}", anchor.id, e);
                return AlbumName {
                    name: UNCATEGORIZED.to_string(),
                    fallback: true,
                };
            }
        };

        match self.oracle.ask(&naming_prompt(members), &image) {
            Ok(reply) => AlbumName {
                name: name_from_reply(&reply),
                fallback: false,
            },
            Err(e) => {
                tracing::warn!("Album naming failed for cluster at {}: {}", anchor.id, e);
                AlbumName {
                    name: UNCATEGORIZED.to_string(),
                    fallback: true,
                }
            }
        }
    }
}
