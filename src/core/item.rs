use serde::{Deserialize, Serialize};

/// Placeholder album for anything the namer or a strategy cannot label.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One screenshot and the caption data derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Source file name, unique within the screenshot folder.
    pub id: String,
    pub title: String,
    pub description: String,
    /// Oracle order, duplicates allowed.
    pub tags: Vec<String>,
    pub album: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Text unit used for similarity: `title + " " + description`.
    pub fn content_key(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// True once title, description and tags are all present.
    pub fn is_captioned(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.description.trim().is_empty()
            && !self.tags.is_empty()
    }

    pub fn has_content(&self) -> bool {
        !self.content_key().trim().is_empty()
    }

    /// Overwrites the caption fields, leaving `id` and `album` alone.
    pub fn apply_caption(&mut self, caption: Caption) {
        self.title = caption.title;
        self.description = caption.description;
        self.tags = caption.tags;
    }
}

/// Structured reply parsed from the caption oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caption {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Title,
    Description,
    Tags,
    Album,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line.trim() {
            "Title:" => Some(Self::Title),
            "Description:" => Some(Self::Description),
            "Tags:" => Some(Self::Tags),
            "Album:" => Some(Self::Album),
            _ => None,
        }
    }
}

/// Splits a comma separated tag line, dropping empty entries.
pub fn split_tags(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders the human readable sidecar stored next to every screenshot.
pub fn render_sidecar(item: &Item) -> String {
    let mut out = format!(
        "Title:\n{}\n\nDescription:\n{}\n\nTags:\n{}\n",
        item.title,
        item.description,
        item.tags.join(", ")
    );
    if let Some(album) = &item.album {
        out.push_str(&format!("\nAlbum:\n{album}\n"));
    }
    out
}

/// Parses a sidecar produced by [`render_sidecar`].
///
/// Missing sections come back empty; lines outside a known section and
/// anything after the last section are ignored. A value spread over several
/// lines is joined with single spaces.
pub fn parse_sidecar(id: &str, content: &str) -> Item {
    let mut item = Item::new(id);
    let mut current: Option<Section> = None;
    let mut title = Vec::new();
    let mut description = Vec::new();
    let mut tags = Vec::new();
    let mut album = Vec::new();

    for line in content.lines() {
        if let Some(section) = Section::from_header(line) {
            current = Some(section);
            continue;
        }
        let value = line.trim();
        if value.is_empty() {
            // A blank line closes the section.
            current = None;
            continue;
        }
        match current {
            Some(Section::Title) => title.push(value),
            Some(Section::Description) => description.push(value),
            Some(Section::Tags) => tags.push(value),
            Some(Section::Album) => album.push(value),
            None => {}
        }
    }

    item.title = title.join(" ");
    item.description = description.join(" ");
    item.tags = tags.iter().flat_map(|line| split_tags(line)).collect();
    let album = album.join(" ");
    item.album = (!album.is_empty()).then_some(album);
    item
}
