//! Interchangeable ways of turning unalbumed items into album proposals.

use crate::core::album::AlbumIndex;
use crate::core::cluster::{cluster_texts, tokenize, DEFAULT_THRESHOLD};
use crate::core::hash::HashService;
use crate::core::item::{Item, UNCATEGORIZED};
use crate::core::source::ImageSource;
use image_hasher::ImageHash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How a proposal gets its album name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupLabel {
    /// Name decided by the strategy itself.
    Named(String),
    /// Ask the album namer.
    Suggest,
}

/// A cluster of item indices plus where its name comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub label: GroupLabel,
    pub members: Vec<usize>,
}

/// Where a resolved album name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameOrigin {
    /// First use of the name, in this run or ever.
    New,
    /// Album folder already exists from an earlier run.
    Existing,
    /// Another proposal of this run already claimed the name.
    SameRun,
}

/// Per-run scratch state: visual hashes gathered per group and the album
/// names claimed so far. Dropped when the run ends.
pub struct RunContext<'a> {
    source: &'a dyn ImageSource,
    hashes: HashService,
    visual_cache: HashMap<String, Option<ImageHash>>,
    visual_groups: Vec<(usize, Vec<ImageHash>)>,
    claimed: BTreeMap<String, String>,
}

impl<'a> RunContext<'a> {
    pub fn new(source: &'a dyn ImageSource) -> Self {
        Self {
            source,
            hashes: HashService::new(),
            visual_cache: HashMap::new(),
            visual_groups: Vec::new(),
            claimed: BTreeMap::new(),
        }
    }

    /// Mean hash of the item's image; `None` when it cannot be read or decoded.
    pub fn visual_hash(&mut self, id: &str) -> Option<ImageHash> {
        if let Some(cached) = self.visual_cache.get(id) {
            return cached.clone();
        }
        let hash = match self.source.read(id) {
            Ok(bytes) => match self.hashes.visual_hash(&bytes) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::warn!("Cannot hash {}: {}", id, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Cannot read {} for hashing: {}", id, e);
                None
            }
        };
        self.visual_cache.insert(id.to_string(), hash.clone());
        hash
    }

    /// Adds `hash` to the visual group of `proposal`.
    pub fn remember_hash(&mut self, proposal: usize, hash: ImageHash) {
        match self.visual_groups.iter_mut().find(|(p, _)| *p == proposal) {
            Some((_, hashes)) => hashes.push(hash),
            None => self.visual_groups.push((proposal, vec![hash])),
        }
    }

    /// First group, in creation order, holding a hash within `max_distance`.
    pub fn closest_group(&self, hash: &ImageHash, max_distance: u32) -> Option<usize> {
        self.visual_groups
            .iter()
            .find(|(_, hashes)| hashes.iter().any(|h| h.dist(hash) <= max_distance))
            .map(|(proposal, _)| *proposal)
    }

    /// Maps a sanitized name onto the album it should land in.
    ///
    /// Names compare case-insensitively. An existing album folder wins, then
    /// a name already claimed earlier in this run; otherwise the name is
    /// claimed as given.
    pub fn claim_album(&mut self, name: &str, albums: &AlbumIndex) -> (String, NameOrigin) {
        let key = name.to_lowercase();
        if let Some(existing) = albums.find(name) {
            let existing = existing.to_string();
            self.claimed.entry(key).or_insert_with(|| existing.clone());
            return (existing, NameOrigin::Existing);
        }
        if let Some(claimed) = self.claimed.get(&key) {
            return (claimed.clone(), NameOrigin::SameRun);
        }
        self.claimed.insert(key, name.to_string());
        (name.to_string(), NameOrigin::New)
    }
}

pub trait GroupingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Partitions `items` into proposals. Every index appears exactly once.
    fn group(&self, items: &[Item], ctx: &mut RunContext<'_>) -> Vec<Proposal>;
}

/// TF-IDF similarity of caption text with greedy anchor clustering.
pub struct TextCluster {
    pub threshold: f64,
}

impl Default for TextCluster {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl GroupingStrategy for TextCluster {
    fn name(&self) -> &'static str {
        "text"
    }

    fn group(&self, items: &[Item], _ctx: &mut RunContext<'_>) -> Vec<Proposal> {
        let corpus: Vec<String> = items.iter().map(Item::content_key).collect();
        cluster_texts(&corpus, self.threshold)
            .into_iter()
            .map(|cluster| Proposal {
                label: GroupLabel::Suggest,
                members: cluster.members,
            })
            .collect()
    }
}

/// Perceptual-hash grouping of the screenshots themselves.
pub struct VisualSimilarity {
    /// Largest Hamming distance between mean hashes still counted as a match.
    pub max_distance: u32,
}

impl Default for VisualSimilarity {
    fn default() -> Self {
        Self { max_distance: 10 }
    }
}

impl GroupingStrategy for VisualSimilarity {
    fn name(&self) -> &'static str {
        "visual"
    }

    fn group(&self, items: &[Item], ctx: &mut RunContext<'_>) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let hash = ctx.visual_hash(&item.id);
            let matched = hash
                .as_ref()
                .and_then(|hash| ctx.closest_group(hash, self.max_distance));
            let proposal = match matched {
                Some(proposal) => {
                    proposals[proposal].members.push(index);
                    proposal
                }
                None => {
                    proposals.push(Proposal {
                        label: GroupLabel::Suggest,
                        members: vec![index],
                    });
                    proposals.len() - 1
                }
            };
            if let Some(hash) = hash {
                ctx.remember_hash(proposal, hash);
            }
        }
        proposals
    }
}

/// A fixed album and the words that send a caption there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Category {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Single-word keywords must equal a caption token; phrases match as
    /// substrings of the lowercased caption.
    fn matches(&self, tokens: &[String], text: &str) -> bool {
        self.keywords.iter().any(|keyword| {
            let keyword = keyword.trim().to_lowercase();
            if keyword.contains(char::is_whitespace) {
                text.contains(&keyword)
            } else {
                !keyword.is_empty() && tokens.iter().any(|token| *token == keyword)
            }
        })
    }
}

/// Album categories used when none are configured.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("Chat", &["chat", "conversation", "whatsapp", "messenger"]),
        Category::new("Map", &["map", "location", "navigation", "gps"]),
        Category::new("Invoice", &["invoice", "bill", "receipt", "payment"]),
        Category::new(
            "Social",
            &[
                "instagram", "facebook", "post", "comment", "youtube", "tiktok", "twitter",
                "snapchat", "linkedin",
            ],
        ),
        Category::new("Design", &["design", "ui", "ux", "mockup", "prototype"]),
    ]
}

/// Keyword table lookup, optionally falling back to visual similarity with
/// items already placed this run, then to `Uncategorized`.
pub struct KeywordMatch {
    pub categories: Vec<Category>,
    pub visual_fallback: Option<VisualSimilarity>,
}

impl Default for KeywordMatch {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            visual_fallback: Some(VisualSimilarity::default()),
        }
    }
}

impl KeywordMatch {
    fn category_for(&self, item: &Item) -> Option<&Category> {
        let text = item.content_key().to_lowercase();
        let tokens = tokenize(&text);
        self.categories
            .iter()
            .find(|category| category.matches(&tokens, &text))
    }
}

fn named_proposal(proposals: &mut Vec<Proposal>, name: &str) -> usize {
    let label = GroupLabel::Named(name.to_string());
    if let Some(position) = proposals.iter().position(|p| p.label == label) {
        return position;
    }
    proposals.push(Proposal {
        label,
        members: Vec::new(),
    });
    proposals.len() - 1
}

impl GroupingStrategy for KeywordMatch {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn group(&self, items: &[Item], ctx: &mut RunContext<'_>) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let hash = self
                .visual_fallback
                .as_ref()
                .and_then(|_| ctx.visual_hash(&item.id));

            let proposal = match self.category_for(item) {
                Some(category) => named_proposal(&mut proposals, &category.name),
                None => {
                    let visual = self
                        .visual_fallback
                        .as_ref()
                        .zip(hash.as_ref())
                        .and_then(|(fallback, hash)| ctx.closest_group(hash, fallback.max_distance));
                    match visual {
                        Some(proposal) => {
                            tracing::debug!("{} matched visually", item.id);
                            proposal
                        }
                        None => named_proposal(&mut proposals, UNCATEGORIZED),
                    }
                }
            };
            proposals[proposal].members.push(index);
            if let Some(hash) = hash {
                ctx.remember_hash(proposal, hash);
            }
        }
        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::tests::{banded_png, split_png};
    use crate::core::source::SourceError;
    use std::collections::HashMap as Map;

    struct MemorySource(Map<String, Vec<u8>>);

    impl ImageSource for MemorySource {
        fn list(&self) -> Result<Vec<String>, SourceError> {
            let mut ids: Vec<String> = self.0.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }

        fn read(&self, id: &str) -> Result<Vec<u8>, SourceError> {
            self.0
                .get(id)
                .cloned()
                .ok_or_else(|| SourceError::NotFound { id: id.to_string() })
        }
    }

    fn item(id: &str, title: &str, description: &str) -> Item {
        Item {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            tags: vec!["tag".to_string()],
            album: None,
        }
    }

    fn members(proposals: &[Proposal]) -> Vec<Vec<usize>> {
        proposals.iter().map(|p| p.members.clone()).collect()
    }

    #[test]
    fn test_text_cluster_proposals_ask_the_namer() {
        let source = MemorySource(Map::new());
        let mut ctx = RunContext::new(&source);
        let items = vec![
            item("a.png", "Login error screen", "A login error message"),
            item("b.png", "Weather forecast", "Forecast for today"),
            item("c.png", "Login error screen", "Password error on login"),
        ];

        let proposals = TextCluster::default().group(&items, &mut ctx);
        assert_eq!(members(&proposals), vec![vec![0, 2], vec![1]]);
        assert!(proposals.iter().all(|p| p.label == GroupLabel::Suggest));
    }

    #[test]
    fn test_keyword_match_uses_categories_then_uncategorized() {
        let source = MemorySource(Map::new());
        let mut ctx = RunContext::new(&source);
        let strategy = KeywordMatch {
            categories: default_categories(),
            visual_fallback: None,
        };
        let items = vec![
            item("a.png", "Group chat", "Friends talking"),
            item("b.png", "Paid invoice", "Electricity bill"),
            item("c.png", "Sunset", "A beach at dusk"),
            item("d.png", "WhatsApp", "Another conversation"),
        ];

        let proposals = strategy.group(&items, &mut ctx);
        assert_eq!(
            proposals,
            vec![
                Proposal {
                    label: GroupLabel::Named("Chat".to_string()),
                    members: vec![0, 3],
                },
                Proposal {
                    label: GroupLabel::Named("Invoice".to_string()),
                    members: vec![1],
                },
                Proposal {
                    label: GroupLabel::Named(UNCATEGORIZED.to_string()),
                    members: vec![2],
                },
            ]
        );
    }

    #[test]
    fn test_keyword_must_be_a_whole_word() {
        let category = Category::new("Design", &["ui"]);
        let text = "a quiet build log";
        assert!(!category.matches(&tokenize(text), text));
        let text = "new ui mockup";
        assert!(category.matches(&tokenize(text), text));
    }

    #[test]
    fn test_keyword_visual_fallback_joins_lookalike() {
        let source = MemorySource(Map::from([
            ("a.png".to_string(), split_png(32)),
            ("b.png".to_string(), split_png(33)),
            ("c.png".to_string(), banded_png(32)),
        ]));
        let mut ctx = RunContext::new(&source);
        let items = vec![
            item("a.png", "Group chat", "Friends talking"),
            item("b.png", "Screenshot", "Nothing obvious"),
            item("c.png", "Screenshot", "Nothing obvious either"),
        ];

        let proposals = KeywordMatch::default().group(&items, &mut ctx);
        assert_eq!(members(&proposals), vec![vec![0, 1], vec![2]]);
        assert_eq!(proposals[1].label, GroupLabel::Named(UNCATEGORIZED.to_string()));
    }

    #[test]
    fn test_visual_similarity_groups_by_layout() {
        let source = MemorySource(Map::from([
            ("a.png".to_string(), split_png(32)),
            ("b.png".to_string(), banded_png(32)),
            ("c.png".to_string(), split_png(33)),
            ("d.png".to_string(), b"broken".to_vec()),
        ]));
        let mut ctx = RunContext::new(&source);
        let items = vec![
            item("a.png", "", ""),
            item("b.png", "", ""),
            item("c.png", "", ""),
            item("d.png", "", ""),
        ];

        let proposals = VisualSimilarity::default().group(&items, &mut ctx);
        assert_eq!(members(&proposals), vec![vec![0, 2], vec![1], vec![3]]);
    }

    #[test]
    fn test_claim_album_merges_same_run_and_existing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("Chats")).unwrap();
        let albums = AlbumIndex::load(temp_dir.path()).unwrap();
        let source = MemorySource(Map::new());
        let mut ctx = RunContext::new(&source);

        assert_eq!(
            ctx.claim_album("chats", &albums),
            ("Chats".to_string(), NameOrigin::Existing)
        );
        assert_eq!(
            ctx.claim_album("Maps", &albums),
            ("Maps".to_string(), NameOrigin::New)
        );
        assert_eq!(
            ctx.claim_album("MAPS", &albums),
            ("Maps".to_string(), NameOrigin::SameRun)
        );
    }
}
