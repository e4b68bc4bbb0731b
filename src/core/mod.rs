pub mod album;
pub mod cluster;
pub mod hash;
pub mod history;
pub mod item;
pub mod namer;
pub mod oracle;
pub mod organizer;
pub mod scanner;
pub mod source;
pub mod store;
pub mod strategy;

pub use album::AlbumIndex;
pub use hash::HashService;
pub use history::HistoryJournal;
pub use item::{Caption, Item};
pub use oracle::CaptionOracle;
pub use organizer::Organizer;
pub use source::{DirectorySource, ImageSource};
pub use store::MetadataStore;
pub use strategy::GroupingStrategy;
