//! One captioning-and-clustering pass over the screenshot folder.
//!
//! Scan, caption what is missing, group everything captioned but unalbumed,
//! name the groups, copy them into album folders and record the album on
//! each item. A failure on one item never stops the others; the only fatal
//! error is a source folder that cannot be listed.

use crate::config::Config;
use crate::core::album::AlbumIndex;
use crate::core::history::{AlbumHistoryRecord, HistoryJournal};
use crate::core::item::{Caption, Item};
use crate::core::namer::{sanitize_album_name, AlbumNamer};
use crate::core::oracle::{CaptionOracle, OracleError};
use crate::core::organizer::{Materialization, OrganizeError, Organizer};
use crate::core::scanner::{reconcile, Reconciliation};
use crate::core::source::{DirectorySource, ImageSource, SourceError};
use crate::core::store::{MetadataStore, StoreError};
use crate::core::strategy::{GroupLabel, GroupingStrategy, NameOrigin, RunContext};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Metadata store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot read album folders: {0}")]
    Albums(std::io::Error),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Cannot start worker pool: {0}")]
    Workers(String),
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub scanned: usize,
    pub terminal: usize,
    pub repaired: usize,
    pub captioned: usize,
    pub rate_limited: usize,
    pub transient_failures: usize,
    pub parse_failures: usize,
    pub other_failures: usize,
    pub clustered: usize,
    pub albums_created: usize,
    pub albums_extended: usize,
    pub items_organized: usize,
    pub copy_failures: usize,
    pub naming_fallbacks: usize,
    pub store_failures: usize,
}

impl RunSummary {
    /// Items that stay eligible for the next run.
    pub fn skipped(&self) -> usize {
        self.rate_limited
            + self.transient_failures
            + self.parse_failures
            + self.other_failures
            + self.copy_failures
            + self.store_failures
    }

    fn record_failure(&mut self, failure: &CaptionFailure) {
        match failure {
            CaptionFailure::Oracle(OracleError::RateLimited) => self.rate_limited += 1,
            CaptionFailure::Oracle(e) if e.is_transient() => self.transient_failures += 1,
            CaptionFailure::Oracle(OracleError::Parse(_)) => self.parse_failures += 1,
            _ => self.other_failures += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "scanned:          {}", self.scanned)?;
        writeln!(f, "already done:     {}", self.terminal)?;
        writeln!(f, "captioned:        {}", self.captioned)?;
        writeln!(f, "clustered:        {}", self.clustered)?;
        writeln!(f, "albums created:   {}", self.albums_created)?;
        writeln!(f, "albums extended:  {}", self.albums_extended)?;
        writeln!(f, "items organized:  {}", self.items_organized)?;
        write!(
            f,
            "skipped:          {} (rate limited {}, service {}, unparseable {}, other {}, copy {}, store {})",
            self.skipped(),
            self.rate_limited,
            self.transient_failures,
            self.parse_failures,
            self.other_failures,
            self.copy_failures,
            self.store_failures
        )?;
        if self.naming_fallbacks > 0 {
            write!(f, "\nnaming fallbacks: {}", self.naming_fallbacks)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing needed captioning or clustering.
    AlreadyOrganized(RunSummary),
    Completed(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            Self::AlreadyOrganized(summary) | Self::Completed(summary) => summary,
        }
    }
}

#[derive(Debug)]
enum CaptionFailure {
    Oracle(OracleError),
    Source(SourceError),
}

impl fmt::Display for CaptionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oracle(e) => write!(f, "{e}"),
            Self::Source(e) => write!(f, "{e}"),
        }
    }
}

/// An album and the members to copy into it.
struct AlbumPlan {
    album: String,
    members: Vec<Item>,
}

/// Adds `members` to the plan for `album`, so each album folder is written by
/// one task only. Names compare case-insensitively.
fn merge_plan(plans: &mut Vec<AlbumPlan>, album: String, members: Vec<Item>) {
    match plans
        .iter_mut()
        .find(|plan| plan.album.to_lowercase() == album.to_lowercase())
    {
        Some(plan) => plan.members.extend(members),
        None => plans.push(AlbumPlan { album, members }),
    }
}

/// Reconciles `source` against the store and album folders without touching
/// anything.
pub fn scan(
    source: &dyn ImageSource,
    store: &MetadataStore,
    albums_root: &Path,
) -> Result<Reconciliation, PipelineError> {
    let ids = source.list()?;
    let albums = AlbumIndex::load(albums_root).map_err(PipelineError::Albums)?;
    Ok(reconcile(&ids, store, &albums))
}

pub struct Pipeline {
    source: Box<dyn ImageSource>,
    store: MetadataStore,
    oracle: CaptionOracle,
    strategy: Box<dyn GroupingStrategy>,
    organizer: Organizer,
    journal: Option<HistoryJournal>,
    workers: usize,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn ImageSource>,
        store: MetadataStore,
        oracle: CaptionOracle,
        strategy: Box<dyn GroupingStrategy>,
        organizer: Organizer,
    ) -> Self {
        Self {
            source,
            store,
            oracle,
            strategy,
            organizer,
            journal: None,
            workers: 1,
            show_progress: false,
        }
    }

    /// Wires the HTTP oracle and directory collaborators from `config`.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let oracle = CaptionOracle::new(&config.oracle_config())?;
        let store = MetadataStore::open(config.paths.sidecars_dir())?;
        Ok(Self::new(
            Box::new(DirectorySource::new(config.paths.screenshots_dir())),
            store,
            oracle,
            config.grouping.build_strategy(),
            Organizer::new(config.paths.albums_dir()),
        )
        .with_workers(config.workers)
        .with_journal(HistoryJournal::new(&config.paths.root)))
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: HistoryJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn run(&self) -> Result<RunOutcome, PipelineError> {
        let ids = self.source.list()?;
        let albums = AlbumIndex::load(self.organizer.root()).map_err(PipelineError::Albums)?;
        let reconciliation = reconcile(&ids, &self.store, &albums);

        let mut summary = RunSummary {
            scanned: ids.len(),
            terminal: reconciliation.terminal,
            ..RunSummary::default()
        };

        for item in &reconciliation.repairs {
            match self.store.put(item) {
                Ok(()) => summary.repaired += 1,
                Err(e) => {
                    tracing::warn!("Could not record album for {}: {}", item.id, e);
                    summary.store_failures += 1;
                }
            }
        }

        if reconciliation.is_settled() {
            tracing::info!("All {} screenshots are already organized", summary.terminal);
            return Ok(RunOutcome::AlreadyOrganized(summary));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| PipelineError::Workers(e.to_string()))?;

        let (fresh, refreshed) = self.caption_all(&pool, reconciliation.to_caption, &mut summary);

        let mut candidates: Vec<Item> = reconciliation
            .pending
            .into_iter()
            .chain(fresh)
            .filter(Item::has_content)
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        summary.clustered = candidates.len();

        let mut ctx = RunContext::new(self.source.as_ref());
        let mut plans = self.plan_albums(&candidates, &albums, &mut ctx, &mut summary);
        for plan in refreshed {
            merge_plan(&mut plans, plan.album, plan.members);
        }

        let results: Vec<Result<Materialization, OrganizeError>> = pool.install(|| {
            plans
                .par_iter()
                .map(|plan| {
                    self.organizer
                        .materialize(&plan.album, &plan.members, self.source.as_ref())
                })
                .collect()
        });

        for (plan, result) in plans.iter().zip(results) {
            self.record_materialization(plan, result, &mut summary);
        }

        tracing::info!(
            "Run finished: {} captioned, {} organized, {} skipped",
            summary.captioned,
            summary.items_organized,
            summary.skipped()
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Captions `items` on the worker pool and persists every success.
    ///
    /// Returns the newly captioned unalbumed items, plus refresh plans for
    /// items that already sat in an album folder without a caption.
    fn caption_all(
        &self,
        pool: &rayon::ThreadPool,
        items: Vec<Item>,
        summary: &mut RunSummary,
    ) -> (Vec<Item>, Vec<AlbumPlan>) {
        let progress = if self.show_progress {
            let bar = ProgressBar::new(items.len() as u64);
            if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
                bar.set_style(style);
            }
            bar.set_message("Captioning…");
            bar
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<Result<Caption, CaptionFailure>> = pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let result = self
                        .source
                        .read(&item.id)
                        .map_err(CaptionFailure::Source)
                        .and_then(|bytes| {
                            self.oracle.caption(&bytes).map_err(CaptionFailure::Oracle)
                        });
                    progress.inc(1);
                    result
                })
                .collect()
        });
        progress.finish_and_clear();

        let mut fresh = Vec::new();
        let mut refreshed: Vec<AlbumPlan> = Vec::new();
        for (mut item, result) in items.into_iter().zip(results) {
            let caption = match result {
                Ok(caption) => caption,
                Err(failure) => {
                    tracing::warn!("Skipping {} this run: {}", item.id, failure);
                    summary.record_failure(&failure);
                    continue;
                }
            };
            item.apply_caption(caption);
            if let Err(e) = self.store.put(&item) {
                tracing::warn!("Could not save caption for {}: {}", item.id, e);
                summary.store_failures += 1;
                continue;
            }
            summary.captioned += 1;

            match item.album.clone() {
                Some(album) => merge_plan(&mut refreshed, album, vec![item]),
                None => fresh.push(item),
            }
        }
        (fresh, refreshed)
    }

    /// Groups `candidates`, names each group and folds groups that resolve
    /// to the same album into one plan.
    fn plan_albums(
        &self,
        candidates: &[Item],
        albums: &AlbumIndex,
        ctx: &mut RunContext<'_>,
        summary: &mut RunSummary,
    ) -> Vec<AlbumPlan> {
        let proposals = self.strategy.group(candidates, ctx);
        let namer = AlbumNamer::new(&self.oracle);

        let mut plans: Vec<AlbumPlan> = Vec::new();
        for proposal in proposals {
            let members: Vec<&Item> = proposal.members.iter().map(|&i| &candidates[i]).collect();
            if members.is_empty() {
                continue;
            }
            let name = match &proposal.label {
                GroupLabel::Named(name) => sanitize_album_name(name),
                GroupLabel::Suggest => {
                    let named = namer.name(&members, self.source.as_ref());
                    if named.fallback {
                        summary.naming_fallbacks += 1;
                    }
                    named.name
                }
            };

            let (album, origin) = ctx.claim_album(&name, albums);
            if origin == NameOrigin::SameRun {
                tracing::info!("Merging another cluster into {}", album);
            }
            merge_plan(&mut plans, album, members.into_iter().cloned().collect());
        }
        plans
    }

    fn record_materialization(
        &self,
        plan: &AlbumPlan,
        result: Result<Materialization, OrganizeError>,
        summary: &mut RunSummary,
    ) {
        let materialized = match result {
            Ok(materialized) => materialized,
            Err(e) => {
                tracing::warn!("Album {} could not be materialized: {}", plan.album, e);
                summary.copy_failures += plan.members.len();
                return;
            }
        };

        if materialized.created {
            summary.albums_created += 1;
            tracing::info!("Created album {}", materialized.album);
        } else if !materialized.moved.is_empty() {
            summary.albums_extended += 1;
        }
        summary.copy_failures += materialized.failed.len();

        for member in plan.members.iter().filter(|m| materialized.moved.contains(&m.id)) {
            let mut item = member.clone();
            item.album = Some(materialized.album.clone());
            match self.store.put(&item) {
                Ok(()) => summary.items_organized += 1,
                Err(e) => {
                    tracing::warn!("Could not record album for {}: {}", item.id, e);
                    summary.store_failures += 1;
                }
            }
        }

        if let Some(journal) = &self.journal {
            if materialized.created || !materialized.moved.is_empty() {
                let record = AlbumHistoryRecord::now(
                    &materialized.album,
                    materialized.moved.clone(),
                    materialized.created,
                );
                if let Err(e) = journal.append(&record) {
                    tracing::warn!("Could not append to {}: {}", journal.path().display(), e);
                }
            }
        }
    }
}
