use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::changes::list_changed_pages;
use crate::checkpoint::{
    CheckpointStore, CheckpointUpdate, earlier_timestamp, later_timestamp, normalize_timestamp,
    resolve_since,
};
use crate::client::{MediaWikiClient, MediaWikiClientConfig, WikiReadApi};
use crate::config::{ConfigOverrides, WikiSyncConfig};
use crate::diff::fetch_diff_and_content;
use crate::output::{RunSession, SyncArtifact};
use crate::revisions::{PriorRevision, resolve_latest_revision, resolve_prior_revision};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Starting point instead of the stored checkpoint.
    pub since: Option<String>,
    /// Only synchronize this page.
    pub title: Option<String>,
    /// In single-page mode, advance the checkpoint to the page's timestamp.
    pub update_checkpoint: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    SinglePage,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::SinglePage => "single_page",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageAction {
    /// Written with a real diff against the prior revision.
    Updated,
    /// Written with the new-page marker.
    Created,
    /// The page does not exist on the wiki.
    Missing,
    FetchFailed,
    WriteFailed,
}

impl PageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Created => "created",
            Self::Missing => "missing",
            Self::FetchFailed => "fetch_failed",
            Self::WriteFailed => "write_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub title: String,
    pub action: PageAction,
    pub revision_id: Option<i64>,
    /// Timestamp of the page's latest revision.
    pub timestamp: Option<String>,
    pub detail: Option<String>,
    pub diff_path: Option<PathBuf>,
    pub full_path: Option<PathBuf>,
}

impl PageResult {
    fn new(title: &str, action: PageAction) -> Self {
        Self {
            title: title.to_string(),
            action,
            revision_id: None,
            timestamp: None,
            detail: None,
            diff_path: None,
            full_path: None,
        }
    }

    fn failed(title: &str, action: PageAction, error: &anyhow::Error) -> Self {
        let detail = format!("{error:#}");
        warn!(title, error = %detail, "page not synchronized");
        Self {
            detail: Some(detail),
            ..Self::new(title, action)
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.action, PageAction::Updated | PageAction::Created)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub mode: SyncMode,
    pub since: String,
    pub pages_listed: usize,
    /// `false` when the change listing was cut short by a remote failure.
    pub listing_complete: bool,
    pub synced: usize,
    pub created: usize,
    pub updated: usize,
    pub missing: usize,
    pub failed: usize,
    pub pages: Vec<PageResult>,
    /// `None` when the checkpoint file was not touched.
    pub checkpoint: Option<CheckpointUpdate>,
    pub run_dir: Option<PathBuf>,
    pub request_count: usize,
}

impl SyncReport {
    fn new(mode: SyncMode, since: &str) -> Self {
        Self {
            success: true,
            mode,
            since: since.to_string(),
            pages_listed: 0,
            listing_complete: true,
            synced: 0,
            created: 0,
            updated: 0,
            missing: 0,
            failed: 0,
            pages: Vec::new(),
            checkpoint: None,
            run_dir: None,
            request_count: 0,
        }
    }

    fn record(&mut self, page: PageResult) {
        match page.action {
            PageAction::Updated => self.updated += 1,
            PageAction::Created => self.created += 1,
            PageAction::Missing => self.missing += 1,
            PageAction::FetchFailed | PageAction::WriteFailed => self.failed += 1,
        }
        if page.is_synced() {
            self.synced += 1;
        }
        self.pages.push(page);
    }
}

/// Build the HTTP client, checkpoint store and run session from configuration
/// and run one synchronization.
pub fn run_sync(
    config: &WikiSyncConfig,
    overrides: &ConfigOverrides,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let store = CheckpointStore::new(config.checkpoint_file(overrides));
    let since = resolve_since(options.since.as_deref(), &store, Utc::now())?;
    let mut client = MediaWikiClient::new(MediaWikiClientConfig::from_config(config)?)?;
    let mut session = RunSession::starting_now(config.output_dir(overrides));
    run_sync_with_api(&mut client, &store, &mut session, &since, options)
}

pub fn run_sync_with_api<A: WikiReadApi>(
    api: &mut A,
    store: &CheckpointStore,
    session: &mut RunSession,
    since: &str,
    options: &SyncOptions,
) -> Result<SyncReport> {
    info!(since, checkpoint = %store.path().display(), "starting synchronization");
    let mut report = match options.title.as_deref().map(str::trim) {
        Some("") => bail!("page title must not be empty"),
        Some(title) => sync_single_page(api, store, session, title, since, options)?,
        None => sync_all_pages(api, store, session, since)?,
    };
    report.run_dir = session.run_dir().map(PathBuf::from);
    report.request_count = api.request_count();
    report.success = report.failed == 0 && report.listing_complete;
    Ok(report)
}

fn sync_single_page<A: WikiReadApi>(
    api: &mut A,
    store: &CheckpointStore,
    session: &mut RunSession,
    title: &str,
    since: &str,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let mut report = SyncReport::new(SyncMode::SinglePage, since);
    report.pages_listed = 1;

    let page = sync_page(api, session, title, since);
    if options.update_checkpoint {
        match (&page.timestamp, page.is_synced()) {
            (Some(timestamp), true) => {
                let update = store.advance(timestamp)?;
                info!(checkpoint = update.timestamp(), "checkpoint after single-page sync");
                report.checkpoint = Some(update);
            }
            _ => warn!(title, "page was not synchronized; checkpoint left unchanged"),
        }
    }
    report.record(page);
    Ok(report)
}

fn sync_all_pages<A: WikiReadApi>(
    api: &mut A,
    store: &CheckpointStore,
    session: &mut RunSession,
    since: &str,
) -> Result<SyncReport> {
    let mut report = SyncReport::new(SyncMode::Full, since);
    let listing = list_changed_pages(api, since);
    report.pages_listed = listing.changes.len();
    report.listing_complete = listing.complete;
    if listing.changes.is_empty() {
        info!(since, complete = listing.complete, "no changes found");
        return Ok(report);
    }
    info!(
        pages = listing.changes.len(),
        complete = listing.complete,
        "changed pages listed"
    );

    let mut newest = since.to_string();
    for (title, change) in &listing.changes {
        debug!(
            title,
            listed_revision = change.revision_id,
            listed_at = %change.timestamp,
            "syncing listed change"
        );
        let page = sync_page(api, session, title, since);
        if page.is_synced()
            && let Some(timestamp) = &page.timestamp
        {
            newest = later_timestamp(&newest, timestamp)?.to_string();
        }
        report.record(page);
    }

    // Changes after the last listed one were never seen; the next run must
    // list them again.
    if !listing.complete
        && let Some(seen) = &listing.newest_seen
    {
        newest = earlier_timestamp(&newest, seen)?.to_string();
        warn!(checkpoint = %newest, "change listing incomplete; checkpoint capped");
    }

    let update = store.advance(&newest)?;
    info!(
        checkpoint = update.timestamp(),
        synced = report.synced,
        failed = report.failed,
        "full synchronization finished"
    );
    report.checkpoint = Some(update);
    Ok(report)
}

/// Resolve, fetch and persist one page. Never fails the batch: every outcome
/// is captured in the returned [`PageResult`].
fn sync_page<A: WikiReadApi>(
    api: &mut A,
    session: &mut RunSession,
    title: &str,
    since: &str,
) -> PageResult {
    info!(title, "processing page");

    let latest = match resolve_latest_revision(api, title) {
        Ok(Some(latest)) => latest,
        Ok(None) => {
            warn!(title, "page does not exist or was deleted");
            return PageResult::new(title, PageAction::Missing);
        }
        Err(error) => return PageResult::failed(title, PageAction::FetchFailed, &error),
    };

    let latest_timestamp = match normalize_timestamp(&latest.timestamp) {
        Ok(timestamp) => timestamp,
        Err(error) => return PageResult::failed(title, PageAction::FetchFailed, &error),
    };

    let prior = match resolve_prior_revision(api, title, since) {
        Ok(prior) => prior,
        Err(error) => return PageResult::failed(title, PageAction::FetchFailed, &error),
    };
    if prior == PriorRevision::NewPage {
        info!(title, since, "no revision before cutoff; treating as new page");
    }

    let snapshot = match fetch_diff_and_content(api, title, prior, latest.revision_id) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            let error = anyhow::anyhow!("no content returned for revision {}", latest.revision_id);
            return PageResult::failed(title, PageAction::FetchFailed, &error);
        }
        Err(error) => return PageResult::failed(title, PageAction::FetchFailed, &error),
    };

    let artifact = SyncArtifact {
        title: title.to_string(),
        diff: snapshot.diff,
        full_text: snapshot.content,
        timestamp: snapshot.timestamp,
        revision_id: Some(snapshot.revision_id),
    };
    let action = match prior {
        PriorRevision::Existing(_) => PageAction::Updated,
        PriorRevision::NewPage => PageAction::Created,
    };

    match session.write_artifact(&artifact) {
        Ok(paths) => PageResult {
            revision_id: Some(latest.revision_id),
            timestamp: Some(latest_timestamp),
            diff_path: Some(paths.diff_path),
            full_path: Some(paths.full_path),
            ..PageResult::new(title, action)
        },
        Err(error) => PageResult {
            revision_id: Some(latest.revision_id),
            timestamp: Some(latest_timestamp),
            ..PageResult::failed(title, PageAction::WriteFailed, &error)
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, VecDeque};
    use std::fs;
    use std::path::Path;

    use anyhow::{Result, bail};
    use tempfile::tempdir;

    use super::{PageAction, SyncMode, SyncOptions, run_sync_with_api};
    use crate::checkpoint::{CheckpointStore, CheckpointUpdate};
    use crate::client::{
        RecentChange, RecentChangesPage, RevisionContent, RevisionRef, WikiReadApi,
    };
    use crate::output::RunSession;
    use crate::render::NEW_PAGE_MARKER;

    const START: &str = "2025-01-01T00:00:00Z";

    const COMPARE_90_100: &str = concat!(
        "<tr><td class=\"diff-marker\" data-marker=\"−\"></td>",
        "<td class=\"diff-deletedline\"><div>alpha <del class=\"diffchange\">old</del></div></td>",
        "<td class=\"diff-marker\" data-marker=\"+\"></td>",
        "<td class=\"diff-addedline\"><div>alpha <ins class=\"diffchange\">new</ins></div></td></tr>"
    );

    #[derive(Default)]
    struct MockApi {
        recent_changes: Vec<RecentChange>,
        /// Scripted listing batches; when empty, `recent_changes` is served whole.
        batches: VecDeque<Result<RecentChangesPage>>,
        fail_listing: bool,
        latest: BTreeMap<String, RevisionRef>,
        prior: BTreeMap<String, i64>,
        compare_bodies: BTreeMap<(i64, i64), String>,
        contents: BTreeMap<i64, RevisionContent>,
        failing_titles: BTreeSet<String>,
        request_count: usize,
    }

    impl MockApi {
        fn with_page(mut self, title: &str, revision_id: i64, timestamp: &str) -> Self {
            self.recent_changes.push(RecentChange {
                title: title.to_string(),
                revision_id,
                timestamp: timestamp.to_string(),
            });
            self.latest.insert(
                title.to_string(),
                RevisionRef {
                    revision_id,
                    timestamp: timestamp.to_string(),
                },
            );
            self.contents.insert(
                revision_id,
                RevisionContent {
                    revision_id,
                    timestamp: timestamp.to_string(),
                    content: format!("{title} full text"),
                },
            );
            self
        }

        fn with_prior(mut self, title: &str, revision_id: i64) -> Self {
            self.prior.insert(title.to_string(), revision_id);
            self
        }
    }

    impl WikiReadApi for MockApi {
        fn recent_changes_page(
            &mut self,
            _since: &str,
            _continuation: Option<&str>,
        ) -> Result<RecentChangesPage> {
            self.request_count += 1;
            if self.fail_listing {
                bail!("MediaWiki API request failed with HTTP 502 Bad Gateway");
            }
            if let Some(batch) = self.batches.pop_front() {
                return batch;
            }
            Ok(RecentChangesPage {
                changes: self.recent_changes.clone(),
                continuation: None,
            })
        }

        fn latest_revision(&mut self, title: &str) -> Result<Option<RevisionRef>> {
            self.request_count += 1;
            if self.failing_titles.contains(title) {
                bail!("failed to call MediaWiki API: connection reset");
            }
            Ok(self.latest.get(title).cloned())
        }

        fn revision_at_or_before(
            &mut self,
            title: &str,
            _cutoff: &str,
        ) -> Result<Option<RevisionRef>> {
            self.request_count += 1;
            Ok(self.prior.get(title).map(|revision_id| RevisionRef {
                revision_id: *revision_id,
                timestamp: START.to_string(),
            }))
        }

        fn compare_revisions(&mut self, from: i64, to: i64) -> Result<String> {
            self.request_count += 1;
            match self.compare_bodies.get(&(from, to)) {
                Some(body) => Ok(body.clone()),
                None => bail!("MediaWiki API error [nosuchrevid]: no revision {from}"),
            }
        }

        fn revision_content(&mut self, revision_id: i64) -> Result<Option<RevisionContent>> {
            self.request_count += 1;
            Ok(self.contents.get(&revision_id).cloned())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        store: CheckpointStore,
        session: RunSession,
        output_root: std::path::PathBuf,
    }

    fn fixture(initial_checkpoint: Option<&str>) -> Fixture {
        let temp = tempdir().expect("tempdir");
        let checkpoint_path = temp.path().join("last_sync_timestamp.txt");
        if let Some(value) = initial_checkpoint {
            fs::write(&checkpoint_path, value).expect("seed checkpoint");
        }
        let output_root = temp.path().join("wiki_sync_output");
        Fixture {
            store: CheckpointStore::new(checkpoint_path),
            session: RunSession::new(&output_root, "20250103_090000"),
            output_root,
            _temp: temp,
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }

    #[test]
    fn new_page_gets_placeholder_and_advances_checkpoint() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi::default().with_page("Alpha", 100, "2025-01-02T00:00:00Z");

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert!(report.success);
        assert_eq!(report.mode, SyncMode::Full);
        assert_eq!(report.created, 1);
        assert_eq!(report.pages[0].action, PageAction::Created);
        let diff_path = report.pages[0].diff_path.clone().expect("diff path");
        assert_eq!(
            diff_path,
            fx.output_root
                .join("20250103_090000")
                .join("Alpha-20250102_000000-100.diff.html")
        );
        assert!(read(&diff_path).contains(NEW_PAGE_MARKER));
        let full_path = report.pages[0].full_path.clone().expect("full path");
        assert_eq!(read(&full_path), "Alpha full text");
        assert_eq!(read(fx.store.path()), "2025-01-02T00:00:00Z");
        assert_eq!(
            report.checkpoint,
            Some(CheckpointUpdate::Advanced("2025-01-02T00:00:00Z".to_string()))
        );
    }

    #[test]
    fn existing_prior_revision_uses_real_compare() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi::default()
            .with_page("Alpha", 100, "2025-01-02T00:00:00Z")
            .with_prior("Alpha", 90);
        api.compare_bodies
            .insert((90, 100), COMPARE_90_100.to_string());

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert_eq!(report.updated, 1);
        assert_eq!(report.pages[0].action, PageAction::Updated);
        let html = read(&report.pages[0].diff_path.clone().expect("diff path"));
        assert!(!html.contains(NEW_PAGE_MARKER));
        assert!(html.contains("<span class=\"diffchange added\">new</span>"));
        assert!(html.contains("<span class=\"diffchange deleted\">old</span>"));
        assert_eq!(read(fx.store.path()), "2025-01-02T00:00:00Z");
    }

    #[test]
    fn failed_listing_processes_nothing_and_keeps_checkpoint() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi {
            fail_listing: true,
            ..MockApi::default()
        };

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync completes");

        assert_eq!(report.pages_listed, 0);
        assert!(!report.listing_complete);
        assert!(!report.success);
        assert!(report.pages.is_empty());
        assert!(report.checkpoint.is_none());
        assert!(report.run_dir.is_none());
        assert!(!fx.output_root.exists());
        assert_eq!(read(fx.store.path()), START);
    }

    #[test]
    fn truncated_listing_caps_checkpoint_at_last_listed_change() {
        let mut fx = fixture(Some(START));
        // Alpha was edited again after the listing window closed.
        let mut api = MockApi::default().with_page("Alpha", 200, "2025-01-01T05:00:00Z");
        api.batches.push_back(Ok(RecentChangesPage {
            changes: vec![RecentChange {
                title: "Alpha".to_string(),
                revision_id: 100,
                timestamp: "2025-01-01T01:00:00Z".to_string(),
            }],
            continuation: Some("20250101010000|101".to_string()),
        }));
        // The second batch would have carried Beta at 03:00.
        api.batches.push_back(Err(anyhow::anyhow!(
            "MediaWiki API request failed with HTTP 502 Bad Gateway"
        )));

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert!(!report.listing_complete);
        assert!(!report.success);
        assert_eq!(report.failed, 0);
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.pages[0].action, PageAction::Created);
        assert_eq!(report.pages[0].revision_id, Some(200));
        assert_eq!(
            report.checkpoint,
            Some(CheckpointUpdate::Advanced("2025-01-01T01:00:00Z".to_string()))
        );
        assert_eq!(read(fx.store.path()), "2025-01-01T01:00:00Z");
    }

    #[test]
    fn complete_listing_advances_to_latest_revision() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi::default().with_page("Alpha", 200, "2025-01-01T05:00:00Z");
        api.batches.push_back(Ok(RecentChangesPage {
            changes: vec![RecentChange {
                title: "Alpha".to_string(),
                revision_id: 100,
                timestamp: "2025-01-01T01:00:00Z".to_string(),
            }],
            continuation: None,
        }));

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert!(report.listing_complete);
        assert!(report.success);
        assert_eq!(read(fx.store.path()), "2025-01-01T05:00:00Z");
    }

    #[test]
    fn checkpoint_is_max_of_successful_pages() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi::default()
            .with_page("Alpha", 100, "2025-01-02T00:00:00Z")
            .with_page("Beta", 101, "2025-01-04T00:00:00Z")
            .with_page("Gamma", 102, "2025-01-03T00:00:00Z");
        api.failing_titles.insert("Beta".to_string());

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert!(!report.success);
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 1);
        let beta = report
            .pages
            .iter()
            .find(|page| page.title == "Beta")
            .expect("beta result");
        assert_eq!(beta.action, PageAction::FetchFailed);
        assert!(beta.detail.as_deref().unwrap_or_default().contains("connection reset"));
        assert_eq!(read(fx.store.path()), "2025-01-03T00:00:00Z");
    }

    #[test]
    fn all_pages_failing_never_regresses_checkpoint() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi::default()
            .with_page("Alpha", 100, "2025-01-02T00:00:00Z")
            .with_page("Beta", 101, "2025-01-04T00:00:00Z");
        api.failing_titles.insert("Alpha".to_string());
        api.failing_titles.insert("Beta".to_string());

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert_eq!(report.failed, 2);
        assert_eq!(
            report.checkpoint,
            Some(CheckpointUpdate::Unchanged(START.to_string()))
        );
        assert_eq!(read(fx.store.path()), START);
    }

    #[test]
    fn compare_failure_skips_page_without_advancing() {
        let mut fx = fixture(None);
        let mut api = MockApi::default()
            .with_page("Alpha", 100, "2025-01-02T00:00:00Z")
            .with_prior("Alpha", 90);

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert_eq!(report.pages[0].action, PageAction::FetchFailed);
        assert!(report.pages[0].diff_path.is_none());
        assert_eq!(read(fx.store.path()), START);
    }

    #[test]
    fn write_failure_is_logged_and_batch_continues() {
        let temp = tempdir().expect("tempdir");
        let blocker = temp.path().join("output-is-a-file");
        fs::write(&blocker, "not a directory").expect("write blocker");
        let store = CheckpointStore::new(temp.path().join("checkpoint.txt"));
        let mut session = RunSession::new(&blocker, "run");
        let mut api = MockApi::default()
            .with_page("Alpha", 100, "2025-01-02T00:00:00Z")
            .with_page("Beta", 101, "2025-01-03T00:00:00Z");

        let report = run_sync_with_api(
            &mut api,
            &store,
            &mut session,
            START,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert_eq!(report.pages.len(), 2);
        assert!(
            report
                .pages
                .iter()
                .all(|page| page.action == PageAction::WriteFailed)
        );
        assert_eq!(store.load().expect("load").as_deref(), Some(START));
    }

    #[test]
    fn single_page_without_flag_leaves_checkpoint_untouched() {
        let mut fx = fixture(Some("2024-12-31T00:00:00Z\n"));
        let before = fs::read(fx.store.path()).expect("read before");
        let mut api = MockApi::default().with_page("Alpha", 100, "2025-01-02T00:00:00Z");

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions {
                title: Some("  Alpha ".to_string()),
                ..SyncOptions::default()
            },
        )
        .expect("sync");

        assert_eq!(report.mode, SyncMode::SinglePage);
        assert_eq!(report.pages[0].title, "Alpha");
        assert_eq!(report.pages[0].action, PageAction::Created);
        assert!(report.checkpoint.is_none());
        assert_eq!(fs::read(fx.store.path()).expect("read after"), before);
        // Single-page runs never list recent changes.
        assert_eq!(api.request_count, 3);
    }

    #[test]
    fn single_page_with_flag_advances_but_never_regresses() {
        let mut fx = fixture(Some("2025-01-05T00:00:00Z"));
        let mut api = MockApi::default()
            .with_page("Alpha", 100, "2025-01-02T00:00:00Z")
            .with_page("Beta", 200, "2025-01-06T00:00:00Z");
        let options = |title: &str| SyncOptions {
            title: Some(title.to_string()),
            update_checkpoint: true,
            ..SyncOptions::default()
        };

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &options("Alpha"),
        )
        .expect("sync alpha");
        assert_eq!(
            report.checkpoint,
            Some(CheckpointUpdate::Unchanged("2025-01-05T00:00:00Z".to_string()))
        );
        assert_eq!(read(fx.store.path()), "2025-01-05T00:00:00Z");

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &options("Beta"),
        )
        .expect("sync beta");
        assert_eq!(
            report.checkpoint,
            Some(CheckpointUpdate::Advanced("2025-01-06T00:00:00Z".to_string()))
        );
        assert_eq!(read(fx.store.path()), "2025-01-06T00:00:00Z");
    }

    #[test]
    fn single_missing_page_is_reported_without_side_effects() {
        let mut fx = fixture(Some(START));
        let mut api = MockApi::default();

        let report = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions {
                title: Some("Ghost".to_string()),
                update_checkpoint: true,
                ..SyncOptions::default()
            },
        )
        .expect("sync");

        assert_eq!(report.missing, 1);
        assert_eq!(report.pages[0].action, PageAction::Missing);
        assert!(report.checkpoint.is_none());
        assert!(report.success);
        assert!(!fx.output_root.exists());
        assert_eq!(read(fx.store.path()), START);
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut fx = fixture(None);
        let mut api = MockApi::default();
        let error = run_sync_with_api(
            &mut api,
            &fx.store,
            &mut fx.session,
            START,
            &SyncOptions {
                title: Some("   ".to_string()),
                ..SyncOptions::default()
            },
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("must not be empty"));
        assert_eq!(api.request_count, 0);
    }
}
