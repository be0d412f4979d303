use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::client::WikiReadApi;

/// Newest change seen for one page inside the listing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub revision_id: i64,
    pub timestamp: String,
}

/// Page title -> newest change, one entry per page.
pub type ChangeSet = BTreeMap<String, ChangeRecord>;

#[derive(Debug, Clone, Default)]
pub struct ChangeListing {
    pub changes: ChangeSet,
    /// `false` when a listing call failed before the last batch arrived.
    pub complete: bool,
    /// Timestamp of the last change received. Changes after it may be
    /// missing when the listing is incomplete.
    pub newest_seen: Option<String>,
}

/// Every page changed since `since`, reduced to its latest revision.
///
/// A failing listing call is logged and ends the listing with whatever was
/// collected before it; the result is then marked incomplete.
pub fn list_changed_pages<A: WikiReadApi>(api: &mut A, since: &str) -> ChangeListing {
    let mut latest = ChangeSet::new();
    let mut newest_seen: Option<String> = None;
    let mut continuation: Option<String> = None;

    loop {
        let page = match api.recent_changes_page(since, continuation.as_deref()) {
            Ok(page) => page,
            Err(error) => {
                warn!(
                    since,
                    collected = latest.len(),
                    error = %format!("{error:#}"),
                    "failed to list recent changes"
                );
                return ChangeListing {
                    changes: latest,
                    complete: false,
                    newest_seen,
                };
            }
        };
        debug!(count = page.changes.len(), "received recent changes batch");
        // The stream is ascending, so later entries replace earlier ones.
        for change in page.changes {
            newest_seen = Some(change.timestamp.clone());
            latest.insert(
                change.title,
                ChangeRecord {
                    revision_id: change.revision_id,
                    timestamp: change.timestamp,
                },
            );
        }

        continuation = page.continuation;
        if continuation.is_none() {
            break;
        }
    }

    ChangeListing {
        changes: latest,
        complete: true,
        newest_seen,
    }
}
