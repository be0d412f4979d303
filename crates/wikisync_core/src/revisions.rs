use anyhow::{Context, Result};

use crate::client::{RevisionRef, WikiReadApi};

/// The "from" side of a page diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorRevision {
    Existing(i64),
    /// No revision at or before the cutoff: the page was created later, or
    /// does not exist at all.
    NewPage,
}

/// Most recent revision of `title` at or before `cutoff`.
///
/// Remote failures stay errors; only a definite "nothing there" becomes
/// [`PriorRevision::NewPage`].
pub fn resolve_prior_revision<A: WikiReadApi>(
    api: &mut A,
    title: &str,
    cutoff: &str,
) -> Result<PriorRevision> {
    let revision = api
        .revision_at_or_before(title, cutoff)
        .with_context(|| format!("failed to resolve revision of {title} at {cutoff}"))?;
    Ok(match revision {
        Some(revision) => PriorRevision::Existing(revision.revision_id),
        None => PriorRevision::NewPage,
    })
}

/// Current head revision of `title`, or `None` when the page does not exist.
pub fn resolve_latest_revision<A: WikiReadApi>(
    api: &mut A,
    title: &str,
) -> Result<Option<RevisionRef>> {
    api.latest_revision(title)
        .with_context(|| format!("failed to resolve latest revision of {title}"))
}
