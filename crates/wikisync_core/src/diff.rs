//! Remote diff retrieval and the parsed form of MediaWiki diff tables.
//!
//! `action=compare` returns table rows (`<tr>…</tr>`) without the enclosing
//! `<table>`. Rows are reduced to [`DiffRow`] records so rendering never has
//! to patch the remote markup textually.

use anyhow::{Context, Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::client::WikiReadApi;
use crate::revisions::PriorRevision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Added,
    Deleted,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    /// Inside an inline `<ins>`/`<del>` change marker.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub kind: LineKind,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "row", rename_all = "snake_case")]
pub enum DiffRow {
    LineNumbers {
        old: String,
        new: String,
    },
    Lines {
        old: Option<DiffLine>,
        new: Option<DiffLine>,
    },
    /// Full-width remark such as "(3 intermediate revisions not shown)".
    Notice {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum PageDiff {
    /// No prior revision existed; there is nothing to compare against.
    NewPage,
    Compared(Vec<DiffRow>),
}

/// Diff plus the full text of the target revision.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub diff: PageDiff,
    pub content: String,
    pub timestamp: String,
    pub revision_id: i64,
}

/// Compare `prior` against `to_revision` and load the target revision's text.
///
/// `Ok(None)` means the content query returned no revision, so there is
/// nothing to persist.
pub fn fetch_diff_and_content<A: WikiReadApi>(
    api: &mut A,
    title: &str,
    prior: PriorRevision,
    to_revision: i64,
) -> Result<Option<PageSnapshot>> {
    let diff = match prior {
        PriorRevision::Existing(from_revision) => {
            let markup = api
                .compare_revisions(from_revision, to_revision)
                .with_context(|| {
                    format!("failed to compare {title} revisions {from_revision}..{to_revision}")
                })?;
            PageDiff::Compared(parse_diff_rows(&markup)?)
        }
        PriorRevision::NewPage => PageDiff::NewPage,
    };

    let content = api
        .revision_content(to_revision)
        .with_context(|| format!("failed to load content of {title} revision {to_revision}"))?;

    Ok(content.map(|content| PageSnapshot {
        diff,
        content: content.content,
        timestamp: content.timestamp,
        revision_id: content.revision_id,
    }))
}

pub fn parse_diff_rows(markup: &str) -> Result<Vec<DiffRow>> {
    let row_selector = selector("tr")?;
    let document = Html::parse_fragment(&format!("<table>{markup}</table>"));

    let mut rows = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| cell.value().name() == "td")
            .collect();
        if let Some(parsed) = parse_row(&cells) {
            rows.push(parsed);
        }
    }
    Ok(rows)
}

fn parse_row(cells: &[ElementRef]) -> Option<DiffRow> {
    let line_numbers: Vec<String> = cells
        .iter()
        .filter(|cell| has_class(cell, "diff-lineno"))
        .map(|cell| cell_text(cell))
        .collect();
    if !line_numbers.is_empty() {
        let mut numbers = line_numbers.into_iter();
        return Some(DiffRow::LineNumbers {
            old: numbers.next().unwrap_or_default(),
            new: numbers.next().unwrap_or_default(),
        });
    }

    if let Some(notice) = cells.iter().find(|cell| has_class(cell, "diff-multi")) {
        return Some(DiffRow::Notice {
            text: cell_text(notice),
        });
    }

    let mut sides: [Option<DiffLine>; 2] = [None, None];
    let mut side = 0;
    for cell in cells {
        if has_class(cell, "diff-marker") {
            continue;
        }
        let kind = if has_class(cell, "diff-addedline") {
            Some(LineKind::Added)
        } else if has_class(cell, "diff-deletedline") {
            Some(LineKind::Deleted)
        } else if has_class(cell, "diff-context") {
            Some(LineKind::Context)
        } else if has_class(cell, "diff-empty") {
            None
        } else {
            continue;
        };

        if side < sides.len() {
            sides[side] = kind.map(|kind| DiffLine {
                kind,
                segments: collect_segments(cell),
            });
        }
        side += 1;
    }

    let [old, new] = sides;
    if old.is_none() && new.is_none() {
        return None;
    }
    Some(DiffRow::Lines { old, new })
}

fn collect_segments(cell: &ElementRef) -> Vec<Segment> {
    let mut segments = Vec::new();
    push_segments(*cell, false, &mut segments);

    // Drop formatting whitespace between the cell and its `<div>`.
    while segments
        .first()
        .is_some_and(|segment| !segment.changed && segment.text.trim().is_empty())
    {
        segments.remove(0);
    }
    while segments
        .last()
        .is_some_and(|segment| !segment.changed && segment.text.trim().is_empty())
    {
        segments.pop();
    }
    segments
}

fn push_segments(element: ElementRef, changed: bool, out: &mut Vec<Segment>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            push_text(out, text, changed);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let child_changed = changed || matches!(child_element.value().name(), "ins" | "del");
            push_segments(child_element, child_changed, out);
        }
    }
}

fn push_text(out: &mut Vec<Segment>, text: &str, changed: bool) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = out.last_mut()
        && last.changed == changed
    {
        last.text.push_str(text);
        return;
    }
    out.push(Segment {
        text: text.to_string(),
        changed,
    });
}

fn has_class(cell: &ElementRef, class: &str) -> bool {
    cell.value().classes().any(|name| name == class)
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|error| anyhow!("invalid selector `{css}`: {error}"))
}
