use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::diff::PageDiff;
use crate::render::render_diff_document;

/// Everything persisted for one synchronized page.
#[derive(Debug, Clone)]
pub struct SyncArtifact {
    pub title: String,
    pub diff: PageDiff,
    pub full_text: String,
    pub timestamp: String,
    pub revision_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactPaths {
    pub diff_path: PathBuf,
    pub full_path: PathBuf,
}

/// Output state of one invocation.
///
/// The run directory `<output_root>/<run_name>` is only created when the
/// first artifact is written.
#[derive(Debug, Clone)]
pub struct RunSession {
    output_root: PathBuf,
    run_name: String,
    run_dir: Option<PathBuf>,
}

impl RunSession {
    pub fn new(output_root: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            run_name: run_name.into(),
            run_dir: None,
        }
    }

    /// Session named after the current local wall-clock time.
    pub fn starting_now(output_root: impl Into<PathBuf>) -> Self {
        Self::new(output_root, Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn planned_run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_name)
    }

    /// The run directory, if anything has been written yet.
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    pub fn write_artifact(&mut self, artifact: &SyncArtifact) -> Result<ArtifactPaths> {
        let run_dir = self.ensure_run_dir()?;
        let base_name =
            artifact_base_name(&artifact.title, &artifact.timestamp, artifact.revision_id);
        let diff_path = run_dir.join(format!("{base_name}.diff.html"));
        let full_path = run_dir.join(format!("{base_name}.full.txt"));

        let document = render_diff_document(&artifact.title, &artifact.timestamp, &artifact.diff);
        fs::write(&diff_path, document)
            .with_context(|| format!("failed to write {}", diff_path.display()))?;
        fs::write(&full_path, &artifact.full_text)
            .with_context(|| format!("failed to write {}", full_path.display()))?;

        info!(path = %diff_path.display(), "saved diff");
        info!(path = %full_path.display(), "saved full text");
        Ok(ArtifactPaths {
            diff_path,
            full_path,
        })
    }

    fn ensure_run_dir(&mut self) -> Result<PathBuf> {
        if let Some(run_dir) = &self.run_dir {
            return Ok(run_dir.clone());
        }
        let run_dir = self.planned_run_dir();
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;
        info!(path = %run_dir.display(), "created run directory");
        self.run_dir = Some(run_dir.clone());
        Ok(run_dir)
    }
}

/// `<sanitized title>-<YYYYMMDD_HHMMSS>[-<revision id>]`
pub fn artifact_base_name(title: &str, timestamp: &str, revision_id: Option<i64>) -> String {
    let safe_title = sanitize_title(title);
    let time = compact_timestamp(timestamp);
    match revision_id {
        Some(revision_id) => format!("{safe_title}-{time}-{revision_id}"),
        None => format!("{safe_title}-{time}"),
    }
}

/// Byte budget for the title part of a file name. Leaves room for
/// `-YYYYMMDD_HHMMSS-<revision id>.diff.html` under the common 255-byte limit.
pub const MAX_TITLE_BYTES: usize = 200;

/// Replace unsafe characters and cut to [`MAX_TITLE_BYTES`] on a char boundary.
pub fn sanitize_title(title: &str) -> String {
    let mut safe = String::new();
    for ch in title.chars() {
        let ch = if is_safe_char(ch) { ch } else { '_' };
        if safe.len() + ch.len_utf8() > MAX_TITLE_BYTES {
            break;
        }
        safe.push(ch);
    }
    safe
}

pub fn is_safe_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_' | '.')
}

/// `2025-01-02T03:04:05Z` -> `20250102_030405`
pub fn compact_timestamp(timestamp: &str) -> String {
    timestamp
        .chars()
        .take(19)
        .filter(|ch| !matches!(ch, '-' | ':'))
        .map(|ch| if ch == 'T' { '_' } else { ch })
        .collect()
}
