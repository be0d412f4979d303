//! Durable "last synchronized" timestamp.
//!
//! The checkpoint is a single text file holding one UTC timestamp in the
//! MediaWiki format `YYYY-MM-DDTHH:MM:SSZ`. It only ever moves forward.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "timestamp", rename_all = "snake_case")]
pub enum CheckpointUpdate {
    Advanced(String),
    Unchanged(String),
}

impl CheckpointUpdate {
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Advanced(value) | Self::Unchanged(value) => value,
        }
    }
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read checkpoint {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let stored = normalize_timestamp(&content)
            .with_context(|| format!("invalid checkpoint in {}", self.path.display()))?;
        Ok(Some(stored))
    }

    pub fn save(&self, timestamp: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create checkpoint directory {}", parent.display())
            })?;
        }
        fs::write(&self.path, timestamp)
            .with_context(|| format!("failed to write checkpoint {}", self.path.display()))
    }

    /// Store `candidate` unless the stored checkpoint is already at or past it.
    pub fn advance(&self, candidate: &str) -> Result<CheckpointUpdate> {
        let candidate = normalize_timestamp(candidate)?;
        if let Some(current) = self.load()?
            && compare_timestamps(&candidate, &current)? != Ordering::Greater
        {
            return Ok(CheckpointUpdate::Unchanged(current));
        }
        self.save(&candidate)?;
        Ok(CheckpointUpdate::Advanced(candidate))
    }
}

/// Parse an RFC 3339 timestamp and render it in the wiki's UTC form.
pub fn normalize_timestamp(value: &str) -> Result<String> {
    parse_timestamp(value).map(format_timestamp)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("timestamp must not be empty");
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed).with_context(|| {
        format!("invalid timestamp `{trimmed}` (expected e.g. 2025-11-28T00:00:00Z)")
    })?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Starting point when no checkpoint has been stored yet.
pub fn default_since(now: DateTime<Utc>) -> String {
    format_timestamp(now - Duration::days(1))
}

/// Order two wiki timestamps by instant.
pub fn compare_timestamps(left: &str, right: &str) -> Result<Ordering> {
    Ok(parse_timestamp(left)?.cmp(&parse_timestamp(right)?))
}

pub fn later_timestamp<'a>(left: &'a str, right: &'a str) -> Result<&'a str> {
    Ok(if compare_timestamps(right, left)? == Ordering::Greater {
        right
    } else {
        left
    })
}

pub fn earlier_timestamp<'a>(left: &'a str, right: &'a str) -> Result<&'a str> {
    Ok(if compare_timestamps(right, left)? == Ordering::Less {
        right
    } else {
        left
    })
}

/// `--since` override, else the stored checkpoint, else 24 hours ago.
pub fn resolve_since(
    override_since: Option<&str>,
    store: &CheckpointStore,
    now: DateTime<Utc>,
) -> Result<String> {
    if let Some(value) = override_since {
        return normalize_timestamp(value);
    }
    Ok(store.load()?.unwrap_or_else(|| default_since(now)))
}
