use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WikiSyncConfig;

/// One `list=recentchanges` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentChange {
    pub title: String,
    pub revision_id: i64,
    pub timestamp: String,
}

/// One batch of recent changes plus the token for the next batch, if any.
#[derive(Debug, Clone, Default)]
pub struct RecentChangesPage {
    pub changes: Vec<RecentChange>,
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRef {
    pub revision_id: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct RevisionContent {
    pub revision_id: i64,
    pub timestamp: String,
    pub content: String,
}

/// Read-only view of the remote wiki used by the synchronizer.
///
/// `Ok(None)` means the remote answered and the thing asked for does not exist;
/// `Err` means the call itself failed.
pub trait WikiReadApi {
    fn recent_changes_page(
        &mut self,
        since: &str,
        continuation: Option<&str>,
    ) -> Result<RecentChangesPage>;
    fn latest_revision(&mut self, title: &str) -> Result<Option<RevisionRef>>;
    fn revision_at_or_before(&mut self, title: &str, cutoff: &str) -> Result<Option<RevisionRef>>;
    fn compare_revisions(&mut self, from_revision: i64, to_revision: i64) -> Result<String>;
    fn revision_content(&mut self, revision_id: i64) -> Result<Option<RevisionContent>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &WikiSyncConfig) -> Result<Self> {
        let http = config.http_settings();
        Ok(Self {
            api_url: config.require_api_url()?,
            user_agent: config.user_agent(),
            timeout_ms: http.timeout_ms,
            rate_limit_read_ms: http.rate_limit_ms,
            max_retries: http.max_retries,
            retry_delay_ms: http.retry_delay_ms,
        })
    }
}

/// Repetition of requests that failed for transient reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Pause before retrying after failed attempt number `attempt` (0-based),
    /// doubling each time; `None` once the retry budget is spent.
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|exponent| 2u32.checked_pow(exponent))
            .unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

/// Outcome of one HTTP round trip that did not fail for good.
enum Attempt {
    Done(Value),
    Transient(anyhow::Error),
}

pub struct MediaWikiClient {
    client: Client,
    api_url: Url,
    min_interval: Duration,
    retry: RetryPolicy,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid wiki API URL: {}", config.api_url))?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            api_url,
            min_interval: Duration::from_millis(config.rate_limit_read_ms),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_delay_ms),
            },
            last_request_at: None,
            request_count: 0,
        })
    }

    fn request_json(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let mut pairs = vec![
            ("format".to_string(), "json".to_string()),
            ("formatversion".to_string(), "2".to_string()),
        ];
        pairs.extend(
            params
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| ((*key).to_string(), value.clone())),
        );
        debug!(?pairs, "MediaWiki API request");

        let mut attempt = 0;
        loop {
            let error = match self.send_once(&pairs)? {
                Attempt::Done(payload) => return Ok(payload),
                Attempt::Transient(error) => error,
            };
            let Some(delay) = self.retry.delay_after(attempt) else {
                return Err(error);
            };
            warn!(
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %format!("{error:#}"),
                "retrying MediaWiki API request"
            );
            sleep(delay);
            attempt += 1;
        }
    }

    /// One throttled request. Timeouts, connection failures, 429 and 5xx are
    /// transient; everything else fails immediately.
    fn send_once(&mut self, pairs: &[(String, String)]) -> Result<Attempt> {
        self.throttle();
        let response = match self.client.get(self.api_url.clone()).query(pairs).send() {
            Ok(response) => response,
            Err(error) if error.is_timeout() || error.is_connect() => {
                return Ok(Attempt::Transient(
                    anyhow::Error::new(error).context("failed to call MediaWiki API"),
                ));
            }
            Err(error) => return Err(error).context("failed to call MediaWiki API"),
        };

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::Transient(anyhow!(
                "MediaWiki API request failed with HTTP {status}"
            )));
        }
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}");
        }

        let payload: Value = response
            .json()
            .context("failed to decode MediaWiki API JSON response")?;
        check_api_error(&payload)?;
        Ok(Attempt::Done(payload))
    }

    fn throttle(&mut self) {
        if let Some(last) = self.last_request_at {
            let remaining = self.min_interval.saturating_sub(last.elapsed());
            if !remaining.is_zero() {
                sleep(remaining);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn query_single_revision(
        &mut self,
        params: Vec<(&str, String)>,
        what: &str,
    ) -> Result<Option<RevisionRef>> {
        let response = self.request_json(&params)?;
        let parsed: QueryResponse = serde_json::from_value(response)
            .with_context(|| format!("failed to decode {what} API response"))?;
        Ok(first_revision(parsed).map(|revision| RevisionRef {
            revision_id: revision.revid,
            timestamp: revision.timestamp,
        }))
    }
}

impl WikiReadApi for MediaWikiClient {
    fn recent_changes_page(
        &mut self,
        since: &str,
        continuation: Option<&str>,
    ) -> Result<RecentChangesPage> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("list", "recentchanges".to_string()),
            ("rcstart", since.to_string()),
            ("rcdir", "newer".to_string()),
            ("rcprop", "title|ids|timestamp".to_string()),
            ("rclimit", "500".to_string()),
            ("rctype", "edit|new".to_string()),
        ];
        if let Some(token) = continuation {
            params.push(("rccontinue", token.to_string()));
        }

        let response = self.request_json(&params)?;
        let parsed: QueryResponse = serde_json::from_value(response)
            .context("failed to decode recentchanges API response")?;

        Ok(RecentChangesPage {
            changes: parsed
                .query
                .recentchanges
                .into_iter()
                .map(|item| RecentChange {
                    title: item.title,
                    revision_id: item.revid,
                    timestamp: item.timestamp,
                })
                .collect(),
            continuation: parsed.continuation.and_then(|cont| cont.rccontinue),
        })
    }

    fn latest_revision(&mut self, title: &str) -> Result<Option<RevisionRef>> {
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("titles", title.to_string()),
            ("rvprop", "ids|timestamp".to_string()),
            ("rvlimit", "1".to_string()),
        ];
        self.query_single_revision(params, "latest revision")
    }

    fn revision_at_or_before(&mut self, title: &str, cutoff: &str) -> Result<Option<RevisionRef>> {
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("titles", title.to_string()),
            ("rvprop", "ids|timestamp".to_string()),
            ("rvlimit", "1".to_string()),
            ("rvdir", "older".to_string()),
            ("rvstart", cutoff.to_string()),
        ];
        self.query_single_revision(params, "prior revision")
    }

    fn compare_revisions(&mut self, from_revision: i64, to_revision: i64) -> Result<String> {
        let params = vec![
            ("action", "compare".to_string()),
            ("fromrev", from_revision.to_string()),
            ("torev", to_revision.to_string()),
        ];
        let response = self.request_json(&params)?;
        let parsed: CompareResponse =
            serde_json::from_value(response).context("failed to decode compare API response")?;
        match parsed.compare.and_then(|compare| compare.body) {
            Some(body) => Ok(body),
            None => bail!("compare response for {from_revision}..{to_revision} has no diff body"),
        }
    }

    fn revision_content(&mut self, revision_id: i64) -> Result<Option<RevisionContent>> {
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("revids", revision_id.to_string()),
            ("rvprop", "content|timestamp|ids".to_string()),
            ("rvslots", "main".to_string()),
        ];
        let response = self.request_json(&params)?;
        let parsed: QueryResponse = serde_json::from_value(response)
            .context("failed to decode page content API response")?;

        let Some(revision) = first_revision(parsed) else {
            return Ok(None);
        };
        let content = match revision.slots.and_then(|slots| slots.main) {
            Some(slot) => slot.content,
            None => return Ok(None),
        };
        Ok(Some(RevisionContent {
            revision_id: revision.revid,
            timestamp: revision.timestamp,
            content,
        }))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn check_api_error(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(())
}

fn first_revision(parsed: QueryResponse) -> Option<RevisionQueryItem> {
    let page = parsed.query.pages.into_iter().next()?;
    if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
        return None;
    }
    page.revisions.into_iter().next()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    recentchanges: Vec<RecentChangeItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    rccontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentChangeItem {
    title: String,
    revid: i64,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct CompareResponse {
    compare: Option<ComparePayload>,
}

#[derive(Debug, Deserialize)]
struct ComparePayload {
    #[serde(alias = "*")]
    body: Option<String>,
}
