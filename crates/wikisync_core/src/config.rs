use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = "wikisync.toml";
pub const DEFAULT_USER_AGENT: &str = "wikisync/0.1 (MediaWiki sync client)";
pub const DEFAULT_OUTPUT_DIR: &str = "wiki_sync_output";
pub const DEFAULT_CHECKPOINT_FILE: &str = "last_sync_timestamp.txt";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 300;
pub const DEFAULT_MAX_RETRIES: usize = 0;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSyncConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncSection {
    pub output_dir: Option<PathBuf>,
    pub checkpoint_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub timeout_ms: Option<u64>,
    pub rate_limit_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

/// HTTP client settings after env > `[http]` > default resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl HttpSection {
    pub fn resolve(&self, lookup: impl Fn(&str) -> Option<String>) -> HttpSettings {
        HttpSettings {
            timeout_ms: parse_setting(lookup("WIKI_HTTP_TIMEOUT_MS"))
                .or(self.timeout_ms)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
            rate_limit_ms: parse_setting(lookup("WIKI_RATE_LIMIT_READ"))
                .or(self.rate_limit_ms)
                .unwrap_or(DEFAULT_RATE_LIMIT_MS),
            max_retries: parse_setting(lookup("WIKI_HTTP_RETRIES"))
                .or(self.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay_ms: parse_setting(lookup("WIKI_HTTP_RETRY_DELAY_MS"))
                .or(self.retry_delay_ms)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Command-line values that take precedence over env and the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<PathBuf>,
    pub checkpoint_file: Option<PathBuf>,
}

impl WikiSyncConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url(&self) -> Option<String> {
        env_string("WIKI_API_URL").or_else(|| {
            self.wiki
                .api_url
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_string("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn output_dir(&self, overrides: &ConfigOverrides) -> PathBuf {
        overrides
            .output_dir
            .clone()
            .or_else(|| env_string("WIKISYNC_OUTPUT_DIR").map(PathBuf::from))
            .or_else(|| self.sync.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    pub fn checkpoint_file(&self, overrides: &ConfigOverrides) -> PathBuf {
        overrides
            .checkpoint_file
            .clone()
            .or_else(|| env_string("WIKISYNC_CHECKPOINT_FILE").map(PathBuf::from))
            .or_else(|| self.sync.checkpoint_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_FILE))
    }

    /// Effective HTTP settings from the process environment and `[http]`.
    pub fn http_settings(&self) -> HttpSettings {
        self.http.resolve(|key| env::var(key).ok())
    }

    /// Like [`Self::api_url`], but fails with setup guidance when unset.
    pub fn require_api_url(&self) -> Result<String> {
        match self.api_url() {
            Some(url) => Ok(url),
            None => bail!(
                "wiki API URL is not configured.\nSet WIKI_API_URL (environment or .env) or `api_url` under [wiki] in {DEFAULT_CONFIG_FILENAME}"
            ),
        }
    }
}

/// Load and parse a WikiSyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiSyncConfig> {
    if !config_path.exists() {
        return Ok(WikiSyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiSyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_setting<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_no_api_url() {
        let config = WikiSyncConfig::default();
        assert!(config.wiki.api_url.is_none());
        assert!(config.sync.output_dir.is_none());
        assert!(config.http.max_retries.is_none());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/wikisync.toml")).expect("load config");
        assert_eq!(config, WikiSyncConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
api_url = "https://example.wiki/api.php"
user_agent = "test-agent/1.0"

[sync]
output_dir = "out"
checkpoint_file = "state/checkpoint.txt"

[http]
timeout_ms = 1000
rate_limit_ms = 0
max_retries = 3
retry_delay_ms = 10
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.api_url.as_deref(),
            Some("https://example.wiki/api.php")
        );
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.sync.output_dir, Some(PathBuf::from("out")));
        assert_eq!(
            config.sync.checkpoint_file,
            Some(PathBuf::from("state/checkpoint.txt"))
        );
        assert_eq!(config.http.timeout_ms, Some(1000));
        assert_eq!(config.http.rate_limit_ms, Some(0));
        assert_eq!(config.http.max_retries, Some(3));
        assert_eq!(config.http.retry_delay_ms, Some(10));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(&config_path, "[sync]\noutput_dir = \"elsewhere\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.wiki.api_url.is_none());
        assert_eq!(config.sync.output_dir, Some(PathBuf::from("elsewhere")));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(&config_path, "[wiki\napi_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn flag_overrides_win_over_config_paths() {
        let config = WikiSyncConfig {
            sync: SyncSection {
                output_dir: Some(PathBuf::from("from-config")),
                checkpoint_file: Some(PathBuf::from("config-checkpoint.txt")),
            },
            ..WikiSyncConfig::default()
        };
        let overrides = ConfigOverrides {
            output_dir: Some(PathBuf::from("from-flag")),
            checkpoint_file: Some(PathBuf::from("flag-checkpoint.txt")),
        };
        assert_eq!(config.output_dir(&overrides), PathBuf::from("from-flag"));
        assert_eq!(
            config.checkpoint_file(&overrides),
            PathBuf::from("flag-checkpoint.txt")
        );
    }

    #[test]
    fn http_section_falls_back_to_single_attempt() {
        let settings = HttpSection::default().resolve(|_| None);
        assert_eq!(
            settings,
            HttpSettings {
                timeout_ms: DEFAULT_TIMEOUT_MS,
                rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
                max_retries: 0,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            }
        );
    }

    #[test]
    fn http_settings_prefer_env_then_config() {
        let section = HttpSection {
            timeout_ms: Some(1_000),
            rate_limit_ms: Some(0),
            max_retries: Some(2),
            retry_delay_ms: Some(10),
        };
        assert_eq!(
            section.resolve(|_| None),
            HttpSettings {
                timeout_ms: 1_000,
                rate_limit_ms: 0,
                max_retries: 2,
                retry_delay_ms: 10,
            }
        );

        let settings = section.resolve(|key| match key {
            "WIKI_HTTP_RETRIES" => Some(" 5 ".to_string()),
            "WIKI_HTTP_TIMEOUT_MS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.timeout_ms, 1_000);
    }
}
