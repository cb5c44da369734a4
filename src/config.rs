use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the personal access token. The PAT is never
/// read from the config file.
pub const PAT_ENV: &str = "AZDO_PAT";
/// Environment override for the organization URL.
pub const ORG_URL_ENV: &str = "AZDO_ORG_URL";
/// Environment override for the project name.
pub const PROJECT_ENV: &str = "AZDO_PROJECT";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Organization base URL, e.g. `https://dev.azure.com/myorg`.
    pub org_url: String,
    /// Project to scope WIQL queries to. Optional; queries run
    /// organization-wide when unset.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    "7.1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Candidate cap for discussion search (per-id comment fan-out is linear
    /// in this bound).
    #[serde(default = "default_search_cap")]
    pub search_cap: usize,
    /// Candidate cap for temporal/status filtering.
    #[serde(default = "default_filter_cap")]
    pub filter_cap: usize,
    /// Candidate cap for plain type listings.
    #[serde(default = "default_list_cap")]
    pub list_cap: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_cap: default_search_cap(),
            filter_cap: default_filter_cap(),
            list_cap: default_list_cap(),
        }
    }
}

fn default_search_cap() -> usize {
    100
}
fn default_filter_cap() -> usize {
    200
}
fn default_list_cap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldsConfig {
    /// Field names probed first when a filter asks for target/due dates
    /// specifically. Matched case-insensitively, ignoring spaces.
    #[serde(default = "default_date_candidates")]
    pub date_candidates: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            date_candidates: default_date_candidates(),
        }
    }
}

fn default_date_candidates() -> Vec<String> {
    [
        "Target Date",
        "TargetDate",
        "Due Date",
        "DueDate",
        "Scheduling.TargetDate",
        "Scheduling.DueDate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Build a configuration purely from the environment, for running
    /// without a config file (the original deployment style).
    pub fn from_env() -> Result<Self> {
        let org_url = std::env::var(ORG_URL_ENV)
            .with_context(|| format!("{} not set and no config file found", ORG_URL_ENV))?;
        Ok(Self {
            tracker: TrackerConfig {
                org_url: org_url.trim_end_matches('/').to_string(),
                project: std::env::var(PROJECT_ENV).ok(),
                api_version: default_api_version(),
            },
            query: QueryConfig::default(),
            fields: FieldsConfig::default(),
            server: ServerConfig::default(),
        })
    }

    /// Read the personal access token from the environment.
    pub fn pat(&self) -> Result<String> {
        std::env::var(PAT_ENV).with_context(|| format!("{} environment variable not set", PAT_ENV))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Environment overrides win over the file.
    if let Ok(org) = std::env::var(ORG_URL_ENV) {
        config.tracker.org_url = org;
    }
    if let Ok(project) = std::env::var(PROJECT_ENV) {
        config.tracker.project = Some(project);
    }
    config.tracker.org_url = config.tracker.org_url.trim_end_matches('/').to_string();

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.tracker.org_url.trim().is_empty() {
        anyhow::bail!("tracker.org_url must not be empty");
    }
    if config.query.search_cap == 0 || config.query.filter_cap == 0 || config.query.list_cap == 0 {
        anyhow::bail!("query caps must be >= 1");
    }
    if config.fields.date_candidates.is_empty() {
        anyhow::bail!("fields.date_candidates must not be empty");
    }
    Ok(())
}
