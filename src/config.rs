use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use ticket_sdk::{BlockfrostIndexer, Network, TicketProtocol, TicketSdk};

use crate::wallet::DiscoveryPolicy;

pub const PROJECT_ID_ENV: &str = "BLOCKFROST_PROJECT_ID";
pub const NETWORK_ENV: &str = "TICKET_BOOTH_NETWORK";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{0}")]
    Network(String),

    #[error("missing Blockfrost project id (set BLOCKFROST_PROJECT_ID or projectId)")]
    MissingApiKey,

    #[error(transparent)]
    Sdk(#[from] ticket_sdk::Error),
}

/// On-disk shape. Every field is optional; absent fields fall back to
/// environment variables and then defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    network: Option<String>,
    blockfrost_url: Option<String>,
    project_id: Option<String>,
    request_timeout_secs: Option<u64>,
    discovery: Option<DiscoveryPolicy>,
}

/// Resolved settings for one run of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub network: Network,
    /// Overrides the network's public Blockfrost endpoint.
    pub blockfrost_url: Option<String>,
    pub project_id: Option<String>,
    pub request_timeout: Duration,
    pub discovery: DiscoveryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            blockfrost_url: None,
            project_id: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            discovery: DiscoveryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load from an optional JSON file, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::load`] with an explicit environment lookup.
    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => ConfigFile::default(),
        };

        let defaults = AppConfig::default();
        let network = match env(NETWORK_ENV).or(file.network) {
            Some(name) => name.parse::<Network>().map_err(ConfigError::Network)?,
            None => defaults.network,
        };
        let project_id = env(PROJECT_ID_ENV)
            .or(file.project_id)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            network,
            blockfrost_url: file.blockfrost_url,
            project_id,
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            discovery: file.discovery.unwrap_or(defaults.discovery),
        })
    }

    pub fn base_url(&self) -> &str {
        self.blockfrost_url
            .as_deref()
            .unwrap_or_else(|| self.network.blockfrost_url())
    }

    /// Build the HTTP indexer. Fails before any request when the key is absent.
    pub fn indexer(&self) -> Result<BlockfrostIndexer, ConfigError> {
        let key = self.project_id.as_deref().ok_or(ConfigError::MissingApiKey)?;
        Ok(BlockfrostIndexer::with_timeout(
            self.base_url(),
            key,
            self.request_timeout,
        )?)
    }

    /// Purchase pipeline over the configured indexer.
    pub fn sdk(&self) -> Result<TicketSdk<BlockfrostIndexer>, ConfigError> {
        Ok(TicketSdk::new(
            self.indexer()?,
            TicketProtocol::mainnet(),
            self.network,
        ))
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
