use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API endpoint of the backend, e.g. https://cloud.appwrite.io/v1
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Backend project id
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub collections: CollectionsConfig,
    pub local: LocalConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub project_id: String,
    pub timeout_secs: Option<u64>,
}

/// Identifiers of the database, collections and bucket the app reads and writes.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CollectionsConfig {
    pub database_id: String,
    pub user_collection_id: String,
    pub post_collection_id: String,
    pub saves_collection_id: String,
    pub storage_id: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LocalConfig {
    pub path: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloud.appwrite.io/v1".to_string(),
            project_id: String::new(),
            timeout_secs: None,
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            database_id: "snapgram".to_string(),
            user_collection_id: "users".to_string(),
            post_collection_id: "posts".to_string(),
            saves_collection_id: "saves".to_string(),
            storage_id: "media".to_string(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref endpoint) = cli.endpoint {
            config.remote.endpoint = endpoint.clone();
        }
        if let Some(ref project) = cli.project {
            config.remote.project_id = project.clone();
        }

        if config.local.path.is_none() {
            config.local.path = Some(data_dir.join("local.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".snapgram")
        })
    }

    pub fn local_path(&self) -> &Path {
        self.local
            .path
            .as_deref()
            .unwrap_or_else(|| Path::new("local.db"))
    }
}
