//! Environment-sourced configuration shared by every command.
//!
//! Settings come from the process environment, topped up from a local `.env`
//! file when one exists. Validation is strict and happens before any helper
//! process is spawned: a missing secret is a fatal configuration error, not
//! something to discover mid-connect.

use std::path::PathBuf;

const ENV_WALLET_KEY: &str = "XMTP_WALLET_KEY";
const ENV_DB_ENCRYPTION_KEY: &str = "XMTP_DB_ENCRYPTION_KEY";
const ENV_NETWORK: &str = "XMTP_ENV";
const ENV_DB_PATH: &str = "XMTP_DB_PATH";
const ENV_HELPER_CMD: &str = "XMTP_HELPER_CMD";

const DEFAULT_DB_PATH: &str = "./data/xmtp-db";
const DEFAULT_HELPER_CMD: &str = "xmtp-helper";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {0}. Set them in the environment or a local .env file")]
    MissingVars(String),

    #[error("failed to create local db directory {path}: {source}")]
    CreateDbDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Network selector. Unknown values fall back to dev rather than failing, so
/// a typo degrades to the harmless network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmtpEnv {
    Dev,
    Production,
}

impl XmtpEnv {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            _ => Self::Dev,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// ETH private key used for account signing. Never printed.
    pub wallet_key: String,
    /// Key encrypting the helper's local database. Never printed.
    pub db_encryption_key: String,
    pub env: XmtpEnv,
    pub db_path: PathBuf,
    /// Command line (whitespace-separated) launching the helper process.
    pub helper_cmd: String,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. This is the testable core of
    /// [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let wallet_key = get(ENV_WALLET_KEY);
        let db_encryption_key = get(ENV_DB_ENCRYPTION_KEY);

        let missing: Vec<&str> = [
            (ENV_WALLET_KEY, wallet_key.is_some()),
            (ENV_DB_ENCRYPTION_KEY, db_encryption_key.is_some()),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing.join(", ")));
        }

        Ok(Self {
            wallet_key: wallet_key.unwrap_or_default(),
            db_encryption_key: db_encryption_key.unwrap_or_default(),
            env: get(ENV_NETWORK)
                .map(|v| XmtpEnv::parse(&v))
                .unwrap_or(XmtpEnv::Dev),
            db_path: PathBuf::from(get(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            helper_cmd: get(ENV_HELPER_CMD).unwrap_or_else(|| DEFAULT_HELPER_CMD.into()),
        })
    }

    /// Create the local db directory if absent. The helper persists session
    /// state there, so this must succeed before connecting.
    pub fn ensure_db_dir(&self) -> Result<(), ConfigError> {
        let dir = self.db_path.parent().unwrap_or(&self.db_path);
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDbDir {
            path: dir.to_path_buf(),
            source,
        })
    }
}
