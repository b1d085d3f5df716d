use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_URL: &str = "HIRE_API_URL";
pub const ENV_API_TOKEN: &str = "HIRE_API_TOKEN";
pub const ENV_DB: &str = "HIRE_DB";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    /// Remote REST service.
    Remote {
        base_url: String,
        token: Option<String>,
        timeout: Duration,
    },
    /// Local SQLite store.
    Local { db_path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
}

impl Config {
    /// Flags win over environment, environment wins over defaults.
    pub fn resolve(api_url: Option<String>, db: Option<PathBuf>) -> Result<Self> {
        Self::resolve_with(api_url, db, |key| env::var(key).ok())
    }

    fn resolve_with(
        api_url: Option<String>,
        db: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // An explicit --db always selects the local store
        if let Some(db_path) = db {
            return Ok(Self {
                backend: Backend::Local { db_path },
            });
        }

        let api_url = api_url.or_else(|| lookup(ENV_API_URL)).filter(|u| !u.trim().is_empty());
        if let Some(url) = api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow!("API URL must start with http:// or https://, got '{}'", url));
            }
            return Ok(Self {
                backend: Backend::Remote {
                    base_url: url.trim_end_matches('/').to_string(),
                    token: lookup(ENV_API_TOKEN).filter(|t| !t.is_empty()),
                    timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                },
            });
        }

        let db_path = match lookup(ENV_DB) {
            Some(path) => PathBuf::from(path),
            None => default_db_path(),
        };
        Ok(Self {
            backend: Backend::Local { db_path },
        })
    }
}

fn default_db_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hire") {
        proj_dirs.data_dir().join("hire.db")
    } else {
        PathBuf::from("hire.db")
    }
}
