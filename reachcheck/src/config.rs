use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "reachcheck.yaml";

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct CheckConfig {
    pub concurrency: Option<usize>,
    pub requests_per_second: Option<f64>,
    pub timeout_seconds: Option<f64>,
    pub retries: Option<u32>,
    pub db: Option<PathBuf>,
    pub progress_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub check: Option<CheckConfig>,
}

/// Load `path`, or `./reachcheck.yaml` if present. A missing default file is
/// not an error; an explicit path that can't be read is.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = parse_config(&s).with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(Some(cfg))
}

pub fn parse_config(s: &str) -> Result<Config> {
    Ok(serde_yaml::from_str(s)?)
}
