use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_url: String,
    #[serde(default)]
    pub invitation_token: Option<String>,
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_forward_interval_secs")]
    pub forward_interval_secs: u64,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_process_interval_secs")]
    pub process_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_base_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("aegis-agent")
}

fn default_forward_interval_secs() -> u64 {
    30
}

fn default_metrics_interval_secs() -> u64 {
    60
}

fn default_process_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> i64 {
    100
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&raw)?;
        Ok(settings)
    }

    pub fn spool_path(&self) -> PathBuf {
        self.base_dir.join("spool.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"server_url = "https://aegis.example.com""#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.server_url, "https://aegis.example.com");
        assert_eq!(settings.forward_interval_secs, 30);
        assert_eq!(settings.batch_size, 100);
    }
}
