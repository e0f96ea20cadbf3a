//! Configuration for the group controller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_reconcile::DEFAULT_POLL_INTERVAL;
use fleet_spi::GroupSpec;

/// Group controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Supervisor tick and rolling update poll interval.
    pub poll_interval: Duration,

    /// JSON array of group specs to watch at startup.
    pub groups_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let poll_interval = match lookup("FLEET_POLL_INTERVAL_MS") {
            Some(raw) => {
                let millis: u64 = raw
                    .parse()
                    .with_context(|| format!("FLEET_POLL_INTERVAL_MS is not a number: {raw}"))?;
                anyhow::ensure!(millis > 0, "FLEET_POLL_INTERVAL_MS must be positive");
                Duration::from_millis(millis)
            }
            None => DEFAULT_POLL_INTERVAL,
        };

        let groups_file = lookup("FLEET_GROUPS_FILE").map(PathBuf::from);

        let log_level = lookup("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            poll_interval,
            groups_file,
            log_level,
        })
    }

    /// Read the startup group specs, if a file is configured.
    pub fn load_groups(&self) -> Result<Vec<GroupSpec>> {
        let Some(path) = &self.groups_file else {
            return Ok(Vec::new());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read groups file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse groups file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.groups_file.is_none());
        assert_eq!(config.log_level, "info");
        assert!(config.load_groups().unwrap().is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FLEET_POLL_INTERVAL_MS", "250"),
            ("FLEET_LOG_LEVEL", "debug"),
        ])
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_rejects_bad_interval() {
        assert!(config(&[("FLEET_POLL_INTERVAL_MS", "soon")]).is_err());
        assert!(config(&[("FLEET_POLL_INTERVAL_MS", "0")]).is_err());
    }

    #[test]
    fn test_load_groups_file() {
        let path = std::env::temp_dir().join(format!("fleet-groups-{}.json", std::process::id()));
        let config = config(&[("FLEET_GROUPS_FILE", path.to_str().unwrap())]).unwrap();

        std::fs::write(
            &path,
            r#"[{"ID": "workers", "Properties": {"Allocation": {"Size": 2}}}]"#,
        )
        .unwrap();
        let loaded = config.load_groups();
        let _ = std::fs::remove_file(&path);

        let groups = loaded.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id.as_str(), "workers");
    }
}
