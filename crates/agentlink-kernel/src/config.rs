//! Configuration loading from `~/.agentlink/config.toml` with defaults.
//!
//! A missing or broken file never stops the node: it logs and falls back to
//! defaults. `AGENTLINK_*` environment variables override file values.

use agentlink_types::config::AgentConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load node configuration from a TOML file, with defaults, then apply
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> AgentConfig {
    let mut config = read_config_file(path);
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn read_config_file(path: Option<&Path>) -> AgentConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return AgentConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<AgentConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                AgentConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            AgentConfig::default()
        }
    }
}

/// Apply `AGENTLINK_*` overrides read through `lookup`.
///
/// Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut AgentConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = text("AGENTLINK_AGENT_ID") {
        config.agent_id = v;
    }
    if let Some(v) = text("AGENTLINK_API_LISTEN") {
        config.api_listen = v;
    }
    if let Some(v) = text("AGENTLINK_PUBLIC_ENDPOINT") {
        config.public_endpoint = v;
    }
    if let Some(v) = text("AGENTLINK_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = text("AGENTLINK_REGISTRY_URL") {
        config.registry.url = v;
    }
    if let Some(v) = text("AGENTLINK_IDENTITY_KEY") {
        config.registry.identity_key = v;
    }
    if let Some(v) = text("AGENTLINK_SHARED_SECRET") {
        config.security.shared_secret = v;
    }
    if let Some(v) = text("AGENTLINK_RATE_LIMIT_MAX") {
        match v.parse() {
            Ok(n) => config.security.rate_limit_max = n,
            Err(_) => warn!(value = %v, "Ignoring invalid AGENTLINK_RATE_LIMIT_MAX"),
        }
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    agentlink_home().join("config.toml")
}

/// Get the default AgentLink home directory.
pub fn agentlink_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".agentlink")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file() {
        let config = read_config_file(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.agent_id, "agentlink-node");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
agent_id = "escrow-west"
api_listen = "0.0.0.0:4400"

[network]
discovery_trust_score = 60
"#
        )
        .unwrap();

        let config = read_config_file(Some(&path));
        assert_eq!(config.agent_id, "escrow-west");
        assert_eq!(config.api_listen, "0.0.0.0:4400");
        assert_eq!(config.network.discovery_trust_score, 60);
        assert_eq!(config.network.handshake_trust_score, 50);
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent_id = [unterminated").unwrap();
        let config = read_config_file(Some(&path));
        assert_eq!(config.agent_id, "agentlink-node");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AGENTLINK_AGENT_ID", "courier-3"),
            ("AGENTLINK_REGISTRY_URL", "https://registry.example"),
            ("AGENTLINK_RATE_LIMIT_MAX", "not-a-number"),
            ("AGENTLINK_LOG_LEVEL", "  "),
        ]
        .into_iter()
        .collect();
        let mut config = AgentConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.agent_id, "courier-3");
        assert_eq!(config.registry.url, "https://registry.example");
        assert_eq!(config.security.rate_limit_max, 100);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_default_path_under_home() {
        let path = default_config_path();
        assert!(path.ends_with(".agentlink/config.toml"));
    }
}
