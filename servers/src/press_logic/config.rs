use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Press-cycle telemetry relay server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "PRESS_PORT", help = "Port to listen on for HTTP and WebSocket clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "PRESS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "PRESS_WS_PATH", help = "URL path of the WebSocket endpoint.")]
    pub ws_path: Option<String>,

    #[clap(long, env = "PRESS_CORS_ORIGIN", help = "Allowed CORS origin(s): '*' or a comma-separated list.")]
    pub cors_origin: Option<String>,

    #[clap(long, env = "PRESS_SPEC_PATH", help = "Path to the persisted ideal-timing spec table.")]
    pub spec_path: Option<PathBuf>,

    #[clap(long, env = "PRESS_RING_CAPACITY", help = "Capacity of the in-memory event history buffer.")]
    pub ring_capacity: Option<usize>,

    #[clap(long, env = "PRESS_HEARTBEAT_INTERVAL_SECONDS", help = "Interval in seconds between subscriber liveness probes.")]
    pub heartbeat_interval_secs: Option<u64>,

    #[clap(long, env = "PRESS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "PRESS_STRICT_VALIDATION", help = "Require non-negative timing offsets (the reference behavior).")]
    pub strict_validation: Option<bool>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            ws_path: other.ws_path.or(self.ws_path),
            cors_origin: other.cors_origin.or(self.cors_origin),
            spec_path: other.spec_path.or(self.spec_path),
            ring_capacity: other.ring_capacity.or(self.ring_capacity),
            heartbeat_interval_secs: other.heartbeat_interval_secs.or(self.heartbeat_interval_secs),
            log_level: other.log_level.or(self.log_level),
            strict_validation: other.strict_validation.or(self.strict_validation),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(3000)
    }

    pub fn ws_path(&self) -> &str {
        self.ws_path.as_deref().unwrap_or("/ws")
    }

    pub fn cors_origin(&self) -> &str {
        self.cors_origin.as_deref().unwrap_or("*")
    }

    pub fn spec_path(&self) -> PathBuf {
        self.spec_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("./ideal.json"))
    }

    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity.unwrap_or(2000)
    }

    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs.unwrap_or(30)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn validation_mode(&self) -> lib_common::ValidationMode {
        if self.strict_validation.unwrap_or(true) {
            lib_common::ValidationMode::Strict
        } else {
            lib_common::ValidationMode::Lenient
        }
    }
}

pub fn load_config() -> Config {
    // 1. Parse CLI/env early to pick up a config file path override.
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_press.conf"));

    let mut current_config = Config::default();

    // 2. Layer in the config file, when present.
    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => tracing::warn!(
                    path = %config_file_path.display(),
                    error = %e,
                    "failed to parse config file, falling back to env/CLI"
                ),
            },
            Err(e) => tracing::warn!(
                path = %config_file_path.display(),
                error = %e,
                "failed to read config file, falling back to env/CLI"
            ),
        }
    }

    // 3. Environment variables and CLI arguments win over the file.
    current_config.merge(cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.port(), 3000);
        assert_eq!(config.ws_path(), "/ws");
        assert_eq!(config.cors_origin(), "*");
        assert_eq!(config.ring_capacity(), 2000);
        assert_eq!(config.heartbeat_interval_secs(), 30);
        assert_eq!(config.validation_mode(), lib_common::ValidationMode::Strict);
    }

    #[test]
    fn merge_prefers_the_override() {
        let base = Config {
            port: Some(3000),
            ring_capacity: Some(2000),
            ..Default::default()
        };
        let over = Config {
            ring_capacity: Some(1000),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let merged = base.merge(over);
        assert_eq!(merged.port(), 3000); // untouched
        assert_eq!(merged.ring_capacity(), 1000); // overridden
        assert_eq!(merged.log_level(), "debug"); // filled in
    }

    #[test]
    fn file_config_deserializes_camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{"port": 8080, "ringCapacity": 1000, "strictValidation": false}"#,
        )
        .unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.ring_capacity(), 1000);
        assert_eq!(config.validation_mode(), lib_common::ValidationMode::Lenient);
    }
}
