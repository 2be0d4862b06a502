//! Configuration surface (spec §6). CLI flags and environment variables
//! are handled by one `clap::Parser` derive (clap's own `env` attribute
//! gives CLI precedence over environment automatically); a TOML file
//! layered beneath both supplies the last fallback, matching SPEC_FULL's
//! "CLI > env > TOML" precedence order, modeled on the teacher's
//! `Cli`/`Commands` derive (`src/main.rs`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{AgentError, Result};

#[derive(Parser, Debug, Default)]
#[command(name = "cluster-telemetry-agent")]
#[command(about = "In-cluster telemetry agent", long_about = None)]
struct Cli {
    /// Path to a TOML config file layered beneath CLI flags and env vars.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "TELEMETRY_API_KEY")]
    api_key: Option<String>,
    #[arg(long, env = "TELEMETRY_CLUSTER_ID")]
    cluster_id: Option<String>,
    #[arg(long, env = "TELEMETRY_CLUSTER_NAME")]
    cluster_name: Option<String>,
    #[arg(long, env = "TELEMETRY_BACKEND_URL")]
    backend_url: Option<String>,
    #[arg(long, env = "TELEMETRY_SNAPSHOT_INTERVAL_SECONDS")]
    snapshot_interval_seconds: Option<u64>,
    #[arg(long, env = "TELEMETRY_METRICS_INTERVAL_SECONDS")]
    metrics_interval_seconds: Option<u64>,
    #[arg(long, env = "TELEMETRY_INFORMER_RESYNC_PERIOD_SECONDS")]
    informer_resync_period_seconds: Option<u64>,
    #[arg(long, env = "TELEMETRY_INFORMER_SYNC_TIMEOUT_SECONDS")]
    informer_sync_timeout_seconds: Option<u64>,
    #[arg(long, env = "TELEMETRY_COMPRESSION_LEVEL")]
    compression_level: Option<u8>,
    #[arg(long, env = "TELEMETRY_MAX_RETRIES")]
    max_retries: Option<u32>,
    #[arg(long, env = "TELEMETRY_REQUEST_TIMEOUT_SECONDS")]
    request_timeout_seconds: Option<u64>,
    #[arg(long, env = "TELEMETRY_HEALTH_PORT")]
    health_port: Option<u16>,
    #[arg(long, env = "TELEMETRY_ALLOW_INSECURE")]
    allow_insecure: Option<bool>,
    #[arg(long, env = "TELEMETRY_DEBUG_ENDPOINTS")]
    debug_endpoints: Option<bool>,
    #[arg(long, env = "TELEMETRY_GPU_METRICS_ENABLED")]
    gpu_metrics_enabled: Option<bool>,
    #[arg(long, env = "TELEMETRY_DCGM_EXPORTER_PORT")]
    dcgm_exporter_port: Option<u16>,
    #[arg(long, env = "TELEMETRY_DCGM_EXPORTER_NAMESPACE")]
    dcgm_exporter_namespace: Option<String>,
    #[arg(long, env = "TELEMETRY_DCGM_EXPORTER_ENDPOINTS", value_delimiter = ',')]
    dcgm_exporter_endpoints: Option<Vec<String>>,
    #[arg(long, env = "TELEMETRY_GPU_METRICS_INTERVAL_SECONDS")]
    gpu_metrics_interval_seconds: Option<u64>,
}

/// The TOML file layer: every field optional, the lowest-precedence
/// fallback once CLI and env have both been checked.
#[derive(Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct TomlConfig {
    api_key: Option<String>,
    cluster_id: Option<String>,
    cluster_name: Option<String>,
    backend_url: Option<String>,
    snapshot_interval_seconds: Option<u64>,
    metrics_interval_seconds: Option<u64>,
    informer_resync_period_seconds: Option<u64>,
    informer_sync_timeout_seconds: Option<u64>,
    compression_level: Option<u8>,
    max_retries: Option<u32>,
    request_timeout_seconds: Option<u64>,
    health_port: Option<u16>,
    allow_insecure: Option<bool>,
    debug_endpoints: Option<bool>,
    gpu_metrics_enabled: Option<bool>,
    dcgm_exporter_port: Option<u16>,
    dcgm_exporter_namespace: Option<String>,
    dcgm_exporter_endpoints: Option<Vec<String>>,
    gpu_metrics_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub cluster_id: String,
    pub cluster_name: Option<String>,
    pub backend_url: String,
    pub snapshot_interval: Duration,
    pub metrics_interval: Duration,
    pub informer_resync_period: Duration,
    pub informer_sync_timeout: Duration,
    pub compression_level: u8,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub health_port: u16,
    pub allow_insecure: bool,
    pub debug_endpoints: bool,
    pub gpu_metrics_enabled: bool,
    pub dcgm_exporter_port: Option<u16>,
    pub dcgm_exporter_namespace: Option<String>,
    pub dcgm_exporter_endpoints: Vec<String>,
    pub gpu_metrics_interval: Duration,
}

impl Config {
    /// Parses `std::env::args()` plus environment variables (via clap's
    /// own precedence), layers an optional `--config` TOML file beneath
    /// both, applies defaults, then validates.
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Result<Self> {
        let toml_layer = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| AgentError::Config(format!("reading config file {path:?}: {e}")))?;
                toml::from_str::<TomlConfig>(&text)
                    .map_err(|e| AgentError::Config(format!("parsing config file {path:?}: {e}")))?
            }
            None => TomlConfig::default(),
        };

        let api_key = cli
            .api_key
            .or(toml_layer.api_key)
            .ok_or_else(|| AgentError::Config("api_key is required".to_string()))?;

        let cluster_id = cli
            .cluster_id
            .or(toml_layer.cluster_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let backend_url = cli
            .backend_url
            .or(toml_layer.backend_url)
            .ok_or_else(|| AgentError::Config("backend_url is required".to_string()))?;

        let allow_insecure = cli.allow_insecure.or(toml_layer.allow_insecure).unwrap_or(false);
        if !backend_url.starts_with("https://") && !allow_insecure {
            return Err(AgentError::Config(
                "backend_url must be https:// unless allow_insecure is set".to_string(),
            ));
        }

        let snapshot_interval_seconds = cli
            .snapshot_interval_seconds
            .or(toml_layer.snapshot_interval_seconds)
            .unwrap_or(60);
        let metrics_interval_seconds = cli
            .metrics_interval_seconds
            .or(toml_layer.metrics_interval_seconds)
            .unwrap_or(60);
        if snapshot_interval_seconds < 10 {
            return Err(AgentError::Config("snapshot_interval must be >= 10s".to_string()));
        }
        if metrics_interval_seconds < 10 {
            return Err(AgentError::Config("metrics_interval must be >= 10s".to_string()));
        }

        let compression_level = cli.compression_level.or(toml_layer.compression_level).unwrap_or(3);
        if !(1..=4).contains(&compression_level) {
            return Err(AgentError::Config("compression_level must be in 1..=4".to_string()));
        }

        let health_port = cli.health_port.or(toml_layer.health_port).unwrap_or(8080);
        if health_port == 0 {
            return Err(AgentError::Config("health_port must be in 1..=65535".to_string()));
        }

        let gpu_metrics_interval_seconds = cli
            .gpu_metrics_interval_seconds
            .or(toml_layer.gpu_metrics_interval_seconds)
            .unwrap_or(metrics_interval_seconds);

        Ok(Config {
            api_key,
            cluster_id,
            cluster_name: cli.cluster_name.or(toml_layer.cluster_name),
            backend_url,
            snapshot_interval: Duration::from_secs(snapshot_interval_seconds),
            metrics_interval: Duration::from_secs(metrics_interval_seconds),
            informer_resync_period: Duration::from_secs(
                cli.informer_resync_period_seconds
                    .or(toml_layer.informer_resync_period_seconds)
                    .unwrap_or(300),
            ),
            informer_sync_timeout: Duration::from_secs(
                cli.informer_sync_timeout_seconds
                    .or(toml_layer.informer_sync_timeout_seconds)
                    .unwrap_or(300),
            ),
            compression_level,
            max_retries: cli.max_retries.or(toml_layer.max_retries).unwrap_or(5),
            request_timeout: Duration::from_secs(
                cli.request_timeout_seconds
                    .or(toml_layer.request_timeout_seconds)
                    .unwrap_or(30),
            ),
            health_port,
            allow_insecure,
            debug_endpoints: cli.debug_endpoints.or(toml_layer.debug_endpoints).unwrap_or(false),
            gpu_metrics_enabled: cli
                .gpu_metrics_enabled
                .or(toml_layer.gpu_metrics_enabled)
                .unwrap_or(true),
            dcgm_exporter_port: cli.dcgm_exporter_port.or(toml_layer.dcgm_exporter_port),
            dcgm_exporter_namespace: cli.dcgm_exporter_namespace.or(toml_layer.dcgm_exporter_namespace),
            dcgm_exporter_endpoints: cli
                .dcgm_exporter_endpoints
                .or(toml_layer.dcgm_exporter_endpoints)
                .unwrap_or_default(),
            gpu_metrics_interval: Duration::from_secs(gpu_metrics_interval_seconds),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(api_key: Option<&str>, backend_url: Option<&str>) -> Cli {
        Cli {
            api_key: api_key.map(String::from),
            backend_url: backend_url.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let result = Config::from_cli(cli_with(None, Some("https://example.com")));
        assert!(result.is_err());
    }

    #[test]
    fn plain_http_backend_is_rejected_without_allow_insecure() {
        let result = Config::from_cli(cli_with(Some("key"), Some("http://example.com")));
        assert!(result.is_err());
    }

    #[test]
    fn plain_http_backend_is_accepted_with_allow_insecure() {
        let mut cli = cli_with(Some("key"), Some("http://example.com"));
        cli.allow_insecure = Some(true);
        let config = Config::from_cli(cli).expect("valid config");
        assert_eq!(config.backend_url, "http://example.com");
    }

    #[test]
    fn snapshot_interval_below_ten_seconds_is_rejected() {
        let mut cli = cli_with(Some("key"), Some("https://example.com"));
        cli.snapshot_interval_seconds = Some(5);
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn cluster_id_defaults_to_a_fresh_uuid() {
        let cli = cli_with(Some("key"), Some("https://example.com"));
        let config = Config::from_cli(cli).expect("valid config");
        assert!(uuid::Uuid::parse_str(&config.cluster_id).is_ok());
    }

    #[test]
    fn compression_level_out_of_range_is_rejected() {
        let mut cli = cli_with(Some("key"), Some("https://example.com"));
        cli.compression_level = Some(9);
        assert!(Config::from_cli(cli).is_err());
    }
}
