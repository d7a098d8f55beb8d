use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MasterConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    parse_config(&content)
}

/// Substitute environment variables and parse YAML
pub fn parse_config(content: &str) -> Result<MasterConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: MasterConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!(service = %config.service.name, "Configuration loaded successfully");
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> MasterConfig {
    use defaults::*;

    MasterConfig {
        service: ServiceConfig {
            name: "peermatch".to_string(),
            domain: default_domain(),
            log_format: default_log_format(),
            log_filter: Some("info,matchmaking=debug".to_string()),
        },
        store: StoreConfig {
            store_type: "postgres".to_string(),
            postgres: Some(PostgresConfig {
                host: "${PG_HOST:-localhost}".to_string(),
                port: default_postgres_port(),
                database: "peermatch".to_string(),
                user: "${PG_USER:-peermatch}".to_string(),
                password: "${PG_PASSWORD}".to_string(),
                ssl_mode: "disable".to_string(),
                max_connections: default_max_connections(),
                connection_timeout_seconds: default_connection_timeout(),
            }),
        },
        cache: CacheConfig {
            cache_type: "redis".to_string(),
            redis: Some(RedisConfig {
                host: "${REDIS_HOST:-localhost}".to_string(),
                port: default_redis_port(),
                password: String::new(),
                db_index: 0,
            }),
        },
        provisioning: ProvisioningConfig {
            provider: "http".to_string(),
            base_url: Some("${COLLAB_SERVICE_URL:-http://localhost:8081}".to_string()),
            timeout_seconds: default_provisioning_timeout(),
        },
        worker: WorkerConfig::default(),
        monitoring: Some(MonitoringConfig {
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }),
    }
}

#[instrument]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &MasterConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_yaml() {
        let config = generate_default_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: MasterConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.service.name, "peermatch");
        assert_eq!(parsed.store.store_type, "postgres");
        assert_eq!(parsed.provisioning.provider, "http");
    }

    #[test]
    fn test_parse_config_applies_fallbacks() {
        let yaml = r#"
service:
  name: ${PEERMATCH_TEST_UNSET_NAME:-from-default}
worker:
  interval_seconds: 2
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.service.name, "from-default");
        assert_eq!(config.worker.interval_seconds, 2);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("peermatch-{}.yaml", std::process::id()));
        save_config(&generate_default_config(), &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.service.name, "peermatch");

        std::fs::remove_file(&path).ok();
    }
}
