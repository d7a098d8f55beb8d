use crate::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Store: {message}")]
    InvalidStore { message: String },

    #[error("Cache: {message}")]
    InvalidCache { message: String },

    #[error("Provisioning: {message}")]
    InvalidProvisioning { message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_service(&config.service, &mut report);
    validate_store(&config.store, &mut report);
    validate_cache(&config.cache, &mut report);
    validate_provisioning(&config.provisioning, &mut report);
    validate_worker(&config.worker, &mut report);

    match &config.monitoring {
        Some(monitoring) if monitoring.metrics_enabled && monitoring.metrics_port == 0 => {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: "monitoring.metrics_port".to_string(),
            });
        }
        Some(_) => {}
        None => report.add_default("monitoring.metrics_enabled", "false"),
    }

    report
}

fn is_unresolved(value: &str) -> bool {
    value.is_empty() || value.starts_with("${")
}

fn validate_service(service: &ServiceConfig, report: &mut ValidationReport) {
    if service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }

    if !["pretty", "json", "compact"].contains(&service.log_format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(service.log_format.clone()));
    }

    if service.log_filter.is_none() {
        report.add_default("service.log_filter", "info");
    }
}

fn validate_store(store: &StoreConfig, report: &mut ValidationReport) {
    match store.store_type.as_str() {
        "memory" => {
            report.add_warning(
                "store.type",
                "In-memory store is not persistent; queue and matches are lost on restart",
            );
        }
        "postgres" => match &store.postgres {
            Some(pg) => validate_postgres_config(pg, report),
            None => report.add_error(ValidationError::InvalidStore {
                message: "Store type is 'postgres' but postgres configuration is missing"
                    .to_string(),
            }),
        },
        other => report.add_error(ValidationError::InvalidStore {
            message: format!("Invalid store type '{}'. Must be one of: memory, postgres", other),
        }),
    }
}

fn validate_postgres_config(pg: &PostgresConfig, report: &mut ValidationReport) {
    if is_unresolved(&pg.host) {
        report.add_error(ValidationError::InvalidEnvVar {
            var: "PG_HOST".to_string(),
            message: "postgres host is missing or unresolved".to_string(),
        });
    }

    if is_unresolved(&pg.password) {
        report.add_error(ValidationError::InvalidEnvVar {
            var: "PG_PASSWORD".to_string(),
            message: "postgres password is missing or unresolved".to_string(),
        });
    }

    if pg.port == 0 {
        report.add_error(ValidationError::InvalidStore {
            message: "port must be a positive integer".to_string(),
        });
    }

    if pg.max_connections == 0 {
        report.add_error(ValidationError::InvalidStore {
            message: "max_connections must be a positive integer".to_string(),
        });
    }

    if pg.connection_timeout_seconds == 0 {
        report.add_error(ValidationError::InvalidStore {
            message: "connection_timeout_seconds must be a positive integer".to_string(),
        });
    }
}

fn validate_cache(cache: &CacheConfig, report: &mut ValidationReport) {
    match cache.cache_type.as_str() {
        "memory" => {}
        "redis" => match &cache.redis {
            Some(redis) => {
                if is_unresolved(&redis.host) {
                    report.add_error(ValidationError::InvalidEnvVar {
                        var: "REDIS_HOST".to_string(),
                        message: "redis host is missing or unresolved".to_string(),
                    });
                }
                if redis.port == 0 {
                    report.add_error(ValidationError::InvalidCache {
                        message: "port must be a positive integer".to_string(),
                    });
                }
            }
            None => report.add_error(ValidationError::InvalidCache {
                message: "Cache type is 'redis' but redis configuration is missing".to_string(),
            }),
        },
        other => report.add_error(ValidationError::InvalidCache {
            message: format!("Invalid cache type '{}'. Must be one of: memory, redis", other),
        }),
    }
}

fn validate_provisioning(provisioning: &ProvisioningConfig, report: &mut ValidationReport) {
    match provisioning.provider.as_str() {
        "mock" => {
            report.add_warning(
                "provisioning.provider",
                "Mock provisioner in use; workspaces are not created",
            );
        }
        "http" => match provisioning.base_url.as_deref() {
            Some(url) if !is_unresolved(url) => {
                match url::Url::parse(url) {
                    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                    Ok(_) => report.add_error(ValidationError::InvalidProvisioning {
                        message: format!("base_url '{}' must use http or https", url),
                    }),
                    Err(e) => report.add_error(ValidationError::InvalidProvisioning {
                        message: format!("base_url '{}' is not a valid URL: {}", url, e),
                    }),
                }
            }
            _ => report.add_error(ValidationError::InvalidEnvVar {
                var: "COLLAB_SERVICE_URL".to_string(),
                message: "provisioning base_url is missing or unresolved".to_string(),
            }),
        },
        other => report.add_error(ValidationError::InvalidProvisioning {
            message: format!("Invalid provider '{}'. Must be one of: mock, http", other),
        }),
    }

    if provisioning.timeout_seconds == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "provisioning.timeout_seconds".to_string(),
        });
    }
}

fn validate_worker(worker: &WorkerConfig, report: &mut ValidationReport) {
    if !worker.enabled {
        report.add_warning(
            "worker.enabled",
            "Queue worker disabled; matches are only formed when users join",
        );
    }

    if worker.interval_seconds == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "worker.interval_seconds".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> MasterConfig {
        serde_yaml::from_str("service:\n  name: peermatch\n").unwrap()
    }

    #[test]
    fn test_minimal_config_is_valid() {
        let report = validate_config(&minimal());
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.field == "store.type"));
        assert!(report
            .defaults_applied
            .iter()
            .any(|d| d.field == "monitoring.metrics_enabled"));
    }

    #[test]
    fn test_postgres_without_section_is_error() {
        let mut config = minimal();
        config.store.store_type = "postgres".to_string();

        let report = validate_config(&config);
        assert!(!report.is_valid());
        assert!(matches!(report.errors[0], ValidationError::InvalidStore { .. }));
    }

    #[test]
    fn test_unresolved_provisioning_url() {
        let mut config = minimal();
        config.provisioning.provider = "http".to_string();
        config.provisioning.base_url = Some("${COLLAB_SERVICE_URL}".to_string());

        let report = validate_config(&config);
        assert!(report.errors.contains(&ValidationError::InvalidEnvVar {
            var: "COLLAB_SERVICE_URL".to_string(),
            message: "provisioning base_url is missing or unresolved".to_string(),
        }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = minimal();
        config.worker.interval_seconds = 0;
        config.service.log_format = "xml".to_string();

        let report = validate_config(&config);
        assert_eq!(report.errors.len(), 2);
    }
}
