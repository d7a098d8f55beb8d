pub fn default_enabled() -> bool {
    true
}

pub fn default_domain() -> String {
    "default".to_string()
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_store_type() -> String {
    "memory".to_string()
}

pub fn default_cache_type() -> String {
    "memory".to_string()
}

pub fn default_postgres_port() -> u16 {
    5432
}

pub fn default_ssl_mode() -> String {
    "require".to_string()
}

pub fn default_max_connections() -> u32 {
    10
}

pub fn default_connection_timeout() -> u64 {
    30
}

pub fn default_redis_port() -> u16 {
    6379
}

pub fn default_provider() -> String {
    "mock".to_string()
}

pub fn default_provisioning_timeout() -> u64 {
    10
}

pub fn default_worker_interval() -> u64 {
    5
}

pub fn default_metrics_port() -> u16 {
    9090
}
