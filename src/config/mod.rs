use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub filter: FilterConfig,
    pub database: DatabaseConfig,
    pub mongo: MongoConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_nested_depth: u32,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
}

/// Settings applied to every tenant MongoDB client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub connect_timeout_secs: u64,
    pub server_selection_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub app_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    pub plan_limits: HashMap<String, u32>,
    pub default_plan_limit: u32,
    pub unknown_owner_limit: u32,
    pub rate_limit_window_secs: u64,
    pub plan_cache_ttl_secs: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub enable_request_logging: bool,
    pub enable_response_compression: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub encryption_key: String,
    pub public_base_url: String,
}

impl ApiConfig {
    /// Requests per window granted to a subscription plan
    pub fn limit_for_plan(&self, plan: &str) -> u32 {
        self.plan_limits
            .get(&plan.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_plan_limit)
    }
}

fn default_plan_limits() -> HashMap<String, u32> {
    HashMap::from([
        ("free".to_string(), 100),
        ("basic".to_string(), 500),
        ("premium".to_string(), 1000),
        ("enterprise".to_string(), 5000),
    ])
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Filter overrides
        if let Ok(v) = env::var("FILTER_MAX_NESTED_DEPTH") {
            self.filter.max_nested_depth = v.parse().unwrap_or(self.filter.max_nested_depth);
        }
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Mongo overrides
        if let Ok(v) = env::var("MONGO_MIN_POOL_SIZE") {
            self.mongo.min_pool_size = v.parse().unwrap_or(self.mongo.min_pool_size);
        }
        if let Ok(v) = env::var("MONGO_MAX_POOL_SIZE") {
            self.mongo.max_pool_size = v.parse().unwrap_or(self.mongo.max_pool_size);
        }
        if let Ok(v) = env::var("MONGO_CONNECT_TIMEOUT_SECS") {
            self.mongo.connect_timeout_secs = v.parse().unwrap_or(self.mongo.connect_timeout_secs);
        }
        if let Ok(v) = env::var("MONGO_SERVER_SELECTION_TIMEOUT_SECS") {
            self.mongo.server_selection_timeout_secs =
                v.parse().unwrap_or(self.mongo.server_selection_timeout_secs);
        }
        if let Ok(v) = env::var("MONGO_SWEEP_INTERVAL_SECS") {
            self.mongo.sweep_interval_secs = v.parse().unwrap_or(self.mongo.sweep_interval_secs);
        }
        if let Ok(v) = env::var("MONGO_APP_NAME") {
            self.mongo.app_name = v;
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_PLAN_LIMITS") {
            // free=100,basic=500,...
            for pair in v.split(',') {
                if let Some((plan, limit)) = pair.split_once('=') {
                    if let Ok(limit) = limit.trim().parse() {
                        self.api.plan_limits.insert(plan.trim().to_ascii_lowercase(), limit);
                    }
                }
            }
        }
        if let Ok(v) = env::var("API_DEFAULT_PLAN_LIMIT") {
            self.api.default_plan_limit = v.parse().unwrap_or(self.api.default_plan_limit);
        }
        if let Ok(v) = env::var("API_UNKNOWN_OWNER_LIMIT") {
            self.api.unknown_owner_limit = v.parse().unwrap_or(self.api.unknown_owner_limit);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }
        if let Ok(v) = env::var("API_PLAN_CACHE_TTL_SECS") {
            self.api.plan_cache_ttl_secs = v.parse().unwrap_or(self.api.plan_cache_ttl_secs);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_ENABLE_RESPONSE_COMPRESSION") {
            self.api.enable_response_compression = v.parse().unwrap_or(self.api.enable_response_compression);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("ENCRYPTION_KEY") {
            self.security.encryption_key = v;
        }
        if let Ok(v) = env::var("PUBLIC_BASE_URL") {
            self.security.public_base_url = v.trim_end_matches('/').to_string();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            filter: FilterConfig {
                max_nested_depth: 10,
                debug_logging: true,
            },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
            },
            mongo: MongoConfig {
                min_pool_size: 0,
                max_pool_size: 10,
                connect_timeout_secs: 10,
                server_selection_timeout_secs: 10,
                sweep_interval_secs: 60,
                app_name: "dynavo-api".to_string(),
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                plan_limits: default_plan_limits(),
                default_plan_limit: 500,
                unknown_owner_limit: 1,
                rate_limit_window_secs: 24 * 60 * 60,
                plan_cache_ttl_secs: 60 * 60,
                default_page_size: 10,
                max_page_size: 1000,
                enable_request_logging: true,
                enable_response_compression: false,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "dynavo-development-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                encryption_key: "dynavo-development-encryption-key".to_string(),
                public_base_url: "http://localhost:8000".to_string(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            filter: FilterConfig {
                max_nested_depth: 5,
                debug_logging: false,
            },
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
            },
            mongo: MongoConfig {
                min_pool_size: 1,
                max_pool_size: 20,
                connect_timeout_secs: 5,
                server_selection_timeout_secs: 5,
                sweep_interval_secs: 60,
                app_name: "dynavo-api".to_string(),
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                plan_limits: default_plan_limits(),
                default_plan_limit: 500,
                unknown_owner_limit: 1,
                rate_limit_window_secs: 24 * 60 * 60,
                plan_cache_ttl_secs: 60 * 60,
                default_page_size: 10,
                max_page_size: 500,
                enable_request_logging: true,
                enable_response_compression: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.dynavo.dev".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                encryption_key: String::new(),
                public_base_url: "https://staging-api.dynavo.dev".to_string(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            filter: FilterConfig {
                max_nested_depth: 4,
                debug_logging: false,
            },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
            },
            mongo: MongoConfig {
                min_pool_size: 1,
                max_pool_size: 50,
                connect_timeout_secs: 5,
                server_selection_timeout_secs: 5,
                sweep_interval_secs: 60,
                app_name: "dynavo-api".to_string(),
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                plan_limits: default_plan_limits(),
                default_plan_limit: 500,
                unknown_owner_limit: 1,
                rate_limit_window_secs: 24 * 60 * 60,
                plan_cache_ttl_secs: 60 * 60,
                default_page_size: 10,
                max_page_size: 100,
                enable_request_logging: true,
                enable_response_compression: true,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.dynavo.dev".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                encryption_key: String::new(),
                public_base_url: "https://api.dynavo.dev".to_string(),
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.api.default_page_size, 10);
        assert_eq!(config.api.max_page_size, 1000);
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.mongo.sweep_interval_secs, 60);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.api.enable_rate_limiting);
        assert_eq!(config.api.max_page_size, 100);
        // Secrets must come from the environment in production
        assert!(config.security.jwt_secret.is_empty());
        assert!(config.security.encryption_key.is_empty());
    }

    #[test]
    fn plan_limits_follow_subscription_tiers() {
        let api = AppConfig::development().api;
        assert_eq!(api.limit_for_plan("free"), 100);
        assert_eq!(api.limit_for_plan("basic"), 500);
        assert_eq!(api.limit_for_plan("Premium"), 1000);
        assert_eq!(api.limit_for_plan("enterprise"), 5000);
        assert_eq!(api.limit_for_plan("platinum"), 500);
    }

    #[test]
    fn rate_window_is_one_day() {
        let api = AppConfig::staging().api;
        assert_eq!(api.rate_limit_window_secs, 86_400);
        assert_eq!(api.unknown_owner_limit, 1);
    }
}
