use bson::doc;
use mongodb::{options::ClientOptions, Client, Database};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ConnectionError;
use crate::config;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client plus the database the project's collections live in
#[derive(Clone, Debug)]
pub struct TenantDatabase {
    pub client: Client,
    pub database: Database,
}

impl TenantDatabase {
    pub async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.database.run_command(doc! { "ping": 1 }).await.map(|_| ())
    }
}

/// Process-wide cache of MongoDB clients keyed by connection string and
/// fallback database name. A failed connect is never cached.
pub struct ConnectionCache {
    entries: RwLock<HashMap<String, TenantDatabase>>,
}

impl Default for ConnectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static ConnectionCache {
        static INSTANCE: OnceLock<ConnectionCache> = OnceLock::new();
        INSTANCE.get_or_init(ConnectionCache::new)
    }

    fn cache_key(uri: &str, fallback_db: &str) -> String {
        format!("{}::{}", uri, fallback_db)
    }

    /// Get a connected database for `uri`, connecting on first use. The
    /// database is the one named in the URI, else `fallback_db`.
    pub async fn get(&self, uri: &str, fallback_db: &str) -> Result<TenantDatabase, ConnectionError> {
        let key = Self::cache_key(uri, fallback_db);

        // Fast path: try read lock
        {
            let entries = self.entries.read().await;
            if let Some(found) = entries.get(&key) {
                return Ok(found.clone());
            }
        }

        let options = parse_options(uri).await?;
        let db_name = options
            .default_database
            .clone()
            .unwrap_or_else(|| fallback_db.to_string());

        let client = Client::with_options(options).map_err(ConnectionError::Connect)?;
        let tenant = TenantDatabase {
            database: client.database(&db_name),
            client,
        };
        tenant.ping().await.map_err(ConnectionError::Connect)?;

        let mut entries = self.entries.write().await;
        let cached = entries.entry(key).or_insert(tenant).clone();
        info!("Connected tenant database '{}'", db_name);
        Ok(cached)
    }

    /// Ping every cached client and drop the ones that no longer answer
    pub async fn sweep(&self) -> usize {
        let snapshot: Vec<(String, TenantDatabase)> = {
            let entries = self.entries.read().await;
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut dead = Vec::new();
        for (key, tenant) in snapshot {
            let healthy = matches!(tokio::time::timeout(PING_TIMEOUT, tenant.ping()).await, Ok(Ok(())));
            if !healthy {
                dead.push(key);
            }
        }

        let evicted: Vec<TenantDatabase> = {
            let mut entries = self.entries.write().await;
            dead.iter().filter_map(|key| entries.remove(key)).collect()
        };
        for tenant in &evicted {
            warn!("Evicting unhealthy tenant database '{}'", tenant.database.name());
            tenant.client.clone().shutdown().await;
        }
        evicted.len()
    }

    /// Remove and shut down every cached entry that uses `uri`
    pub async fn evict(&self, uri: &str) -> usize {
        let prefix = format!("{}::", uri);
        let evicted: Vec<TenantDatabase> = {
            let mut entries = self.entries.write().await;
            let keys: Vec<String> = entries.keys().filter(|key| key.starts_with(&prefix)).cloned().collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        for tenant in &evicted {
            debug!("Closing tenant database '{}'", tenant.database.name());
            tenant.client.clone().shutdown().await;
        }
        evicted.len()
    }

    pub async fn close_all(&self) {
        let drained: Vec<TenantDatabase> = {
            let mut entries = self.entries.write().await;
            entries.drain().map(|(_, v)| v).collect()
        };
        for tenant in drained {
            tenant.client.shutdown().await;
        }
        info!("Closed tenant database connections");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Run `sweep` on the global cache every `interval`
pub fn spawn_sweeper(interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = ConnectionCache::global().sweep().await;
            debug!("Connection sweep evicted {} entries", evicted);
        }
    })
}

async fn parse_options(uri: &str) -> Result<ClientOptions, ConnectionError> {
    if !is_mongo_uri(uri) {
        return Err(ConnectionError::InvalidUri("expected a mongodb:// or mongodb+srv:// URI".to_string()));
    }
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?;

    let settings = &config::config().mongo;
    options.min_pool_size = Some(settings.min_pool_size);
    options.max_pool_size = Some(settings.max_pool_size);
    options.connect_timeout = Some(Duration::from_secs(settings.connect_timeout_secs));
    options.server_selection_timeout = Some(Duration::from_secs(settings.server_selection_timeout_secs));
    options.app_name = Some(settings.app_name.clone());
    Ok(options)
}

pub fn is_mongo_uri(uri: &str) -> bool {
    uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mongo_schemes_are_accepted() {
        assert!(is_mongo_uri("mongodb://localhost:27017/app"));
        assert!(is_mongo_uri("mongodb+srv://cluster.example.net/app"));
        assert!(!is_mongo_uri("postgres://localhost/app"));
        assert!(!is_mongo_uri("localhost:27017"));
    }

    #[tokio::test]
    async fn invalid_uri_is_not_cached() {
        let cache = ConnectionCache::new();
        let err = cache.get("redis://localhost", "app").await.unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidUri(_)));
        assert!(cache.is_empty().await);
    }

    async fn unconnected(uri: &str, db: &str) -> TenantDatabase {
        let client = Client::with_uri_str(uri).await.unwrap();
        TenantDatabase {
            database: client.database(db),
            client,
        }
    }

    #[tokio::test]
    async fn evict_drops_only_entries_for_that_uri() {
        let cache = ConnectionCache::new();
        {
            let mut entries = cache.entries.write().await;
            for (uri, db) in [("mongodb://127.0.0.1:1", "shop"), ("mongodb://127.0.0.1:1", "blog"), ("mongodb://127.0.0.1:2", "shop")] {
                entries.insert(ConnectionCache::cache_key(uri, db), unconnected(uri, db).await);
            }
        }

        assert_eq!(cache.evict("mongodb://127.0.0.1:1").await, 2);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.evict("mongodb://127.0.0.1:1").await, 0);
    }

    #[tokio::test]
    async fn sweep_and_evict_on_empty_cache() {
        let cache = ConnectionCache::new();
        assert_eq!(cache.sweep().await, 0);
        assert_eq!(cache.evict("mongodb://localhost").await, 0);
        cache.close_all().await;
        assert_eq!(cache.len().await, 0);
    }
}
