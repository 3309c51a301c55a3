//! # forum-board
//!
//! Assembles the engagement core from the adapters selected by configuration
//! and compile-time features, then keeps denormalized counters honest with a
//! periodic repair sweep until interrupted. A process-local cache is also
//! swept for expired entries on its own interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use configs::{AppConfig, CacheBackendKind};
use domains::{AccessPolicy, Board, BoardId, CacheBackend, ForumStore};
use services::{CacheTtls, CoreMetrics, ForumCore};
use storage_adapters::{InMemoryForumStore, MemoryCache};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_logging(&config.logging.level, config.logging.json);
    info!(version = env!("CARGO_PKG_VERSION"), "forum-board starting");

    let store = build_store(&config).await?;
    let (cache, local_cache) = build_cache(&config)?;
    info!(cache = cache.name(), "cache backend ready");
    let purger = local_cache.map(|local| tokio::spawn(purge_loop(local, CACHE_PURGE_INTERVAL)));

    let ttl = &config.cache.ttl;
    let ttls = CacheTtls {
        home_posts: ttl.home_posts(),
        board_posts: ttl.board_posts(),
        post_detail: ttl.post_detail(),
        user_profile: ttl.user_profile(),
    };

    let mut registry = Registry::default();
    let metrics = CoreMetrics::default();
    metrics.register(&mut registry);

    let core = Arc::new(ForumCore::new(store, cache, ttls, metrics));

    let sweeper = match config.repair.interval() {
        Some(every) => Some(tokio::spawn(repair_loop(core.clone(), every))),
        None => {
            info!("counter repair sweeper disabled");
            None
        }
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");

    for handle in [sweeper, purger].into_iter().flatten() {
        handle.abort();
    }

    let mut exposition = String::new();
    if encode(&mut exposition, &registry).is_ok() {
        debug!(metrics = %exposition, "final metrics snapshot");
    }
    Ok(())
}

fn init_logging(level: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = if json {
        fmt::layer().json().with_current_span(false).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn ForumStore>> {
    if let Some(url) = &config.database.url {
        return connect_postgres(url, config.database.max_connections).await;
    }

    warn!("database.url not set, using the in-memory store");
    let store = InMemoryForumStore::new();
    store
        .seed_board(Board {
            id: BoardId::generate(),
            name: "general".into(),
            access_policy: AccessPolicy::Public,
            allowed_groups: HashSet::new(),
            allowed_users: HashSet::new(),
            order: 0,
        })
        .await;
    Ok(Arc::new(store))
}

#[cfg(feature = "db-postgres")]
async fn connect_postgres(
    url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<Arc<dyn ForumStore>> {
    use secrecy::ExposeSecret;
    use storage_adapters::PgForumStore;

    let store = PgForumStore::connect(url.expose_secret(), max_connections)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("running migrations")?;
    info!("postgres store ready");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "db-postgres"))]
async fn connect_postgres(
    _url: &secrecy::SecretString,
    _max_connections: u32,
) -> Result<Arc<dyn ForumStore>> {
    bail!("database.url is set but this build lacks the `db-postgres` feature")
}

/// The configured backend, plus the process-local cache when one is in use
/// so its expired entries can be swept.
fn build_cache(
    config: &AppConfig,
) -> Result<(Arc<dyn CacheBackend>, Option<Arc<MemoryCache>>)> {
    let local = match config.cache.backend {
        CacheBackendKind::Memory => Arc::new(MemoryCache::new()),
        CacheBackendKind::MemoryExact => {
            warn!("exact-key cache: prefix invalidation is unavailable, views stay stale until their TTL");
            Arc::new(MemoryCache::exact_only())
        }
        CacheBackendKind::Redis => {
            return Ok((build_redis(config.cache.redis_url.as_deref())?, None));
        }
    };
    let shared: Arc<dyn CacheBackend> = local.clone();
    Ok((shared, Some(local)))
}

#[cfg(feature = "redis")]
fn build_redis(url: Option<&str>) -> Result<Arc<dyn CacheBackend>> {
    let Some(url) = url else {
        bail!("cache.redis_url is required for the redis backend");
    };
    let cache = storage_adapters::RedisCache::from_url(url).context("creating redis pool")?;
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis"))]
fn build_redis(_url: Option<&str>) -> Result<Arc<dyn CacheBackend>> {
    bail!("cache.backend = \"redis\" requires the `redis` feature")
}

/// Recomputes every counter on a fixed interval. The first sweep runs
/// immediately so drift left by a crash is repaired at startup.
async fn repair_loop(core: Arc<ForumCore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match core.repair_counters().await {
            Ok(report) if report.corrected > 0 || report.failed > 0 => {
                warn!(
                    checked = report.checked,
                    corrected = report.corrected,
                    failed = report.failed,
                    "counter repair found drift"
                );
            }
            Ok(report) => debug!(checked = report.checked, "counters consistent"),
            Err(err) => error!(error = %err, "counter repair sweep failed"),
        }
    }
}

async fn purge_loop(cache: Arc<MemoryCache>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let purged = cache.purge_expired();
        if purged > 0 {
            debug!(purged, remaining = cache.len(), "expired cache entries purged");
        }
    }
}
