//! Prometheus counters for the engagement core.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use domains::CacheCategory;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CategoryLabels {
    pub category: String,
}

impl From<CacheCategory> for CategoryLabels {
    fn from(category: CacheCategory) -> Self {
        Self {
            category: category.as_str().to_string(),
        }
    }
}

/// Cloning shares the underlying counters.
#[derive(Clone, Debug, Default)]
pub struct CoreMetrics {
    pub cache_hits: Family<CategoryLabels, Counter>,
    pub cache_misses: Family<CategoryLabels, Counter>,
    pub cache_invalidations: Family<CategoryLabels, Counter>,
    pub cache_invalidations_unsupported: Family<CategoryLabels, Counter>,
    pub counter_resyncs: Counter,
    pub counter_resync_failures: Counter,
    pub duplicate_reactions: Counter,
}

impl CoreMetrics {
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "forum_cache_hits",
            "Response cache lookups answered from the cache",
            self.cache_hits.clone(),
        );
        registry.register(
            "forum_cache_misses",
            "Response cache lookups that fell through to the store",
            self.cache_misses.clone(),
        );
        registry.register(
            "forum_cache_invalidations",
            "Pattern invalidations issued per category",
            self.cache_invalidations.clone(),
        );
        registry.register(
            "forum_cache_invalidations_unsupported",
            "Pattern invalidations the backend could not perform",
            self.cache_invalidations_unsupported.clone(),
        );
        registry.register(
            "forum_counter_resyncs",
            "Denormalized counters recomputed from authoritative rows",
            self.counter_resyncs.clone(),
        );
        registry.register(
            "forum_counter_resync_failures",
            "Counter recomputations that failed",
            self.counter_resync_failures.clone(),
        );
        registry.register(
            "forum_duplicate_reactions",
            "Reaction or favorite inserts that lost a uniqueness race",
            self.duplicate_reactions.clone(),
        );
    }
}
