//! # Counter synchronization
//!
//! Denormalized counters are always recomputed from an authoritative row
//! count and overwritten, never incremented in place. The row carrying the
//! counter is locked before counting, so concurrent resyncs of one counter
//! queue up and each counts what the previous lock holders committed.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use domains::{CounterRef, DomainError, ForumStore, Result, StorageError, StoreTransaction, TargetRef};

use crate::metrics::CoreMetrics;

/// Outcome of a full repair sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub checked: u64,
    pub corrected: u64,
    pub failed: u64,
}

pub struct CounterSynchronizer {
    store: Arc<dyn ForumStore>,
    metrics: CoreMetrics,
}

impl CounterSynchronizer {
    pub fn new(store: Arc<dyn ForumStore>, metrics: CoreMetrics) -> Self {
        Self { store, metrics }
    }

    /// Recomputes `counter` inside the caller's transaction so the new value
    /// commits (or rolls back) together with the triggering mutation.
    pub async fn resync_in(
        &self,
        tx: &mut dyn StoreTransaction,
        counter: CounterRef,
    ) -> Result<u64> {
        match recompute(tx, counter).await {
            Ok(count) => {
                self.metrics.counter_resyncs.inc();
                debug!(%counter, count, "counter resynced");
                Ok(count)
            }
            Err(source) => {
                self.metrics.counter_resync_failures.inc();
                error!(%counter, error = %source, "counter resync failed");
                Err(DomainError::CounterResyncFailed { counter, source })
            }
        }
    }

    /// Best-effort resync in its own transaction, for use after a primary
    /// mutation has already committed. Failure leaves the primary effect in
    /// place and is reported as `CounterResyncFailed`.
    pub async fn resync(&self, counter: CounterRef) -> Result<u64> {
        self.reconcile(counter).await.map(|(_, count)| count)
    }

    /// Resyncs every counter in the store. Individual failures are counted
    /// and logged; the sweep carries on.
    pub async fn repair_all(&self) -> Result<RepairReport> {
        let mut counters = Vec::new();
        for post in self.store.list_post_ids().await? {
            counters.push(CounterRef::PostLikes(post));
            counters.push(CounterRef::PostComments(post));
        }
        for comment in self.store.list_comment_ids().await? {
            counters.push(CounterRef::CommentLikes(comment));
        }

        let mut report = RepairReport::default();
        for counter in counters {
            report.checked += 1;
            match self.reconcile(counter).await {
                Ok((previous, current)) if previous != Some(current) => {
                    report.corrected += 1;
                    warn!(%counter, ?previous, current, "repaired drifted counter");
                }
                Ok(_) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(%counter, error = %err, "counter repair failed");
                }
            }
        }

        info!(
            checked = report.checked,
            corrected = report.corrected,
            failed = report.failed,
            "counter repair sweep finished"
        );
        Ok(report)
    }

    /// Returns the stored value before the resync and the fresh count.
    async fn reconcile(&self, counter: CounterRef) -> Result<(Option<u64>, u64)> {
        let failed = |source: StorageError| {
            self.metrics.counter_resync_failures.inc();
            error!(%counter, error = %source, "standalone counter resync failed");
            DomainError::CounterResyncFailed { counter, source }
        };

        let mut tx = self.store.begin().await.map_err(failed)?;
        let previous = stored_value(tx.as_mut(), counter).await.map_err(failed)?;
        let count = self.resync_in(tx.as_mut(), counter).await?;
        tx.commit().await.map_err(failed)?;
        Ok((previous, count))
    }
}

async fn recompute(
    tx: &mut dyn StoreTransaction,
    counter: CounterRef,
) -> std::result::Result<u64, StorageError> {
    tx.lock_counter_owner(counter).await?;
    let count = match counter {
        CounterRef::PostLikes(post) => tx.count_reactions(TargetRef::Post(post)).await?,
        CounterRef::CommentLikes(comment) => {
            tx.count_reactions(TargetRef::Comment(comment)).await?
        }
        CounterRef::PostComments(post) => tx.count_comments(post).await?,
    };
    tx.store_counter(counter, count).await?;
    Ok(count)
}

async fn stored_value(
    tx: &mut dyn StoreTransaction,
    counter: CounterRef,
) -> std::result::Result<Option<u64>, StorageError> {
    Ok(match counter {
        CounterRef::PostLikes(post) => tx.fetch_post(post).await?.map(|p| p.likes_count),
        CounterRef::PostComments(post) => tx.fetch_post(post).await?.map(|p| p.comments_count),
        CounterRef::CommentLikes(comment) => {
            tx.fetch_comment(comment).await?.map(|c| c.likes_count)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::mocks::{MockStore, MockTx};
    use domains::PostId;
    use mockall::predicate::eq;
    use mockall::Sequence;

    #[tokio::test]
    async fn resync_in_overwrites_with_authoritative_count() {
        let post = PostId::generate();
        let mut tx = MockTx::new();
        let mut seq = Sequence::new();
        tx.expect_lock_counter_owner()
            .with(eq(CounterRef::PostLikes(post)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        tx.expect_count_reactions()
            .with(eq(TargetRef::Post(post)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(7));
        tx.expect_store_counter()
            .with(eq(CounterRef::PostLikes(post)), eq(7))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let sync = CounterSynchronizer::new(Arc::new(MockStore::new()), CoreMetrics::default());
        let count = sync
            .resync_in(&mut tx, CounterRef::PostLikes(post))
            .await
            .unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn persist_failure_surfaces_as_counter_resync_failed() {
        let post = PostId::generate();
        let mut tx = MockTx::new();
        tx.expect_lock_counter_owner().returning(|_| Ok(()));
        tx.expect_count_comments().returning(|_| Ok(2));
        tx.expect_store_counter()
            .returning(|_, _| Err(StorageError::Database("deadlock detected".into())));

        let metrics = CoreMetrics::default();
        let sync = CounterSynchronizer::new(Arc::new(MockStore::new()), metrics.clone());
        let err = sync
            .resync_in(&mut tx, CounterRef::PostComments(post))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::CounterResyncFailed { counter: CounterRef::PostComments(id), .. } if id == post
        ));
        assert_eq!(metrics.counter_resync_failures.get(), 1);
    }

    #[tokio::test]
    async fn standalone_resync_reports_begin_failure() {
        let post = PostId::generate();
        let mut store = MockStore::new();
        store
            .expect_begin()
            .returning(|| Err(StorageError::Database("pool timed out".into())));

        let sync = CounterSynchronizer::new(Arc::new(store), CoreMetrics::default());
        let err = sync.resync(CounterRef::PostLikes(post)).await.unwrap_err();
        assert!(matches!(err, DomainError::CounterResyncFailed { .. }));
    }

    #[tokio::test]
    async fn vanished_owner_row_fails_before_counting() {
        let comment = domains::CommentId::generate();
        let mut tx = MockTx::new();
        tx.expect_lock_counter_owner()
            .returning(move |_| Err(StorageError::NotFound("Comment", comment.to_string())));
        tx.expect_count_reactions().never();
        tx.expect_store_counter().never();

        let sync = CounterSynchronizer::new(Arc::new(MockStore::new()), CoreMetrics::default());
        let err = sync
            .resync_in(&mut tx, CounterRef::CommentLikes(comment))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::CounterResyncFailed { source: StorageError::NotFound("Comment", _), .. }
        ));
    }
}
