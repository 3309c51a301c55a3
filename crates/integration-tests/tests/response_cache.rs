//! Cached views go stale exactly when the data behind them changes, and a
//! backend without prefix deletes degrades to TTL expiry.

use std::time::Duration;

use bytes::Bytes;

use domains::{CacheCategory, DomainError, Post, Principal, TargetRef, ToggleState};
use integration_tests::Forum;
use services::{CacheKey, CacheRequest, CacheScope, CacheTtls};
use storage_adapters::MemoryCache;

fn detail_key(post: &Post, principal: &Principal) -> CacheKey {
    let path = format!("/posts/{}/", post.id);
    CacheKey::derive(
        CacheCategory::PostDetail,
        CacheScope::Post(post.id),
        &CacheRequest {
            endpoint: "posts.detail",
            path: &path,
            query: &[],
            principal,
        },
    )
}

fn board_key(post: &Post, principal: &Principal) -> CacheKey {
    let path = format!("/boards/{}/posts", post.board_id);
    let query = vec![("page".to_string(), "1".to_string())];
    CacheKey::derive(
        CacheCategory::BoardPosts,
        CacheScope::Board(post.board_id),
        &CacheRequest {
            endpoint: "boards.posts",
            path: &path,
            query: &query,
            principal,
        },
    )
}

fn home_key(principal: &Principal) -> CacheKey {
    CacheKey::derive(
        CacheCategory::HomePosts,
        CacheScope::All,
        &CacheRequest {
            endpoint: "posts.home",
            path: "/",
            query: &[],
            principal,
        },
    )
}

#[tokio::test]
async fn toggling_a_like_drops_the_affected_views_only() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let other = forum.public_post().await;
    let viewer = Principal::Anonymous;
    let user = forum.member().await;

    let payload = Bytes::from_static(b"{\"likes\":0}");
    let keys = [home_key(&viewer), board_key(&post, &viewer), detail_key(&post, &viewer)];
    for key in &keys {
        forum.core.cache_put(key, payload.clone()).await;
    }
    let unrelated = [board_key(&other, &viewer), detail_key(&other, &viewer)];
    for key in &unrelated {
        forum.core.cache_put(key, payload.clone()).await;
    }

    forum
        .core
        .toggle_reaction(&user, TargetRef::Post(post.id))
        .await
        .unwrap();

    for key in &keys {
        assert!(forum.core.cache_get(key).await.is_none(), "{key} still cached");
    }
    for key in &unrelated {
        assert!(forum.core.cache_get(key).await.is_some(), "{key} was dropped");
    }
}

#[tokio::test]
async fn new_comment_invalidates_its_post_detail() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;
    let key = detail_key(&post, &user);

    forum.core.cache_put(&key, Bytes::from_static(b"old")).await;
    forum.core.create_comment(&user, post.id, None, "hello").await.unwrap();

    assert!(forum.core.cache_get(&key).await.is_none());
}

#[tokio::test]
async fn views_are_keyed_per_principal() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let alice = forum.member().await;
    let bob = forum.member().await;

    forum
        .core
        .cache_put(&detail_key(&post, &alice), Bytes::from_static(b"alice"))
        .await;

    assert!(forum.core.cache_get(&detail_key(&post, &bob)).await.is_none());
    assert_eq!(
        forum.core.cache_get(&detail_key(&post, &alice)).await,
        Some(Bytes::from_static(b"alice"))
    );
}

#[tokio::test]
async fn exact_key_backend_keeps_stale_views_until_ttl() {
    let ttls = CacheTtls {
        post_detail: Duration::from_millis(80),
        ..CacheTtls::default()
    };
    let forum = Forum::with_cache(MemoryCache::exact_only(), ttls);
    let post = forum.public_post().await;
    let user = forum.member().await;
    let key = detail_key(&post, &user);

    forum.core.cache_put(&key, Bytes::from_static(b"{\"likes\":0}")).await;

    // the mutation itself succeeds even though invalidation cannot happen
    let state = forum
        .core
        .toggle_reaction(&user, TargetRef::Post(post.id))
        .await
        .unwrap();
    assert_eq!(state, ToggleState::Liked);
    assert_eq!(forum.reload_post(post.id).await.likes_count, 1);

    // stale, but bounded by the category TTL
    assert!(forum.core.cache_get(&key).await.is_some());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(forum.core.cache_get(&key).await.is_none());

    let err = forum
        .core
        .cache_invalidate(CacheCategory::PostDetail, Some(CacheScope::Post(post.id)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::CacheInvalidationUnsupported(CacheCategory::PostDetail)
    ));

    let metrics = forum.metrics_text();
    assert!(metrics.contains("forum_cache_invalidations_unsupported_total{category=\"post_detail\"} 2"));
}

#[tokio::test]
async fn get_or_compute_fills_once() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let key = detail_key(&post, &Principal::Anonymous);
    let cache = forum.core.cache();

    let first = cache
        .get_or_compute(&key, || async {
            Ok::<_, DomainError>(Bytes::from_static(b"rendered"))
        })
        .await;
    assert_eq!(first.unwrap(), Bytes::from_static(b"rendered"));

    let second = cache
        .get_or_compute(&key, || async {
            Err::<Bytes, _>(DomainError::Validation("recomputed a cached view".into()))
        })
        .await;
    assert_eq!(second.unwrap(), Bytes::from_static(b"rendered"));
    assert_eq!(forum.cache.len(), 1);
}
