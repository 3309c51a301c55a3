//! Publishing, pinning and deleting posts through `ForumCore`.

use bytes::Bytes;

use domains::{AccessPolicy, CacheCategory, DomainError, Principal, Role, TargetRef, UserId};
use integration_tests::Forum;
use services::{CacheKey, CacheRequest, CacheScope};

fn board_feed_key(board: domains::BoardId) -> CacheKey {
    let path = format!("/boards/{board}/posts");
    CacheKey::derive(
        CacheCategory::BoardPosts,
        CacheScope::Board(board),
        &CacheRequest {
            endpoint: "boards.posts",
            path: &path,
            query: &[],
            principal: &Principal::Anonymous,
        },
    )
}

#[tokio::test]
async fn publishing_invalidates_the_board_feed() {
    let forum = Forum::new();
    let board = forum.board(AccessPolicy::Public).await;
    let author = forum.member().await;
    let key = board_feed_key(board.id);
    forum.core.cache_put(&key, Bytes::from_static(b"[]")).await;

    let post = forum
        .core
        .publish_post(&author, board.id, "  Hello  ", "first!")
        .await
        .unwrap();

    assert_eq!(post.title, "Hello");
    assert_eq!(post.author_id, author.user_id().unwrap());
    assert!(forum.core.cache_get(&key).await.is_none());
    assert_eq!(forum.reload_post(post.id).await, post);
}

#[tokio::test]
async fn publishing_needs_a_title_and_board_access() {
    let forum = Forum::new();
    let open = forum.board(AccessPolicy::Public).await;
    let closed = forum.board(AccessPolicy::Users).await;
    let author = forum.member().await;

    let blank = forum.core.publish_post(&author, open.id, " ", "x").await.unwrap_err();
    assert!(matches!(blank, DomainError::Validation(_)));

    let denied = forum.core.publish_post(&author, closed.id, "t", "x").await.unwrap_err();
    assert!(matches!(denied, DomainError::PolicyDenied(_)));

    let anonymous = forum
        .core
        .publish_post(&Principal::Anonymous, open.id, "t", "x")
        .await
        .unwrap_err();
    assert!(matches!(anonymous, DomainError::Unauthenticated));
}

#[tokio::test]
async fn pin_and_feature_flip_independently() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let admin = forum.admin().await;

    assert!(forum.core.toggle_pin(&admin, post.id).await.unwrap());
    assert!(forum.core.toggle_feature(&admin, post.id).await.unwrap());
    assert!(!forum.core.toggle_pin(&admin, post.id).await.unwrap());

    let reloaded = forum.reload_post(post.id).await;
    assert!(!reloaded.is_pinned);
    assert!(reloaded.is_featured);
}

#[tokio::test]
async fn deleting_a_post_removes_everything_hanging_off_it() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;
    let moderator = forum.principal(UserId::generate(), Role::Moderator, false).await;
    let comment = forum.core.create_comment(&user, post.id, None, "hi").await.unwrap();
    forum.core.toggle_reaction(&user, TargetRef::Post(post.id)).await.unwrap();
    forum
        .core
        .toggle_reaction(&user, TargetRef::Comment(comment.id))
        .await
        .unwrap();
    forum.core.toggle_favorite(&user, post.id).await.unwrap();

    forum.core.delete_post(&moderator, post.id).await.unwrap();

    assert_eq!(forum.store.reaction_rows(TargetRef::Post(post.id)).await, 0);
    assert_eq!(forum.store.reaction_rows(TargetRef::Comment(comment.id)).await, 0);
    assert_eq!(forum.store.favorite_rows(post.id).await, 0);

    let gone = forum.core.render_comment_tree(&user, post.id).await.unwrap_err();
    assert!(matches!(gone, DomainError::NotFound("Post", _)));

    let again = forum.core.delete_post(&moderator, post.id).await.unwrap_err();
    assert!(matches!(again, DomainError::NotFound("Post", _)));
}

#[tokio::test]
async fn pin_and_feature_are_reserved_to_administrators() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let member = forum.member().await;
    let moderator = forum.principal(UserId::generate(), Role::Moderator, false).await;

    let anonymous = forum
        .core
        .toggle_pin(&Principal::Anonymous, post.id)
        .await
        .unwrap_err();
    assert!(matches!(anonymous, DomainError::Unauthenticated));

    for principal in [&member, &moderator] {
        let pin = forum.core.toggle_pin(principal, post.id).await.unwrap_err();
        assert!(matches!(pin, DomainError::Forbidden(_)));
        let feature = forum.core.toggle_feature(principal, post.id).await.unwrap_err();
        assert!(matches!(feature, DomainError::Forbidden(_)));
    }

    let reloaded = forum.reload_post(post.id).await;
    assert!(!reloaded.is_pinned);
    assert!(!reloaded.is_featured);

    let superuser = forum.principal(UserId::generate(), Role::Member, true).await;
    assert!(forum.core.toggle_pin(&superuser, post.id).await.unwrap());
}

#[tokio::test]
async fn strangers_cannot_delete_a_post_but_its_author_can() {
    let forum = Forum::new();
    let board = forum.board(AccessPolicy::Public).await;
    let author = forum.member().await;
    let stranger = forum.member().await;
    let post = forum
        .core
        .publish_post(&author, board.id, "mine", "body")
        .await
        .unwrap();

    let denied = forum.core.delete_post(&stranger, post.id).await.unwrap_err();
    assert!(matches!(denied, DomainError::Forbidden(_)));
    let anonymous = forum
        .core
        .delete_post(&Principal::Anonymous, post.id)
        .await
        .unwrap_err();
    assert!(matches!(anonymous, DomainError::Unauthenticated));
    assert_eq!(forum.reload_post(post.id).await, post);

    forum.core.delete_post(&author, post.id).await.unwrap();
    let gone = forum.core.delete_post(&author, post.id).await.unwrap_err();
    assert!(matches!(gone, DomainError::NotFound("Post", _)));
}
