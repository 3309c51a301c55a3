//! Comment creation, deletion and rendering against the in-memory store,
//! including parent cycles written straight into storage.

use chrono::{Duration, Utc};

use domains::{
    AccessPolicy, Comment, CommentId, CommentNode, DomainError, Principal, Role, TargetRef, UserId,
};
use integration_tests::Forum;

fn ids(nodes: &[CommentNode]) -> Vec<CommentId> {
    nodes.iter().map(|n| n.comment.id).collect()
}

#[tokio::test]
async fn replies_render_under_their_parent() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;

    let root = forum.core.create_comment(&user, post.id, None, "root").await.unwrap();
    let reply = forum
        .core
        .create_comment(&user, post.id, Some(root.id), "reply")
        .await
        .unwrap();
    let nested = forum
        .core
        .create_comment(&user, post.id, Some(reply.id), "nested")
        .await
        .unwrap();

    let tree = forum.core.render_comment_tree(&user, post.id).await.unwrap();
    assert_eq!(ids(&tree), vec![root.id]);
    assert_eq!(ids(&tree[0].replies), vec![reply.id]);
    assert_eq!(ids(&tree[0].replies[0].replies), vec![nested.id]);
    assert_eq!(forum.reload_post(post.id).await.comments_count, 3);
}

#[tokio::test]
async fn parent_must_belong_to_the_same_post() {
    let forum = Forum::new();
    let first = forum.public_post().await;
    let second = forum.post(first.board_id).await;
    let user = forum.member().await;
    let foreign = forum.core.create_comment(&user, first.id, None, "x").await.unwrap();

    let err = forum
        .core
        .create_comment(&user, second.id, Some(foreign.id), "y")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::CrossPostParent { .. }));
    assert_eq!(forum.reload_post(second.id).await.comments_count, 0);
}

#[tokio::test]
async fn blank_comments_and_missing_parents_are_rejected() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;

    let blank = forum.core.create_comment(&user, post.id, None, "   ").await.unwrap_err();
    assert!(matches!(blank, DomainError::Validation(_)));

    let orphan = forum
        .core
        .create_comment(&user, post.id, Some(CommentId::generate()), "hi")
        .await
        .unwrap_err();
    assert!(matches!(orphan, DomainError::NotFound("Comment", _)));
}

#[tokio::test]
async fn anonymous_and_unauthorized_principals_cannot_comment() {
    let forum = Forum::new();
    let board = forum.board(AccessPolicy::Registered).await;
    let post = forum.post(board.id).await;

    let err = forum
        .core
        .create_comment(&Principal::Anonymous, post.id, None, "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Unauthenticated));

    let render = forum
        .core
        .render_comment_tree(&Principal::Anonymous, post.id)
        .await
        .unwrap_err();
    assert!(matches!(render, DomainError::PolicyDenied(_)));
}

#[tokio::test]
async fn deleting_a_comment_orphans_its_replies_and_drops_its_likes() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;

    let parent = forum.core.create_comment(&user, post.id, None, "parent").await.unwrap();
    let child = forum
        .core
        .create_comment(&user, post.id, Some(parent.id), "child")
        .await
        .unwrap();
    let grandchild = forum
        .core
        .create_comment(&user, post.id, Some(child.id), "grandchild")
        .await
        .unwrap();
    forum
        .core
        .toggle_reaction(&user, TargetRef::Comment(parent.id))
        .await
        .unwrap();

    forum.core.delete_comment(&user, parent.id).await.unwrap();

    assert_eq!(forum.reload_post(post.id).await.comments_count, 2);
    assert_eq!(forum.store.reaction_rows(TargetRef::Comment(parent.id)).await, 0);

    let tree = forum.core.render_comment_tree(&user, post.id).await.unwrap();
    assert_eq!(ids(&tree), vec![child.id]);
    assert_eq!(ids(&tree[0].replies), vec![grandchild.id]);
}

#[tokio::test]
async fn injected_parent_cycle_renders_without_hanging() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;

    let root = forum.core.create_comment(&user, post.id, None, "root").await.unwrap();
    let a = forum.core.create_comment(&user, post.id, None, "a").await.unwrap();
    let b = forum.core.create_comment(&user, post.id, Some(a.id), "b").await.unwrap();
    let c = forum.core.create_comment(&user, post.id, Some(b.id), "c").await.unwrap();

    // a -> c -> b -> a
    forum.store.set_comment_parent(a.id, Some(c.id)).await.unwrap();

    let render = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        forum.core.render_comment_tree(&user, post.id),
    )
    .await
    .expect("render terminates")
    .unwrap();

    assert_eq!(ids(&render), vec![root.id]);
    let rendered: usize = render.iter().map(CommentNode::size).sum();
    assert_eq!(rendered, 1);
}

#[tokio::test]
async fn self_parented_comment_is_not_rendered_twice() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let user = forum.member().await;

    let t0 = Utc::now();
    let looped = Comment {
        id: CommentId::generate(),
        post_id: post.id,
        user_id: UserId::generate(),
        parent_id: None,
        content: "loop".into(),
        likes_count: 0,
        created_at: t0,
    };
    let fine = Comment {
        id: CommentId::generate(),
        parent_id: None,
        created_at: t0 + Duration::seconds(1),
        ..looped.clone()
    };
    forum.store.seed_comment(looped.clone()).await;
    forum.store.seed_comment(fine.clone()).await;
    forum.store.set_comment_parent(looped.id, Some(looped.id)).await.unwrap();

    let tree = forum.core.render_comment_tree(&user, post.id).await.unwrap();
    assert_eq!(ids(&tree), vec![fine.id]);
}

#[tokio::test]
async fn only_the_author_or_a_moderator_may_delete_a_comment() {
    let forum = Forum::new();
    let post = forum.public_post().await;
    let author = forum.member().await;
    let stranger = forum.member().await;
    let moderator = forum.principal(UserId::generate(), Role::Moderator, false).await;

    let first = forum.core.create_comment(&author, post.id, None, "one").await.unwrap();
    let second = forum.core.create_comment(&author, post.id, None, "two").await.unwrap();

    let anonymous = forum
        .core
        .delete_comment(&Principal::Anonymous, first.id)
        .await
        .unwrap_err();
    assert!(matches!(anonymous, DomainError::Unauthenticated));

    let denied = forum.core.delete_comment(&stranger, first.id).await.unwrap_err();
    assert!(matches!(denied, DomainError::Forbidden(_)));
    assert_eq!(forum.reload_post(post.id).await.comments_count, 2);

    forum.core.delete_comment(&moderator, first.id).await.unwrap();
    forum.core.delete_comment(&author, second.id).await.unwrap();
    assert_eq!(forum.reload_post(post.id).await.comments_count, 0);
}
