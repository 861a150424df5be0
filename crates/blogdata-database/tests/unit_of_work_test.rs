//! Integration tests for unit-of-work atomicity and isolation.

mod helpers;

use blogdata_core::error::ErrorKind;
use blogdata_core::query::Specification;
use blogdata_core::types::id::EntityId;
use blogdata_database::{MemoryStore, UnitStatus};
use blogdata_entity::post::specifications;
use blogdata_entity::{Comment, Post, Tag, User};

#[tokio::test]
async fn test_failed_commit_leaves_no_partial_writes() {
    let store = MemoryStore::new();
    let uow = helpers::begin(&store).await;

    let users = uow.repository::<User>().unwrap();
    let tags = uow.repository::<Tag>().unwrap();
    users
        .insert(&mut User::new("ann", "ann@example.com"))
        .await
        .unwrap();
    tags.insert(&mut Tag::new("rust")).await.unwrap();
    tags.insert(&mut Tag::new("Rust")).await.unwrap();

    let err = uow.commit().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    let ctx = err.context.expect("violation context");
    assert_eq!(ctx.entity_type.as_deref(), Some("tag"));
    assert!(ctx.entity_id.is_some());
    assert_eq!(uow.status().await, UnitStatus::RolledBack);

    let check = helpers::begin(&store).await;
    assert!(check.repository::<User>().unwrap().get_all(None).await.unwrap().is_empty());
    assert!(check.repository::<Tag>().unwrap().get_all(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dangling_reference_is_a_violation() {
    let store = MemoryStore::new();
    let uow = helpers::begin(&store).await;
    let mut ann = User::new("ann", "ann@example.com");
    uow.repository::<User>().unwrap().insert(&mut ann).await.unwrap();
    let mut comment = Comment::new(EntityId(4242), ann.id, "on nothing");
    uow.repository::<Comment>()
        .unwrap()
        .insert(&mut comment)
        .await
        .unwrap();

    let err = uow.commit().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    assert_eq!(err.context.unwrap().entity_id, Some(comment.id));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_referenced_author_cannot_be_deleted() {
    let store = MemoryStore::new();
    let author = helpers::seed_posts(&store, &helpers::numbered_titles(1)).await;

    let uow = helpers::begin(&store).await;
    uow.repository::<User>().unwrap().delete(&author).await.unwrap();
    let err = uow.commit().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    assert_eq!(store.len("user").await, 1);
}

#[tokio::test]
async fn test_units_see_only_committed_state() {
    let store = MemoryStore::new();
    let writer = helpers::begin(&store).await;
    let reader = helpers::begin(&store).await;

    writer
        .repository::<Tag>()
        .unwrap()
        .insert(&mut Tag::new("rust"))
        .await
        .unwrap();
    let tags = reader.repository::<Tag>().unwrap();
    assert!(tags.get_all(None).await.unwrap().is_empty());

    writer.commit().await.unwrap();
    assert_eq!(tags.get_all(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_writes_apply_in_call_order() {
    let store = MemoryStore::new();
    let uow = helpers::begin(&store).await;
    let tags = uow.repository::<Tag>().unwrap();

    // Renaming frees the name before the second insert reuses it.
    let mut first = Tag::new("rust");
    tags.insert(&mut first).await.unwrap();
    first.name = "rustlang".into();
    tags.update(&mut first).await.unwrap();
    tags.insert(&mut Tag::new("rust")).await.unwrap();
    uow.commit().await.unwrap();

    assert_eq!(store.len("tag").await, 2);
}

#[tokio::test]
async fn test_detailed_posts_across_repositories() {
    let store = MemoryStore::new();
    let uow = helpers::begin(&store).await;

    let mut ann = User::new("ann", "ann@example.com");
    let mut bob = User::new("bob", "bob@example.com");
    let users = uow.repository::<User>().unwrap();
    users.insert(&mut ann).await.unwrap();
    users.insert(&mut bob).await.unwrap();

    let mut rust = Tag::new("rust");
    uow.repository::<Tag>().unwrap().insert(&mut rust).await.unwrap();

    let posts = uow.repository::<Post>().unwrap();
    let mut tagged = Post::new("Ownership", "Borrowing explained", ann.id).with_tags([rust.id]);
    let mut plain = Post::new("Hello", "First post", bob.id);
    posts.insert(&mut tagged).await.unwrap();
    posts.insert(&mut plain).await.unwrap();

    let mut reply = Comment::new(tagged.id, bob.id, "Great read");
    uow.repository::<Comment>().unwrap().insert(&mut reply).await.unwrap();
    uow.commit().await.unwrap();
    uow.dispose().await.unwrap();

    let reader = helpers::begin(&store).await;
    let posts = reader.repository::<Post>().unwrap();
    let spec = specifications::tagged(rust.id).build().unwrap();
    let found = posts.get_all(Some(&spec)).await.unwrap();

    assert_eq!(found.len(), 1);
    let post = &found[0];
    assert_eq!(post.author.as_ref().unwrap().username, "ann");
    assert_eq!(post.comments.len(), 1);
    assert_eq!(post.comments[0].content, "Great read");
    assert_eq!(post.tags[0].name, "rust");

    let all = Specification::<Post>::all();
    assert_eq!(posts.count(&all).await.unwrap(), 2);
}

#[tokio::test]
async fn test_soft_deleted_posts_leave_published() {
    let store = MemoryStore::new();
    helpers::seed_posts(&store, &helpers::numbered_titles(3)).await;

    let uow = helpers::begin(&store).await;
    let posts = uow.repository::<Post>().unwrap();
    let mut victim = posts
        .first_or_default(&Specification::all())
        .await
        .unwrap()
        .unwrap();
    posts.soft_delete(&mut victim).await.unwrap();
    uow.commit().await.unwrap();

    let published = specifications::published().build().unwrap();
    assert_eq!(posts.count(&published).await.unwrap(), 2);
    let stored = posts.get_by_id(victim.id).await.unwrap().unwrap();
    assert!(stored.is_deleted);
}
