//! Shared helpers for the data-access integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use blogdata_core::traits::store::Store;
use blogdata_database::{MemoryStore, UnitOfWork, UnitOfWorkBuilder};
use blogdata_entity::{Comment, Post, Tag, User};

/// A unit of work builder with every blog entity registered.
pub fn blog_unit(store: Arc<dyn Store>) -> UnitOfWorkBuilder {
    UnitOfWork::builder(store)
        .register::<User>()
        .register::<Post>()
        .register::<Comment>()
        .register::<Tag>()
}

/// Begin a unit of work over a memory store.
pub async fn begin(store: &MemoryStore) -> UnitOfWork {
    blog_unit(Arc::new(store.clone()))
        .begin()
        .await
        .expect("Failed to begin unit of work")
}

/// Insert one author and a post per title, then commit. Posts are inserted
/// in reverse title order so id order and title order differ.
pub async fn seed_posts(store: &MemoryStore, titles: &[String]) -> User {
    let uow = begin(store).await;
    let mut author = User::new("author", "author@example.com");
    uow.repository::<User>()
        .unwrap()
        .insert(&mut author)
        .await
        .expect("Failed to insert author");

    let mut posts: Vec<Post> = titles
        .iter()
        .rev()
        .map(|t| Post::new(t.clone(), "Lorem ipsum", author.id))
        .collect();
    uow.repository::<Post>()
        .unwrap()
        .insert_many(&mut posts)
        .await
        .expect("Failed to insert posts");

    uow.commit().await.expect("Failed to commit seed data");
    uow.dispose().await.expect("Failed to dispose");
    author
}

/// `"Post 01"` through `"Post {n:02}"`.
pub fn numbered_titles(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Post {i:02}")).collect()
}
