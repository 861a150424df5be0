//! Demo data seeding.

use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use blogdata_core::config::AppConfig;
use blogdata_core::error::AppError;
use blogdata_core::traits::store::Store;
use blogdata_database::{UnitOfWork, open_store};
use blogdata_entity::{Comment, Post, Tag, User};

use crate::output::{self, OutputFormat};

const AUTHORS: [&str; 5] = ["alice", "bob", "carol", "dave", "erin"];
const TAGS: [&str; 4] = ["rust", "databases", "async", "testing"];
const TOPICS: [&str; 6] = [
    "Ownership in practice",
    "Paging large result sets",
    "Sorting by many keys",
    "Transactions without surprises",
    "Searching text fields",
    "Testing storage code",
];

/// Arguments for the seed command
#[derive(Debug, Args)]
pub struct SeedArgs {
    /// Number of authors to create (at most 5)
    #[arg(long, default_value_t = 3)]
    pub authors: usize,

    /// Number of posts to create
    #[arg(long, default_value_t = 25)]
    pub posts: usize,
}

/// What a seed run inserted.
#[derive(Debug, Default, Serialize, Tabled)]
pub struct SeedSummary {
    pub(crate) users: usize,
    pub(crate) tags: usize,
    pub(crate) posts: usize,
    pub(crate) comments: usize,
}

/// Open a unit of work over `store` with every blog entity registered.
pub async fn begin(store: Arc<dyn Store>, config: &AppConfig) -> Result<UnitOfWork, AppError> {
    UnitOfWork::builder(store)
        .with_config(&config.database)
        .register::<User>()
        .register::<Tag>()
        .register::<Post>()
        .register::<Comment>()
        .begin()
        .await
}

/// Insert demo data into `store` and commit it in one unit of work.
pub async fn seed_demo(
    store: Arc<dyn Store>,
    config: &AppConfig,
    args: &SeedArgs,
) -> Result<SeedSummary, AppError> {
    if args.authors == 0 || args.authors > AUTHORS.len() {
        return Err(AppError::configuration(format!(
            "--authors must be between 1 and {}",
            AUTHORS.len()
        )));
    }

    let uow = begin(store, config).await?;

    let mut users: Vec<User> = AUTHORS[..args.authors]
        .iter()
        .map(|name| User::new(*name, format!("{name}@example.com")))
        .collect();
    uow.repository::<User>()?.insert_many(&mut users).await?;

    let mut tags: Vec<Tag> = TAGS.iter().map(|name| Tag::new(*name)).collect();
    uow.repository::<Tag>()?.insert_many(&mut tags).await?;

    let mut posts: Vec<Post> = (0..args.posts)
        .map(|i| {
            let author = &users[i % users.len()];
            let topic = TOPICS[i % TOPICS.len()];
            Post::new(
                format!("{topic} #{:02}", i + 1),
                format!("{} writes about {}.", author.username, topic.to_lowercase()),
                author.id,
            )
            .with_tags([tags[i % tags.len()].id, tags[(i + 1) % tags.len()].id])
        })
        .collect();
    uow.repository::<Post>()?.insert_many(&mut posts).await?;

    let mut comments: Vec<Comment> = posts
        .iter()
        .enumerate()
        .map(|(i, post)| {
            let commenter = &users[(i + 1) % users.len()];
            Comment::new(post.id, commenter.id, format!("Thanks, {}!", post.title))
        })
        .collect();
    uow.repository::<Comment>()?.insert_many(&mut comments).await?;

    uow.commit().await?;
    uow.dispose().await?;

    let summary = SeedSummary {
        users: users.len(),
        tags: tags.len(),
        posts: posts.len(),
        comments: comments.len(),
    };
    info!(
        users = summary.users,
        tags = summary.tags,
        posts = summary.posts,
        comments = summary.comments,
        "Demo data seeded"
    );
    Ok(summary)
}

/// Execute the seed command
pub async fn execute(
    args: &SeedArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let store = open_store(&config.database).await?;
    let driver = store.driver_name().to_string();
    if driver == "memory" {
        output::print_warning("The memory driver keeps nothing once this command exits.");
    }
    let summary = seed_demo(store, config, args).await?;
    output::print_kv("Driver", &driver);
    output::print_list(&[summary], format);
    output::print_success("Demo data committed.");
    Ok(())
}
