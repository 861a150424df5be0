//! Search one entity table from the command line.

use std::sync::Arc;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use blogdata_core::config::{AppConfig, StoreDriver};
use blogdata_core::error::AppError;
use blogdata_core::query::{SearchQuery, Specification};
use blogdata_core::traits::entity::Entity;
use blogdata_core::traits::store::Store;
use blogdata_core::types::filter::{SearchValue, SortParameters, TableFilter};
use blogdata_core::types::sorting::OrderingCriterion;
use blogdata_database::{UnitOfWork, open_store};
use blogdata_entity::{Comment, Post, Tag, User};

use super::seed::{self, SeedArgs};
use crate::output::{self, OutputFormat};

/// Entity tables that can be searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntityKind {
    /// Users
    Users,
    /// Posts
    Posts,
    /// Comments
    Comments,
    /// Tags
    Tags,
}

/// Arguments for the search command
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Table to search
    #[arg(value_enum)]
    pub entity: EntityKind,

    /// Free-text search term
    #[arg(short, long)]
    pub term: Option<String>,

    /// Sort key as `field` or `field:asc|desc`; repeat for tie-breakers
    #[arg(short, long = "sort")]
    pub sort: Vec<OrderingCriterion>,

    /// Relation to load, e.g. `author`; repeatable
    #[arg(short, long = "include")]
    pub include: Vec<String>,

    /// Zero-based page number
    #[arg(short, long, default_value_t = 0)]
    pub page: i64,

    /// Page size (defaults to paging.default_page_size)
    #[arg(long)]
    pub size: Option<i64>,
}

impl SearchArgs {
    /// The request in its caller-facing wire shape.
    fn table_filter(&self) -> TableFilter {
        let join = |parts: Vec<&str>| (!parts.is_empty()).then(|| parts.join(","));
        TableFilter {
            search: SearchValue {
                value: self.term.clone(),
            },
            sort_parameters: SortParameters {
                sort_by: join(self.sort.iter().map(|c| c.field.as_str()).collect()),
                order_by: join(self.sort.iter().map(|c| c.direction.as_str()).collect()),
                current_page: self.page,
                page_size: self.size,
            },
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    phone: String,
    created: String,
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.0,
            username: u.username.clone(),
            email: u.email.clone(),
            phone: u.phone_number.clone().unwrap_or_default(),
            created: u.created_on.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct PostRow {
    id: i64,
    title: String,
    author: String,
    tags: String,
    comments: String,
    deleted: bool,
}

impl From<&Post> for PostRow {
    fn from(p: &Post) -> Self {
        let tags = if p.tags.is_empty() {
            format!("{} ids", p.tag_ids.len())
        } else {
            p.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
        };
        Self {
            id: p.id.0,
            title: p.title.clone(),
            author: p
                .author
                .as_ref()
                .map_or_else(|| format!("#{}", p.author_id), |u| u.label().to_string()),
            tags,
            comments: p.comments.len().to_string(),
            deleted: p.is_deleted,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct CommentRow {
    id: i64,
    post: i64,
    author: String,
    content: String,
}

impl From<&Comment> for CommentRow {
    fn from(c: &Comment) -> Self {
        Self {
            id: c.id.0,
            post: c.post_id.0,
            author: c
                .author
                .as_ref()
                .map_or_else(|| format!("#{}", c.author_id), |u| u.label().to_string()),
            content: c.content.clone(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct TagRow {
    id: i64,
    name: String,
    posts: String,
}

impl From<&Tag> for TagRow {
    fn from(t: &Tag) -> Self {
        Self {
            id: t.id.0,
            name: t.name.clone(),
            posts: t.posts.len().to_string(),
        }
    }
}

async fn run<T, R>(
    uow: &UnitOfWork,
    args: &SearchArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError>
where
    T: Entity,
    R: Serialize + Tabled + for<'a> From<&'a T>,
{
    let query = SearchQuery::<T>::from_table_filter(&args.table_filter(), &config.paging)?;
    let spec = args
        .include
        .iter()
        .fold(Specification::<T>::builder(), |b, name| b.include(name.as_str()))
        .build()?;
    let page = uow.repository::<T>()?.search_spec(&spec, &query).await?;
    output::print_page(&page.map(|item| R::from(&item)), format);
    Ok(())
}

/// Execute the search command
pub async fn execute(
    args: &SearchArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let store: Arc<dyn Store> = open_store(&config.database).await?;
    if config.database.driver == StoreDriver::Memory {
        output::print_warning("Memory driver: searching freshly seeded demo data.");
        let demo = SeedArgs {
            authors: 3,
            posts: 25,
        };
        seed::seed_demo(Arc::clone(&store), config, &demo).await?;
    }

    let uow = seed::begin(store, config).await?;
    let result = match args.entity {
        EntityKind::Users => run::<User, UserRow>(&uow, args, config, format).await,
        EntityKind::Posts => run::<Post, PostRow>(&uow, args, config, format).await,
        EntityKind::Comments => run::<Comment, CommentRow>(&uow, args, config, format).await,
        EntityKind::Tags => run::<Tag, TagRow>(&uow, args, config, format).await,
    };
    uow.dispose().await?;
    result
}
