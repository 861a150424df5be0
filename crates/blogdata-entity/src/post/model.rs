//! Post entity model.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blogdata_core::result::AppResult;
use blogdata_core::traits::entity::{Entity, FieldTable, Relation};
use blogdata_core::traits::store::{Reference, StoredRecord};
use blogdata_core::types::id::EntityId;

use crate::comment::Comment;
use crate::relation;
use crate::tag::Tag;
use crate::user::User;

/// A blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Unique post identifier.
    #[serde(default)]
    pub id: EntityId,
    /// Post title.
    pub title: String,
    /// Post body.
    #[serde(default)]
    pub content: String,
    /// The author.
    pub author_id: EntityId,
    /// Tags attached to the post.
    #[serde(default)]
    pub tag_ids: Vec<EntityId>,
    /// When the post was created.
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    /// When the post was last modified.
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(default)]
    pub is_deleted: bool,
    /// When the post was soft-deleted.
    #[serde(default)]
    pub deleted_on: Option<DateTime<Utc>>,
    /// Author, when included.
    #[serde(default, skip_serializing)]
    pub author: Option<User>,
    /// Comments, when included.
    #[serde(default, skip_serializing)]
    pub comments: Vec<Comment>,
    /// Tags, when included.
    #[serde(default, skip_serializing)]
    pub tags: Vec<Tag>,
}

impl Post {
    /// Create a not-yet-inserted post.
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_id: EntityId) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            title: title.into(),
            content: content.into(),
            author_id,
            tag_ids: Vec::new(),
            created_on: Utc::now(),
            modified_on: None,
            is_deleted: false,
            deleted_on: None,
            author: None,
            comments: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Attach tags by identifier.
    pub fn with_tags(mut self, tag_ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.tag_ids = tag_ids.into_iter().collect();
        self
    }
}

static POST_FIELDS: LazyLock<FieldTable<Post>> = LazyLock::new(|| {
    FieldTable::<Post>::new(Post::TYPE_NAME)
        .field("id", |p| p.id.into())
        .field("title", |p| p.title.clone().into())
        .field("content", |p| p.content.clone().into())
        .field("authorId", |p| p.author_id.into())
        .field("createdOn", |p| p.created_on.into())
        .field("modifiedOn", |p| p.modified_on.into())
        .field("isDeleted", |p| p.is_deleted.into())
        .field("deletedOn", |p| p.deleted_on.into())
});

fn load_author(post: &mut Post, users: &[StoredRecord]) -> AppResult<()> {
    post.author = relation::find_by_id(users, post.author_id)?;
    Ok(())
}

fn load_comments(post: &mut Post, comments: &[StoredRecord]) -> AppResult<()> {
    post.comments = relation::collect_where(comments, "postId", post.id)?;
    Ok(())
}

fn load_tags(post: &mut Post, tags: &[StoredRecord]) -> AppResult<()> {
    post.tags = relation::collect_ids(tags, &post.tag_ids)?;
    Ok(())
}

static POST_RELATIONS: [Relation<Post>; 3] = [
    Relation {
        name: "author",
        target: User::TYPE_NAME,
        load: load_author,
    },
    Relation {
        name: "comments",
        target: Comment::TYPE_NAME,
        load: load_comments,
    },
    Relation {
        name: "tags",
        target: Tag::TYPE_NAME,
        load: load_tags,
    },
];

impl Entity for Post {
    const TYPE_NAME: &'static str = "post";

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn fields() -> &'static FieldTable<Self> {
        &POST_FIELDS
    }

    fn relations() -> &'static [Relation<Self>] {
        &POST_RELATIONS
    }

    fn searchable_fields() -> &'static [&'static str] {
        &["title", "content"]
    }

    fn references(&self) -> Vec<Reference> {
        std::iter::once(Reference::new(User::TYPE_NAME, self.author_id))
            .chain(self.tag_ids.iter().map(|id| Reference::new(Tag::TYPE_NAME, *id)))
            .collect()
    }

    fn on_created(&mut self, at: DateTime<Utc>) {
        self.created_on = at;
        self.modified_on = None;
    }

    fn on_modified(&mut self, at: DateTime<Utc>) {
        self.modified_on = Some(at);
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) -> bool {
        self.is_deleted = true;
        self.deleted_on = Some(at);
        true
    }
}
