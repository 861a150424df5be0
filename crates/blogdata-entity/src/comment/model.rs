//! Comment entity model.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blogdata_core::result::AppResult;
use blogdata_core::traits::entity::{Entity, FieldTable, Relation};
use blogdata_core::traits::store::{Reference, StoredRecord};
use blogdata_core::types::id::EntityId;

use crate::post::Post;
use crate::relation;
use crate::user::User;

/// A comment left on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Unique comment identifier.
    #[serde(default)]
    pub id: EntityId,
    /// The post commented on.
    pub post_id: EntityId,
    /// The commenting user.
    pub author_id: EntityId,
    /// Comment text.
    pub content: String,
    /// When the comment was created.
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    /// When the comment was last modified.
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(default)]
    pub is_deleted: bool,
    /// When the comment was soft-deleted.
    #[serde(default)]
    pub deleted_on: Option<DateTime<Utc>>,
    /// Author, when included.
    #[serde(default, skip_serializing)]
    pub author: Option<User>,
    /// Post, when included.
    #[serde(default, skip_serializing)]
    pub post: Option<Box<Post>>,
}

impl Comment {
    /// Create a not-yet-inserted comment.
    pub fn new(post_id: EntityId, author_id: EntityId, content: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            post_id,
            author_id,
            content: content.into(),
            created_on: Utc::now(),
            modified_on: None,
            is_deleted: false,
            deleted_on: None,
            author: None,
            post: None,
        }
    }
}

static COMMENT_FIELDS: LazyLock<FieldTable<Comment>> = LazyLock::new(|| {
    FieldTable::<Comment>::new(Comment::TYPE_NAME)
        .field("id", |c| c.id.into())
        .field("postId", |c| c.post_id.into())
        .field("authorId", |c| c.author_id.into())
        .field("content", |c| c.content.clone().into())
        .field("createdOn", |c| c.created_on.into())
        .field("modifiedOn", |c| c.modified_on.into())
        .field("isDeleted", |c| c.is_deleted.into())
        .field_via("authorName", "author", |c| {
            c.author.as_ref().map(|u| u.username.clone()).into()
        })
});

fn load_author(comment: &mut Comment, users: &[StoredRecord]) -> AppResult<()> {
    comment.author = relation::find_by_id(users, comment.author_id)?;
    Ok(())
}

fn load_post(comment: &mut Comment, posts: &[StoredRecord]) -> AppResult<()> {
    comment.post = relation::find_by_id::<Post>(posts, comment.post_id)?.map(Box::new);
    Ok(())
}

static COMMENT_RELATIONS: [Relation<Comment>; 2] = [
    Relation {
        name: "author",
        target: User::TYPE_NAME,
        load: load_author,
    },
    Relation {
        name: "post",
        target: Post::TYPE_NAME,
        load: load_post,
    },
];

impl Entity for Comment {
    const TYPE_NAME: &'static str = "comment";

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn fields() -> &'static FieldTable<Self> {
        &COMMENT_FIELDS
    }

    fn relations() -> &'static [Relation<Self>] {
        &COMMENT_RELATIONS
    }

    fn searchable_fields() -> &'static [&'static str] {
        &["content", "authorName"]
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            Reference::new(Post::TYPE_NAME, self.post_id),
            Reference::new(User::TYPE_NAME, self.author_id),
        ]
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
