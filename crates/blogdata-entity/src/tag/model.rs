//! Tag entity model.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blogdata_core::result::AppResult;
use blogdata_core::traits::entity::{Entity, FieldTable, Relation};
use blogdata_core::traits::store::{StoredRecord, UniqueKey};
use blogdata_core::types::id::EntityId;

use crate::post::Post;
use crate::relation;

/// A tag that posts can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Unique tag identifier.
    #[serde(default)]
    pub id: EntityId,
    /// Unique tag name.
    pub name: String,
    /// When the tag was created.
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    /// Tagged posts, when included.
    #[serde(default, skip_serializing)]
    pub posts: Vec<Post>,
}

impl Tag {
    /// Create a not-yet-inserted tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            name: name.into(),
            created_on: Utc::now(),
            posts: Vec::new(),
        }
    }
}

static TAG_FIELDS: LazyLock<FieldTable<Tag>> = LazyLock::new(|| {
    FieldTable::<Tag>::new(Tag::TYPE_NAME)
        .field("id", |t| t.id.into())
        .field("name", |t| t.name.clone().into())
        .field("createdOn", |t| t.created_on.into())
        .field("postCount", |t| (t.posts.len() as i64).into())
});

fn load_posts(tag: &mut Tag, posts: &[StoredRecord]) -> AppResult<()> {
    tag.posts = relation::collect_containing(posts, "tagIds", tag.id)?;
    Ok(())
}

static TAG_RELATIONS: [Relation<Tag>; 1] = [Relation {
    name: "posts",
    target: Post::TYPE_NAME,
    load: load_posts,
}];

impl Entity for Tag {
    const TYPE_NAME: &'static str = "tag";

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn fields() -> &'static FieldTable<Self> {
        &TAG_FIELDS
    }

    fn relations() -> &'static [Relation<Self>] {
        &TAG_RELATIONS
    }

    fn searchable_fields() -> &'static [&'static str] {
        &["name"]
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("name", self.name.trim().to_lowercase())]
    }

    fn on_created(&mut self, at: DateTime<Utc>) {
        self.created_on = at;
    }
}
