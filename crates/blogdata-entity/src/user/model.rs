//! User entity model.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blogdata_core::traits::entity::{Entity, FieldTable};
use blogdata_core::traits::store::UniqueKey;
use blogdata_core::types::id::EntityId;

/// A registered blog user.
///
/// Credentials live in the identity subsystem; this record only carries
/// the profile data posts and comments refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user identifier.
    #[serde(default)]
    pub id: EntityId,
    /// Unique login name.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Phone number (optional).
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// When the user was created.
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    /// When the user was last modified.
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,
}

impl User {
    /// Create a not-yet-inserted user.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            username: username.into(),
            email: email.into(),
            phone_number: None,
            display_name: None,
            created_on: Utc::now(),
            modified_on: None,
        }
    }

    /// Set the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Name to show next to posts and comments.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

static USER_FIELDS: LazyLock<FieldTable<User>> = LazyLock::new(|| {
    FieldTable::<User>::new(User::TYPE_NAME)
        .field("id", |u| u.id.into())
        .field("username", |u| u.username.clone().into())
        .field("email", |u| u.email.clone().into())
        .field("phoneNumber", |u| u.phone_number.clone().into())
        .field("displayName", |u| u.display_name.clone().into())
        .field("createdOn", |u| u.created_on.into())
        .field("modifiedOn", |u| u.modified_on.into())
});

impl Entity for User {
    const TYPE_NAME: &'static str = "user";

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn fields() -> &'static FieldTable<Self> {
        &USER_FIELDS
    }

    fn searchable_fields() -> &'static [&'static str] {
        &["username", "email", "phoneNumber"]
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![
            UniqueKey::new("username", self.username.to_lowercase()),
            UniqueKey::new("email", self.email.to_lowercase()),
        ]
    }

    fn on_created(&mut self, at: DateTime<Utc>) {
        self.created_on = at;
        self.modified_on = None;
    }

    fn on_modified(&mut self, at: DateTime<Utc>) {
        self.modified_on = Some(at);
    }
}
