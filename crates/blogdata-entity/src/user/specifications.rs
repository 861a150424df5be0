//! Standard user specifications.

use blogdata_core::Specification;
use blogdata_core::query::SpecificationBuilder;
use blogdata_core::types::sorting::SortDirection;

use super::model::User;

/// Users ordered by username.
pub fn by_username() -> SpecificationBuilder<User> {
    Specification::builder().order_by("username", SortDirection::Ascending)
}

/// The user with the given username, compared case-insensitively.
pub fn with_username(username: &str) -> SpecificationBuilder<User> {
    let wanted = username.to_lowercase();
    Specification::builder().filter(move |u: &User| u.username.to_lowercase() == wanted)
}
