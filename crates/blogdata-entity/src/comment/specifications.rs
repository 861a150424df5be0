//! Standard comment specifications. Comments always load their author.

use blogdata_core::Specification;
use blogdata_core::query::SpecificationBuilder;
use blogdata_core::types::id::EntityId;
use blogdata_core::types::sorting::SortDirection;

use super::model::Comment;

/// Comments with their author loaded.
pub fn with_author() -> SpecificationBuilder<Comment> {
    Specification::builder().include("author")
}

/// Non-deleted comments on `post_id`, oldest first.
pub fn for_post(post_id: EntityId) -> SpecificationBuilder<Comment> {
    with_author()
        .filter(move |c: &Comment| !c.is_deleted && c.post_id == post_id)
        .order_by("createdOn", SortDirection::Ascending)
        .then_by("id", SortDirection::Ascending)
}
