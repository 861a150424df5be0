//! Standard post specifications.
//!
//! Each builder pre-registers the includes a post page needs (author,
//! comments, tags); callers still add their own filter and ordering.

use blogdata_core::Specification;
use blogdata_core::query::SpecificationBuilder;
use blogdata_core::types::id::EntityId;

use super::model::Post;

/// Posts with author, comments and tags loaded.
pub fn detailed() -> SpecificationBuilder<Post> {
    Specification::builder()
        .include("author")
        .include("comments")
        .include("tags")
}

/// Detailed posts matching `predicate`.
pub fn detailed_where(
    predicate: impl Fn(&Post) -> bool + Send + Sync + 'static,
) -> SpecificationBuilder<Post> {
    detailed().filter(predicate)
}

/// Posts that have not been soft-deleted.
pub fn published() -> SpecificationBuilder<Post> {
    detailed_where(|p| !p.is_deleted)
}

/// Non-deleted posts written by `author_id`.
pub fn by_author(author_id: EntityId) -> SpecificationBuilder<Post> {
    detailed_where(move |p| !p.is_deleted && p.author_id == author_id)
}

/// Non-deleted posts carrying tag `tag_id`.
pub fn tagged(tag_id: EntityId) -> SpecificationBuilder<Post> {
    detailed_where(move |p| !p.is_deleted && p.tag_ids.contains(&tag_id))
}

#[cfg(test)]
mod tests {
    use blogdata_core::types::sorting::SortDirection;

    use super::*;

    #[test]
    fn test_default_includes() {
        let spec = by_author(EntityId(1))
            .order_by("createdOn", SortDirection::Descending)
            .build()
            .unwrap();
        assert_eq!(spec.include_names(), vec!["author", "comments", "tags"]);

        let mine = Post::new("a", "b", EntityId(1));
        let theirs = Post::new("a", "b", EntityId(2));
        assert!(spec.is_satisfied_by(&mine));
        assert!(!spec.is_satisfied_by(&theirs));
    }

    #[test]
    fn test_published_excludes_soft_deleted() {
        let spec = published().build().unwrap();
        let mut post = Post::new("a", "b", EntityId(1));
        assert!(spec.is_satisfied_by(&post));
        post.is_deleted = true;
        assert!(!spec.is_satisfied_by(&post));
    }
}
