//! Cacheability metadata accumulated while a request is resolved.
//!
//! Producers append cache contexts (the dimensions a response varies by, e.g.
//! `languages:language_interface`) and cache tags (invalidation keys, e.g.
//! `node:1`). Merging is plain set union, so the final set does not depend on
//! the order fields were resolved in and sibling fields can accumulate
//! independently before being merged.

use std::collections::BTreeSet;

use serde::Serialize;

/// Cache context added by producers whose output depends on the user's capabilities.
pub const USER_PERMISSIONS_CONTEXT: &str = "user.permissions";
/// Cache context added by producers whose output depends on the interface language.
pub const LANGUAGE_INTERFACE_CONTEXT: &str = "languages:language_interface";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub cache_contexts: BTreeSet<String>,
    pub cache_tags: BTreeSet<String>,
}

impl CacheMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_context(&mut self, context: impl Into<String>) {
        self.cache_contexts.insert(context.into());
    }

    pub fn add_contexts<I, S>(&mut self, contexts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_contexts.extend(contexts.into_iter().map(Into::into));
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.cache_tags.insert(tag.into());
    }

    /// Union of `other` into `self`.
    pub fn merge(&mut self, other: &CacheMetadata) {
        self.cache_contexts.extend(other.cache_contexts.iter().cloned());
        self.cache_tags.extend(other.cache_tags.iter().cloned());
    }

    pub fn merged(mut self, other: &CacheMetadata) -> Self {
        self.merge(other);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cache_contexts.is_empty() && self.cache_tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_commutative() {
        let mut first = CacheMetadata::new();
        first.add_context("languages:language_interface");
        let mut second = CacheMetadata::new();
        second.add_context(USER_PERMISSIONS_CONTEXT);
        second.add_tag("node:1");

        let left = first.clone().merged(&second);
        let right = second.clone().merged(&first);
        assert_eq!(left, right);
    }

    #[test]
    fn appending_in_either_order_yields_same_set() {
        let mut forward = CacheMetadata::new();
        forward.add_context("a");
        forward.add_context("b");

        let mut backward = CacheMetadata::new();
        backward.add_context("b");
        backward.add_context("a");

        assert_eq!(forward, backward);
    }

    #[test]
    fn merge_never_shrinks() {
        let mut metadata = CacheMetadata::new();
        metadata.add_contexts(["a", "b"]);
        metadata.add_tag("config:views.view.frontpage");
        let before = metadata.clone();

        metadata.merge(&CacheMetadata::new());
        metadata.merge(&before);

        assert_eq!(metadata, before);
        assert!(!metadata.is_empty());
    }
}
