use crate::collection::PageEntry;
use agora_common::model::{
    Id,
    post::{Post, PostMarker},
};
use std::collections::HashMap;

/// Normalized store of full post records, keyed by id.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PostCache {
    posts: HashMap<Id<PostMarker>, Post>,
}

impl PostCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, post_id: Id<PostMarker>) -> Option<&Post> {
        self.posts.get(&post_id)
    }

    #[must_use]
    pub fn contains(&self, post_id: Id<PostMarker>) -> bool {
        self.posts.contains_key(&post_id)
    }

    /// Last write wins. Returns the record that was replaced.
    pub fn insert(&mut self, post: Post) -> Option<Post> {
        self.posts.insert(post.id, post)
    }

    pub fn remove(&mut self, post_id: Id<PostMarker>) -> Option<Post> {
        self.posts.remove(&post_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Writes a fetched page into `cache` and returns its entries in server order.
///
/// Each record is cached before its entry is produced, so every returned entry
/// can be joined back to its post.
pub fn merge_page(cache: &mut PostCache, posts: Vec<Post>) -> Vec<PageEntry> {
    posts
        .into_iter()
        .map(|post| {
            let entry = PageEntry::new(post.id);
            cache.insert(post);
            entry
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use crate::cache::{PostCache, merge_page, test_util::post};
    use agora_common::model::Id;

    #[test]
    fn merge_keeps_order_and_caches_records() {
        let mut cache = PostCache::new();
        let entries = merge_page(&mut cache, vec![post(12), post(11), post(10)]);

        let ids: Vec<u64> = entries.iter().map(|entry| entry.id.get()).collect();
        assert_eq!(ids, vec![12, 11, 10]);
        assert!(entries.iter().all(|entry| !entry.comments_shown));
        assert!(entries.iter().all(|entry| cache.contains(entry.id)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn later_writes_win() {
        let mut cache = PostCache::new();
        merge_page(&mut cache, vec![post(5)]);

        let mut edited = post(5);
        edited.content = Some("edited".to_owned());
        edited.counts.likes = 3;
        merge_page(&mut cache, vec![edited.clone()]);

        assert_eq!(cache.get(Id::from(5_u64)), Some(&edited));
        assert_eq!(cache.len(), 1);
    }
}
