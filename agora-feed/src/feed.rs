use crate::{
    cache::{PostCache, merge_page},
    collection::{FeedCollection, FeedStatus, FetchTicket},
    sentinel::ScrollSentinel,
    source::{FeedKey, FeedSource, FetchError, Listing},
};
use agora_common::model::{
    Id,
    media::VisualMedia,
    post::{Post, PostMarker},
};
use tracing::{debug, info, warn};

/// A page fetch that has been started but not yet answered.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PageRequest {
    key: FeedKey,
    ticket: FetchTicket,
    limit: u32,
}

impl PageRequest {
    #[must_use]
    pub fn key(self) -> FeedKey {
        self.key
    }

    #[must_use]
    pub fn cursor(self) -> Option<Id<PostMarker>> {
        self.ticket.cursor()
    }

    #[must_use]
    pub fn limit(self) -> u32 {
        self.limit
    }
}

/// Seed for the post editor.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct EditDraft {
    pub post_id: Id<PostMarker>,
    pub content: String,
    pub visual_media: Vec<VisualMedia>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FeedItem<'a> {
    pub post: &'a Post,
    pub comments_shown: bool,
}

/// What a listing looks like right now.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum FeedView<'a> {
    Loading,
    Error(&'static str),
    Posts {
        items: Vec<FeedItem<'a>>,
        fetching_next_page: bool,
        /// Set when loading a further page failed.
        error: Option<&'static str>,
        all_caught_up: bool,
    },
}

/// An infinitely scrolling listing of posts.
///
/// The listing is fetched page by page from `S`. Local edits such as toggling
/// comments or removing a deleted post never refetch.
#[derive(Debug)]
pub struct Feed<S> {
    source: S,
    key: FeedKey,
    cache: PostCache,
    collection: FeedCollection,
    sentinel: ScrollSentinel,
}

impl<S: FeedSource> Feed<S> {
    #[must_use]
    pub fn new(source: S, key: FeedKey, page_size: u32) -> Self {
        Self {
            source,
            key,
            cache: PostCache::new(),
            collection: FeedCollection::new(page_size),
            sentinel: ScrollSentinel::default(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn key(&self) -> FeedKey {
        self.key
    }

    #[must_use]
    pub fn cache(&self) -> &PostCache {
        &self.cache
    }

    #[must_use]
    pub fn collection(&self) -> &FeedCollection {
        &self.collection
    }

    /// Switches to another listing. Pages of the old one are discarded and
    /// answers to its pending requests are ignored.
    pub fn set_key(&mut self, key: FeedKey) {
        if key == self.key {
            return;
        }
        debug!(?key, "Switching listing");
        self.key = key;
        self.collection.invalidate();
        self.sentinel = ScrollSentinel::default();
    }

    /// Refetches the listing from its first page on the next load.
    pub fn invalidate(&mut self) {
        self.collection.invalidate();
    }

    fn request(&mut self) -> Option<PageRequest> {
        let ticket = self.collection.begin_fetch()?;
        Some(PageRequest {
            key: self.key,
            ticket,
            limit: self.collection.page_size(),
        })
    }

    /// Starts the first page unless the listing was loaded already.
    pub fn request_first_page(&mut self) -> Option<PageRequest> {
        if self.collection.status() != FeedStatus::Uninitialized {
            return None;
        }
        self.request()
    }

    /// Feeds a visibility change of the bottom marker.
    ///
    /// A next page is requested when the marker just appeared, the listing has
    /// a next page and nothing is being fetched.
    pub fn request_on_visibility(&mut self, visible: bool) -> Option<PageRequest> {
        if !self.sentinel.observe(visible) {
            return None;
        }
        if !self.collection.has_next_page() || self.collection.is_fetching() {
            return None;
        }
        self.request()
    }

    /// Repeats the fetch that failed.
    pub fn request_retry(&mut self) -> Option<PageRequest> {
        if self.collection.status() != FeedStatus::Error {
            return None;
        }
        self.request()
    }

    /// Applies the answer to `request`. Returns `false` if it was stale.
    pub fn receive_page(
        &mut self,
        request: PageRequest,
        result: Result<Vec<Post>, FetchError>,
    ) -> bool {
        if request.key != self.key || !self.collection.is_current(request.ticket) {
            debug!(key = ?request.key, "Ignoring answer to a stale page request");
            return false;
        }

        match result {
            Ok(posts) => {
                let entries = merge_page(&mut self.cache, posts);
                self.collection.complete_fetch(request.ticket, entries);
                if self.collection.status() == FeedStatus::Exhausted {
                    debug!(key = ?self.key, "Reached the end of the listing");
                }
            }
            Err(err) => {
                warn!(key = ?self.key, cursor = ?request.cursor(), error = %err, "Loading posts failed");
                self.collection.fail_fetch(request.ticket);
            }
        }
        true
    }

    async fn fetch(&mut self, request: PageRequest) -> bool {
        debug!(key = ?request.key, cursor = ?request.cursor(), limit = request.limit, "Fetching page");
        let result = self
            .source
            .fetch_page(request.key, request.cursor(), request.limit)
            .await;
        self.receive_page(request, result)
    }

    /// Returns whether a page was fetched.
    pub async fn load_first_page(&mut self) -> bool {
        match self.request_first_page() {
            Some(request) => self.fetch(request).await,
            None => false,
        }
    }

    /// Returns whether a page was fetched.
    pub async fn on_visibility(&mut self, visible: bool) -> bool {
        match self.request_on_visibility(visible) {
            Some(request) => self.fetch(request).await,
            None => false,
        }
    }

    /// Returns whether a page was fetched.
    pub async fn retry(&mut self) -> bool {
        match self.request_retry() {
            Some(request) => self.fetch(request).await,
            None => false,
        }
    }

    pub fn toggle_comments(&mut self, post_id: Id<PostMarker>) -> bool {
        self.collection.toggle_comments(post_id)
    }

    /// Deletes the post on the server and, once that succeeded, drops it locally.
    pub async fn delete_post(&mut self, post_id: Id<PostMarker>) -> Result<(), FetchError> {
        self.source.delete_post(post_id).await?;

        self.collection.remove_post(post_id);
        self.cache.remove(post_id);
        info!(post = %post_id, "Removed deleted post from listing");
        Ok(())
    }

    #[must_use]
    pub fn edit_draft(&self, post_id: Id<PostMarker>) -> Option<EditDraft> {
        let post = self.cache.get(post_id)?;
        Some(EditDraft {
            post_id,
            content: post.content.clone().unwrap_or_default(),
            visual_media: post.visual_media.clone(),
        })
    }

    /// Stores an edited record. The list itself is left alone.
    pub fn apply_edit(&mut self, post: Post) {
        self.cache.insert(post);
    }

    #[must_use]
    pub fn view(&self) -> FeedView<'_> {
        let status = self.collection.status();
        if !self.collection.is_initialized() {
            return match status {
                FeedStatus::Error => FeedView::Error(Listing::Posts.error_message()),
                _ => FeedView::Loading,
            };
        }

        let items = self
            .collection
            .entries()
            .filter_map(|entry| {
                Some(FeedItem {
                    post: self.cache.get(entry.id)?,
                    comments_shown: entry.comments_shown,
                })
            })
            .collect();

        FeedView::Posts {
            items,
            fetching_next_page: status == FeedStatus::LoadingNextPage,
            error: (status == FeedStatus::Error).then(|| Listing::Posts.error_message()),
            all_caught_up: status == FeedStatus::Exhausted,
        }
    }
}
