use agora_common::model::{
    Id,
    page::{MAX_POSTS_PER_PAGE, POSTS_PER_PAGE},
    post::PostMarker,
};
use std::collections::HashSet;

/// A post's place in a listing together with its local UI state.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageEntry {
    pub id: Id<PostMarker>,
    pub comments_shown: bool,
}

impl PageEntry {
    #[must_use]
    pub fn new(id: Id<PostMarker>) -> Self {
        Self {
            id,
            comments_shown: false,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum FeedStatus {
    Uninitialized,
    LoadingFirstPage,
    HasMore,
    LoadingNextPage,
    Exhausted,
    /// The last fetch failed. Only an explicit new fetch leaves this state.
    Error,
}

/// Handed out by [`FeedCollection::begin_fetch`] and redeemed with the result.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct FetchTicket {
    generation: u64,
    cursor: Option<Id<PostMarker>>,
}

impl FetchTicket {
    /// `None` for the first page.
    #[must_use]
    pub fn cursor(self) -> Option<Id<PostMarker>> {
        self.cursor
    }
}

/// The paginated list of a single listing.
///
/// Pages hold [`PageEntry`]s only; records live in the
/// [`PostCache`](crate::cache::PostCache). `page_params` holds the cursor each
/// page was fetched with and is never touched by local edits.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FeedCollection {
    page_size: u32,
    pages: Vec<Vec<PageEntry>>,
    page_params: Vec<Option<Id<PostMarker>>>,
    next_cursor: Option<Id<PostMarker>>,
    status: FeedStatus,
    generation: u64,
}

impl Default for FeedCollection {
    fn default() -> Self {
        Self::new(POSTS_PER_PAGE)
    }
}

impl FeedCollection {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_POSTS_PER_PAGE),
            pages: Vec::new(),
            page_params: Vec::new(),
            next_cursor: None,
            status: FeedStatus::Uninitialized,
            generation: 0,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.status
    }

    #[must_use]
    pub fn pages(&self) -> &[Vec<PageEntry>] {
        &self.pages
    }

    #[must_use]
    pub fn page_params(&self) -> &[Option<Id<PostMarker>>] {
        &self.page_params
    }

    /// All entries in display order.
    pub fn entries(&self) -> impl Iterator<Item = &PageEntry> {
        self.pages.iter().flatten()
    }

    #[must_use]
    pub fn entry(&self, post_id: Id<PostMarker>) -> Option<&PageEntry> {
        self.entries().find(|entry| entry.id == post_id)
    }

    /// The cursor the next page will be fetched with.
    #[must_use]
    pub fn next_cursor(&self) -> Option<Id<PostMarker>> {
        self.next_cursor
    }

    /// True once a full page came back and no fetch has come back short since.
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        matches!(
            self.status,
            FeedStatus::LoadingFirstPage | FeedStatus::LoadingNextPage
        )
    }

    /// Whether a first page has been received.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        !self.page_params.is_empty()
    }

    #[must_use]
    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.generation == self.generation && self.is_fetching()
    }

    /// Starts the next fetch if one is due.
    ///
    /// Returns `None` while a fetch is in flight and once the listing is
    /// exhausted. After an error the failed page is requested again.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        let (status, cursor) = match self.status {
            FeedStatus::Uninitialized => (FeedStatus::LoadingFirstPage, None),
            FeedStatus::HasMore => (FeedStatus::LoadingNextPage, Some(self.next_cursor?)),
            FeedStatus::Error if self.is_initialized() => {
                (FeedStatus::LoadingNextPage, Some(self.next_cursor?))
            }
            FeedStatus::Error => (FeedStatus::LoadingFirstPage, None),
            FeedStatus::LoadingFirstPage | FeedStatus::LoadingNextPage | FeedStatus::Exhausted => {
                return None;
            }
        };

        self.status = status;
        Some(FetchTicket {
            generation: self.generation,
            cursor,
        })
    }

    /// Appends a fetched page. Returns `false` if the ticket is stale.
    ///
    /// Entries already present are dropped. A page shorter than the page size
    /// ends the listing.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, entries: Vec<PageEntry>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        let fetched = entries.len();
        let last = entries.last().map(|entry| entry.id);

        let mut seen: HashSet<Id<PostMarker>> = self.entries().map(|entry| entry.id).collect();
        let page = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id))
            .collect();
        self.pages.push(page);
        self.page_params.push(ticket.cursor);

        match last {
            Some(last) if fetched >= self.page_size as usize => {
                self.next_cursor = Some(last);
                self.status = FeedStatus::HasMore;
            }
            _ => {
                self.next_cursor = None;
                self.status = FeedStatus::Exhausted;
            }
        }
        true
    }

    /// Records a failed fetch. Returns `false` if the ticket is stale.
    pub fn fail_fetch(&mut self, ticket: FetchTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.status = FeedStatus::Error;
        true
    }

    /// Flips the comments flag of one post and re-chunks the pages.
    ///
    /// Cursors stay as they are. Returns `false` if the post is not listed.
    pub fn toggle_comments(&mut self, post_id: Id<PostMarker>) -> bool {
        let mut entries: Vec<PageEntry> = self.entries().copied().collect();
        let Some(entry) = entries.iter_mut().find(|entry| entry.id == post_id) else {
            return false;
        };
        entry.comments_shown = !entry.comments_shown;

        self.pages = entries
            .chunks(self.page_size as usize)
            .map(<[PageEntry]>::to_vec)
            .collect();
        true
    }

    /// Returns whether the post was listed.
    pub fn remove_post(&mut self, post_id: Id<PostMarker>) -> bool {
        let mut removed = false;
        for page in &mut self.pages {
            let before = page.len();
            page.retain(|entry| entry.id != post_id);
            removed |= page.len() != before;
        }
        removed
    }

    /// Drops all pages. Fetches still in flight are ignored when they return.
    pub fn invalidate(&mut self) {
        *self = Self {
            generation: self.generation + 1,
            ..Self::new(self.page_size)
        };
    }
}
