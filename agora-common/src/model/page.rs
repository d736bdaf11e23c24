use crate::model::{Id, post::PostMarker};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const POSTS_PER_PAGE: u32 = 10;
pub const MAX_POSTS_PER_PAGE: u32 = 50;
/// Ids are stored as signed 64-bit integers.
pub const MAX_CURSOR: u64 = i64::MAX.cast_unsigned();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Cursor {0} is out of range.")]
pub struct CursorOutOfRangeError(pub u64);

/// Which listing of a user's posts is being paged.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Posts authored by the user.
    Profile,
    /// Posts by the user and everyone they follow.
    Feed,
}

impl FeedKind {
    /// Last path segment of the listing endpoint.
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            FeedKind::Profile => "posts",
            FeedKind::Feed => "feed",
        }
    }
}

/// Query string of the post listings: `?limit={n}&cursor={lastPostId|0}`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub cursor: Option<u64>,
}

impl PageQuery {
    /// Rejects cursors no stored id can be below.
    pub fn validated(self) -> Result<Self, CursorOutOfRangeError> {
        match self.cursor {
            Some(cursor) if cursor > MAX_CURSOR => Err(CursorOutOfRangeError(cursor)),
            _ => Ok(self),
        }
    }

    #[must_use]
    pub fn limit(self) -> u32 {
        self.limit
            .unwrap_or(POSTS_PER_PAGE)
            .clamp(1, MAX_POSTS_PER_PAGE)
    }

    /// The id listings continue after; `0` and a missing cursor both mean "from the top".
    #[must_use]
    pub fn cursor(self) -> Option<Id<PostMarker>> {
        self.cursor.filter(|&cursor| cursor != 0).map(Id::from)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        page::{CursorOutOfRangeError, MAX_CURSOR, PageQuery},
    };

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageQuery::default().limit(), 10);
        assert_eq!(PageQuery { limit: Some(0), cursor: None }.limit(), 1);
        assert_eq!(PageQuery { limit: Some(500), cursor: None }.limit(), 50);
        assert_eq!(PageQuery { limit: Some(25), cursor: None }.limit(), 25);
    }

    #[test]
    fn zero_cursor_means_first_page() {
        assert_eq!(PageQuery { limit: None, cursor: Some(0) }.cursor(), None);
        assert_eq!(
            PageQuery { limit: None, cursor: Some(91) }.cursor(),
            Some(Id::from(91))
        );
    }

    #[test]
    fn cursors_must_fit_stored_ids() {
        let at_max = PageQuery { limit: None, cursor: Some(MAX_CURSOR) };
        assert_eq!(at_max.validated(), Ok(at_max));
        assert_eq!(PageQuery::default().validated(), Ok(PageQuery::default()));
        assert_eq!(
            PageQuery { limit: None, cursor: Some(MAX_CURSOR + 1) }.validated(),
            Err(CursorOutOfRangeError(MAX_CURSOR + 1))
        );
    }
}
