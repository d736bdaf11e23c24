use crate::model::{
    Id,
    post::PostMarker,
    user::{PostAuthor, UserMarker},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub post_id: Id<PostMarker>,
    /// Set for replies.
    pub parent_id: Option<Id<CommentMarker>>,
    pub author: PostAuthor,
    pub like_count: u64,
    pub reply_count: u64,
    pub liked_by_viewer: bool,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateComment {
    pub post_id: Id<PostMarker>,
    pub parent_id: Option<Id<CommentMarker>>,
    pub author: Id<UserMarker>,
    pub content: String,
}

pub const COMMENT_CONTENT_MAX_LEN: usize = 2000;

/// Body of a new comment or reply.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CommentContent {
    pub content: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum InvalidCommentContentError {
    #[error("A comment cannot be empty.")]
    Empty,
    #[error("Comment is too long.")]
    TooLong,
}

impl CommentContent {
    pub fn validated(self) -> Result<Self, InvalidCommentContentError> {
        let content = self.content.trim().to_owned();
        if content.is_empty() {
            Err(InvalidCommentContentError::Empty)
        } else if content.chars().count() > COMMENT_CONTENT_MAX_LEN {
            Err(InvalidCommentContentError::TooLong)
        } else {
            Ok(Self { content })
        }
    }
}
