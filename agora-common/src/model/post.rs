use crate::model::{
    Id,
    media::VisualMedia,
    user::{PostAuthor, UserMarker},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_CONTENT_MAX_LEN: usize = 5000;
pub const POST_MEDIA_MAX_COUNT: usize = 10;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostLikeMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostCounts {
    pub likes: u64,
    pub comments: u64,
}

/// A post as delivered to a viewer.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: PostAuthor,
    pub visual_media: Vec<VisualMedia>,
    pub counts: PostCounts,
    /// The viewer's own like, if they left one.
    pub liked_by_viewer: Option<Id<PostLikeMarker>>,
}

/// Content and attachments of a post, as submitted when creating or editing it.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostContent {
    pub content: Option<String>,
    #[serde(default)]
    pub visual_media: Vec<VisualMedia>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum InvalidPostContentError {
    #[error("A post needs text or at least one attachment.")]
    Empty,
    #[error("Post text is too long.")]
    TooLong,
    #[error("A post can carry at most {POST_MEDIA_MAX_COUNT} attachments.")]
    TooManyAttachments,
}

impl PostContent {
    /// Trims the text and checks the limits.
    pub fn validated(self) -> Result<Self, InvalidPostContentError> {
        let content = self
            .content
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty());

        if content.is_none() && self.visual_media.is_empty() {
            return Err(InvalidPostContentError::Empty);
        }
        if content
            .as_ref()
            .is_some_and(|content| content.chars().count() > POST_CONTENT_MAX_LEN)
        {
            return Err(InvalidPostContentError::TooLong);
        }
        if self.visual_media.len() > POST_MEDIA_MAX_COUNT {
            return Err(InvalidPostContentError::TooManyAttachments);
        }

        Ok(Self {
            content,
            visual_media: self.visual_media,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
}

#[cfg(test)]
mod tests {
    use crate::model::{
        media::{MediaUrl, VisualMedia, VisualMediaType},
        post::{InvalidPostContentError, PostContent},
    };

    fn photo() -> VisualMedia {
        VisualMedia {
            kind: VisualMediaType::Photo,
            url: MediaUrl::new("/uploads/photo.png".to_owned()).unwrap(),
        }
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let content = PostContent {
            content: Some("   ".to_owned()),
            visual_media: vec![],
        };
        assert_eq!(content.validated(), Err(InvalidPostContentError::Empty));

        let photo_only = PostContent {
            content: Some(" ".to_owned()),
            visual_media: vec![photo()],
        }
        .validated()
        .unwrap();
        assert_eq!(photo_only.content, None);
    }

    #[test]
    fn attachment_limit() {
        let content = PostContent {
            content: None,
            visual_media: vec![photo(); 11],
        };
        assert_eq!(
            content.validated(),
            Err(InvalidPostContentError::TooManyAttachments)
        );
    }
}
