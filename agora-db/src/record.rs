use agora_common::model::{
    Id, ModelValidationError, count_from_db,
    comment::Comment,
    media::{MediaUrl, VisualMedia},
    post::{Post, PostCounts},
    user::{PostAuthor, User, UserHandle, UserProfile},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub handle: String,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub gender: Option<String>,
    pub relationship_status: Option<String>,
    pub profile_photo: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct ProfileRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub follower_count: i64,
    pub following_count: i64,
    pub is_following: Option<bool>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub content: Option<String>,
    pub created_at: OffsetDateTime,
    pub user_snowflake: i64,
    pub name: String,
    pub profile_photo: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub viewer_like: Option<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct VisualMediaRecord {
    pub post_snowflake: i64,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_snowflake: i64,
    pub post_snowflake: i64,
    pub parent_snowflake: Option<i64>,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub user_snowflake: i64,
    pub name: String,
    pub profile_photo: Option<String>,
    pub like_count: i64,
    pub reply_count: i64,
    pub liked_by_viewer: bool,
}

fn media_url(url: Option<String>) -> Result<Option<MediaUrl>, ModelValidationError> {
    Ok(url.map(MediaUrl::new).transpose()?)
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            handle: UserHandle::new(value.handle)?,
            name: value.name,
            email: value.email,
            bio: value.bio,
            website: value.website,
            gender: value.gender,
            relationship_status: value.relationship_status,
            profile_photo: media_url(value.profile_photo)?,
        })
    }
}

impl TryFrom<ProfileRecord> for UserProfile {
    type Error = ModelValidationError;

    fn try_from(value: ProfileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            follower_count: count_from_db(value.follower_count)?,
            following_count: count_from_db(value.following_count)?,
            is_following: value.is_following,
        })
    }
}

impl TryFrom<VisualMediaRecord> for VisualMedia {
    type Error = ModelValidationError;

    fn try_from(value: VisualMediaRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: value.kind.parse().map_err(ModelValidationError::MediaType)?,
            url: MediaUrl::new(value.url)?,
        })
    }
}

/// Attachments are loaded separately and start out empty.
impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            content: value.content,
            created_at: value.created_at,
            author: PostAuthor {
                id: Id::from_db(value.user_snowflake),
                name: value.name,
                profile_photo: media_url(value.profile_photo)?,
            },
            visual_media: Vec::new(),
            counts: PostCounts {
                likes: count_from_db(value.like_count)?,
                comments: count_from_db(value.comment_count)?,
            },
            liked_by_viewer: value.viewer_like.map(Id::from_db),
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_snowflake),
            content: value.content,
            created_at: value.created_at,
            post_id: Id::from_db(value.post_snowflake),
            parent_id: value.parent_snowflake.map(Id::from_db),
            author: PostAuthor {
                id: Id::from_db(value.user_snowflake),
                name: value.name,
                profile_photo: media_url(value.profile_photo)?,
            },
            like_count: count_from_db(value.like_count)?,
            reply_count: count_from_db(value.reply_count)?,
            liked_by_viewer: value.liked_by_viewer,
        })
    }
}
