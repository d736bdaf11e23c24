use agora_common::model::{
    Id, ModelValidationError,
    comment::{Comment, CommentMarker, CreateComment},
    page::PageQuery,
    post::{CreatePost, Post, PostContent, PostLikeMarker, PostMarker},
    user::{CreateUser, UpdatedUserField, User, UserField, UserHandle, UserMarker, UserProfile},
};
use async_trait::async_trait;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for everything the api serves.
///
/// Reads that take a `viewer` tag their results with that user's likes and
/// follows. Listings return `None` when their parent object does not exist,
/// as opposed to an empty listing.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_by_handle(&self, handle: &UserHandle) -> Result<Option<User>>;

    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn fetch_profile(
        &self,
        user_id: Id<UserMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<UserProfile>>;

    /// Stores an already normalized value. A taken username is a [`DbError::Conflict`].
    async fn update_user_field(
        &self,
        user_id: Id<UserMarker>,
        field: UserField,
        value: Option<String>,
    ) -> Result<Option<UpdatedUserField>>;

    /// Returns whether the follow is new.
    async fn follow(&self, follower: Id<UserMarker>, followee: Id<UserMarker>) -> Result<bool>;

    /// Returns whether a follow was removed.
    async fn unfollow(&self, follower: Id<UserMarker>, followee: Id<UserMarker>) -> Result<bool>;

    /// Posts authored by `user_id`, newest first.
    async fn fetch_user_posts(
        &self,
        user_id: Id<UserMarker>,
        viewer: Option<Id<UserMarker>>,
        page: PageQuery,
    ) -> Result<Option<Vec<Post>>>;

    /// Posts by `user_id` and everyone they follow, newest first.
    async fn fetch_feed(
        &self,
        user_id: Id<UserMarker>,
        viewer: Option<Id<UserMarker>>,
        page: PageQuery,
    ) -> Result<Option<Vec<Post>>>;

    async fn fetch_post(
        &self,
        post_id: Id<PostMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Post>>;

    async fn create_post(&self, post: &CreatePost) -> Result<Post>;

    /// Replaces text and attachments; the result is tagged for the author.
    async fn edit_post(&self, post_id: Id<PostMarker>, content: &PostContent)
    -> Result<Option<Post>>;

    /// Returns whether the post existed.
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;

    /// Idempotent; returns the like's id, or `None` if the post is missing.
    async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Option<Id<PostLikeMarker>>>;

    /// Returns whether a like was removed.
    async fn unlike_post(&self, post_id: Id<PostMarker>, user_id: Id<UserMarker>) -> Result<bool>;

    /// Top-level comments of a post, oldest first.
    async fn fetch_comments(
        &self,
        post_id: Id<PostMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Vec<Comment>>>;

    /// Replies to a comment, oldest first.
    async fn fetch_replies(
        &self,
        parent_id: Id<CommentMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Vec<Comment>>>;

    async fn fetch_comment(
        &self,
        comment_id: Id<CommentMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Comment>>;

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment>;

    /// Idempotent; returns whether the comment exists.
    async fn like_comment(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<bool>;

    /// Returns whether a like was removed.
    async fn unlike_comment(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<bool>;
}
