use crate::store::{DbError, Result, Store};
use agora_common::{
    model::{
        AgoraSnowflakeGenerator, Id,
        comment::{Comment, CommentMarker, CreateComment},
        page::PageQuery,
        post::{CreatePost, Post, PostContent, PostCounts, PostLikeMarker, PostMarker},
        user::{
            CreateUser, PostAuthor, UpdatedUserField, User, UserField, UserHandle, UserMarker,
            UserProfile,
        },
    },
    snowflake::{ProcessId, WorkerId},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

type UserId = Id<UserMarker>;
type PostId = Id<PostMarker>;
type CommentId = Id<CommentMarker>;

#[derive(Clone, Debug)]
struct StoredPost {
    author: UserId,
    content: PostContent,
    created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct StoredComment {
    post_id: PostId,
    parent_id: Option<CommentId>,
    author: UserId,
    content: String,
    created_at: OffsetDateTime,
}

#[derive(Debug)]
struct Tables {
    snowflake_generator: AgoraSnowflakeGenerator,
    users: BTreeMap<UserId, User>,
    /// (follower, followee)
    follows: BTreeSet<(UserId, UserId)>,
    posts: BTreeMap<PostId, StoredPost>,
    post_likes: BTreeMap<(PostId, UserId), Id<PostLikeMarker>>,
    comments: BTreeMap<CommentId, StoredComment>,
    comment_likes: BTreeSet<(CommentId, UserId)>,
}

/// A [`Store`] that keeps everything in process memory.
///
/// Used when no database is configured, and by tests.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            tables: RwLock::new(Tables {
                snowflake_generator: AgoraSnowflakeGenerator::new(worker_id, process_id),
                users: BTreeMap::new(),
                follows: BTreeSet::new(),
                posts: BTreeMap::new(),
                post_likes: BTreeMap::new(),
                comments: BTreeMap::new(),
                comment_likes: BTreeSet::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

impl Tables {
    fn next_id<Marker>(&mut self) -> Id<Marker> {
        self.snowflake_generator.generate().into()
    }

    fn author(&self, user_id: UserId) -> PostAuthor {
        self.users
            .get(&user_id)
            .map(|user| PostAuthor {
                id: user.id,
                name: user.name.clone(),
                profile_photo: user.profile_photo.clone(),
            })
            .unwrap_or_else(|| PostAuthor {
                id: user_id,
                ..PostAuthor::default()
            })
    }

    fn post(&self, post_id: PostId, viewer: Option<UserId>) -> Option<Post> {
        let stored = self.posts.get(&post_id)?;

        let likes = self
            .post_likes
            .range((post_id, UserId::default())..)
            .take_while(|((liked_post, _), _)| *liked_post == post_id)
            .count();
        let comments = self
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .count();

        Some(Post {
            id: post_id,
            content: stored.content.content.clone(),
            created_at: stored.created_at,
            author: self.author(stored.author),
            visual_media: stored.content.visual_media.clone(),
            counts: PostCounts {
                likes: likes as u64,
                comments: comments as u64,
            },
            liked_by_viewer: viewer.and_then(|viewer| self.post_likes.get(&(post_id, viewer)).copied()),
        })
    }

    fn comment(&self, comment_id: CommentId, viewer: Option<UserId>) -> Option<Comment> {
        let stored = self.comments.get(&comment_id)?;

        let like_count = self
            .comment_likes
            .iter()
            .filter(|(liked, _)| *liked == comment_id)
            .count();
        let reply_count = self
            .comments
            .values()
            .filter(|comment| comment.parent_id == Some(comment_id))
            .count();

        Some(Comment {
            id: comment_id,
            content: stored.content.clone(),
            created_at: stored.created_at,
            post_id: stored.post_id,
            parent_id: stored.parent_id,
            author: self.author(stored.author),
            like_count: like_count as u64,
            reply_count: reply_count as u64,
            liked_by_viewer: viewer
                .is_some_and(|viewer| self.comment_likes.contains(&(comment_id, viewer))),
        })
    }

    /// Newest-first page of the posts whose author passes `include`.
    fn page(
        &self,
        viewer: Option<UserId>,
        page: PageQuery,
        include: impl Fn(UserId) -> bool,
    ) -> Vec<Post> {
        let below_cursor = match page.cursor() {
            Some(cursor) => self.posts.range(..cursor),
            None => self.posts.range(..),
        };

        below_cursor
            .rev()
            .filter(|(_, stored)| include(stored.author))
            .take(page.limit() as usize)
            .filter_map(|(&post_id, _)| self.post(post_id, viewer))
            .collect()
    }

    fn comments_where(
        &self,
        viewer: Option<UserId>,
        filter: impl Fn(&StoredComment) -> bool,
    ) -> Vec<Comment> {
        self.comments
            .iter()
            .filter(|(_, stored)| filter(stored))
            .filter_map(|(&comment_id, _)| self.comment(comment_id, viewer))
            .collect()
    }

    fn remove_comment_tree(&mut self, comment_id: CommentId) {
        let replies: Vec<CommentId> = self
            .comments
            .iter()
            .filter(|(_, stored)| stored.parent_id == Some(comment_id))
            .map(|(&id, _)| id)
            .collect();
        for reply in replies {
            self.remove_comment_tree(reply);
        }
        self.comments.remove(&comment_id);
        self.comment_likes.retain(|(liked, _)| *liked != comment_id);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn fetch_user_by_handle(&self, handle: &UserHandle) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|user| user.handle == *handle).cloned())
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|existing| existing.handle == user.handle) {
            return Err(DbError::Conflict("Username is already taken.".to_owned()));
        }

        let user = User {
            id: tables.next_id(),
            handle: user.handle.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            ..User::default()
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn fetch_profile(
        &self,
        user_id: UserId,
        viewer: Option<UserId>,
    ) -> Result<Option<UserProfile>> {
        let tables = self.tables.read().await;
        let Some(user) = tables.users.get(&user_id) else {
            return Ok(None);
        };

        let follower_count = tables.follows.iter().filter(|(_, followee)| *followee == user_id).count();
        let following_count = tables.follows.iter().filter(|(follower, _)| *follower == user_id).count();

        Ok(Some(UserProfile {
            user: user.clone(),
            follower_count: follower_count as u64,
            following_count: following_count as u64,
            is_following: viewer.map(|viewer| tables.follows.contains(&(viewer, user_id))),
        }))
    }

    async fn update_user_field(
        &self,
        user_id: UserId,
        field: UserField,
        value: Option<String>,
    ) -> Result<Option<UpdatedUserField>> {
        let mut tables = self.tables.write().await;

        if field == UserField::Username {
            let taken = tables.users.values().any(|user| {
                user.id != user_id && value.as_deref() == Some(user.handle.get())
            });
            if taken {
                return Err(DbError::Conflict("Username is already taken.".to_owned()));
            }
        }

        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };

        match field {
            UserField::Username => {
                user.handle = UserHandle::new(value.clone().unwrap_or_default())
                    .map_err(|err| DbError::Data(err.into()))?;
            }
            UserField::Name => user.name = value.clone().unwrap_or_default(),
            UserField::Email => user.email = value.clone().unwrap_or_default(),
            UserField::Bio => user.bio.clone_from(&value),
            UserField::Website => user.website.clone_from(&value),
            UserField::Gender => user.gender.clone_from(&value),
            UserField::RelationshipStatus => user.relationship_status.clone_from(&value),
        }

        debug!(%user_id, %field, "Updated user field");
        Ok(Some(UpdatedUserField { field, value }))
    }

    async fn follow(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let both_exist =
            tables.users.contains_key(&follower) && tables.users.contains_key(&followee);
        Ok(both_exist && tables.follows.insert((follower, followee)))
    }

    async fn unfollow(&self, follower: UserId, followee: UserId) -> Result<bool> {
        Ok(self.tables.write().await.follows.remove(&(follower, followee)))
    }

    async fn fetch_user_posts(
        &self,
        user_id: UserId,
        viewer: Option<UserId>,
        page: PageQuery,
    ) -> Result<Option<Vec<Post>>> {
        let tables = self.tables.read().await;
        if !tables.users.contains_key(&user_id) {
            return Ok(None);
        }

        Ok(Some(tables.page(viewer, page, |author| author == user_id)))
    }

    async fn fetch_feed(
        &self,
        user_id: UserId,
        viewer: Option<UserId>,
        page: PageQuery,
    ) -> Result<Option<Vec<Post>>> {
        let tables = self.tables.read().await;
        if !tables.users.contains_key(&user_id) {
            return Ok(None);
        }

        Ok(Some(tables.page(viewer, page, |author| {
            author == user_id || tables.follows.contains(&(user_id, author))
        })))
    }

    async fn fetch_post(&self, post_id: PostId, viewer: Option<UserId>) -> Result<Option<Post>> {
        Ok(self.tables.read().await.post(post_id, viewer))
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let mut tables = self.tables.write().await;
        let post_id = tables.next_id();
        tables.posts.insert(
            post_id,
            StoredPost {
                author: post.author,
                content: post.content.clone(),
                created_at: OffsetDateTime::now_utc(),
            },
        );

        tables
            .post(post_id, Some(post.author))
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn edit_post(&self, post_id: PostId, content: &PostContent) -> Result<Option<Post>> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        stored.content = content.clone();
        let author = stored.author;

        Ok(tables.post(post_id, Some(author)))
    }

    async fn delete_post(&self, post_id: PostId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.posts.remove(&post_id).is_none() {
            return Ok(false);
        }

        tables.post_likes.retain(|(liked, _), _| *liked != post_id);
        let top_level: Vec<CommentId> = tables
            .comments
            .iter()
            .filter(|(_, stored)| stored.post_id == post_id && stored.parent_id.is_none())
            .map(|(&id, _)| id)
            .collect();
        for comment_id in top_level {
            tables.remove_comment_tree(comment_id);
        }

        Ok(true)
    }

    async fn like_post(
        &self,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<Option<Id<PostLikeMarker>>> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post_id) {
            return Ok(None);
        }
        if let Some(&like) = tables.post_likes.get(&(post_id, user_id)) {
            return Ok(Some(like));
        }

        let like = tables.next_id();
        tables.post_likes.insert((post_id, user_id), like);
        Ok(Some(like))
    }

    async fn unlike_post(&self, post_id: PostId, user_id: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.post_likes.remove(&(post_id, user_id)).is_some())
    }

    async fn fetch_comments(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> Result<Option<Vec<Comment>>> {
        let tables = self.tables.read().await;
        if !tables.posts.contains_key(&post_id) {
            return Ok(None);
        }

        Ok(Some(tables.comments_where(viewer, |stored| {
            stored.post_id == post_id && stored.parent_id.is_none()
        })))
    }

    async fn fetch_replies(
        &self,
        parent_id: CommentId,
        viewer: Option<UserId>,
    ) -> Result<Option<Vec<Comment>>> {
        let tables = self.tables.read().await;
        if !tables.comments.contains_key(&parent_id) {
            return Ok(None);
        }

        Ok(Some(tables.comments_where(viewer, |stored| {
            stored.parent_id == Some(parent_id)
        })))
    }

    async fn fetch_comment(
        &self,
        comment_id: CommentId,
        viewer: Option<UserId>,
    ) -> Result<Option<Comment>> {
        Ok(self.tables.read().await.comment(comment_id, viewer))
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let mut tables = self.tables.write().await;
        let comment_id = tables.next_id();
        tables.comments.insert(
            comment_id,
            StoredComment {
                post_id: comment.post_id,
                parent_id: comment.parent_id,
                author: comment.author,
                content: comment.content.clone(),
                created_at: OffsetDateTime::now_utc(),
            },
        );

        tables
            .comment(comment_id, Some(comment.author))
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn like_comment(&self, comment_id: CommentId, user_id: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.comments.contains_key(&comment_id) {
            return Ok(false);
        }
        tables.comment_likes.insert((comment_id, user_id));
        Ok(true)
    }

    async fn unlike_comment(&self, comment_id: CommentId, user_id: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.comment_likes.remove(&(comment_id, user_id)))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryStore,
        store::{DbError, Store},
    };
    use agora_common::model::{
        Id,
        comment::CreateComment,
        page::PageQuery,
        post::{CreatePost, PostContent, PostMarker},
        user::{CreateUser, User, UserField, UserHandle},
    };

    async fn user(store: &MemoryStore, handle: &str) -> User {
        store
            .create_user(&CreateUser {
                handle: UserHandle::new(handle.to_owned()).unwrap(),
                name: handle.to_uppercase(),
                email: format!("{handle}@example.com"),
            })
            .await
            .unwrap()
    }

    async fn post(store: &MemoryStore, author: &User, text: &str) -> Id<PostMarker> {
        store
            .create_post(&CreatePost {
                author: author.id,
                content: PostContent {
                    content: Some(text.to_owned()),
                    visual_media: vec![],
                },
            })
            .await
            .unwrap()
            .id
    }

    fn page(limit: u32, cursor: u64) -> PageQuery {
        PageQuery {
            limit: Some(limit),
            cursor: Some(cursor),
        }
    }

    #[tokio::test]
    async fn user_posts_are_paged_newest_first() {
        let store = MemoryStore::default();
        let jane = user(&store, "jane").await;
        let mut ids = Vec::new();
        for n in 0..5 {
            ids.push(post(&store, &jane, &format!("post {n}")).await);
        }
        ids.reverse();

        let first = store.fetch_user_posts(jane.id, None, page(3, 0)).await.unwrap().unwrap();
        assert_eq!(first.iter().map(|post| post.id).collect::<Vec<_>>(), ids[..3].to_vec());

        let cursor = first.last().unwrap().id.get();
        let second = store.fetch_user_posts(jane.id, None, page(3, cursor)).await.unwrap().unwrap();
        assert_eq!(second.iter().map(|post| post.id).collect::<Vec<_>>(), ids[3..].to_vec());

        let cursor = second.last().unwrap().id.get();
        let third = store.fetch_user_posts(jane.id, None, page(3, cursor)).await.unwrap().unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn deleted_cursor_still_pages() {
        let store = MemoryStore::default();
        let jane = user(&store, "jane").await;
        let older = post(&store, &jane, "older").await;
        let cursor = post(&store, &jane, "cursor").await;
        post(&store, &jane, "newest").await;

        assert!(store.delete_post(cursor).await.unwrap());
        let next = store.fetch_user_posts(jane.id, None, page(10, cursor.get())).await.unwrap().unwrap();
        assert_eq!(next.iter().map(|post| post.id).collect::<Vec<_>>(), vec![older]);
    }

    #[tokio::test]
    async fn feed_includes_followed_users() {
        let store = MemoryStore::default();
        let jane = user(&store, "jane").await;
        let john = user(&store, "john").await;
        let stranger = user(&store, "stranger").await;

        let own = post(&store, &jane, "mine").await;
        let followed = post(&store, &john, "john's").await;
        post(&store, &stranger, "unrelated").await;

        assert!(store.follow(jane.id, john.id).await.unwrap());
        assert!(!store.follow(jane.id, john.id).await.unwrap());

        let feed = store.fetch_feed(jane.id, Some(jane.id), PageQuery::default()).await.unwrap().unwrap();
        assert_eq!(feed.iter().map(|post| post.id).collect::<Vec<_>>(), vec![followed, own]);

        let profile = store.fetch_profile(john.id, Some(jane.id)).await.unwrap().unwrap();
        assert_eq!(profile.follower_count, 1);
        assert_eq!(profile.is_following, Some(true));
    }

    #[tokio::test]
    async fn listings_of_missing_users_are_none() {
        let store = MemoryStore::default();
        assert!(store.fetch_feed(Id::from(7), None, PageQuery::default()).await.unwrap().is_none());
        assert!(store.fetch_user_posts(Id::from(7), None, PageQuery::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn likes_are_tagged_per_viewer() {
        let store = MemoryStore::default();
        let jane = user(&store, "jane").await;
        let john = user(&store, "john").await;
        let post_id = post(&store, &jane, "like me").await;

        let like = store.like_post(post_id, john.id).await.unwrap().unwrap();
        assert_eq!(store.like_post(post_id, john.id).await.unwrap(), Some(like));

        let as_john = store.fetch_post(post_id, Some(john.id)).await.unwrap().unwrap();
        assert_eq!(as_john.liked_by_viewer, Some(like));
        assert_eq!(as_john.counts.likes, 1);

        let as_jane = store.fetch_post(post_id, Some(jane.id)).await.unwrap().unwrap();
        assert_eq!(as_jane.liked_by_viewer, None);

        assert!(store.unlike_post(post_id, john.id).await.unwrap());
        let after = store.fetch_post(post_id, Some(john.id)).await.unwrap().unwrap();
        assert_eq!(after.counts.likes, 0);
    }

    #[tokio::test]
    async fn comments_and_replies() {
        let store = MemoryStore::default();
        let jane = user(&store, "jane").await;
        let john = user(&store, "john").await;
        let post_id = post(&store, &jane, "discuss").await;

        let comment = store
            .create_comment(&CreateComment {
                post_id,
                parent_id: None,
                author: john.id,
                content: "first".to_owned(),
            })
            .await
            .unwrap();
        let reply = store
            .create_comment(&CreateComment {
                post_id,
                parent_id: Some(comment.id),
                author: jane.id,
                content: "reply".to_owned(),
            })
            .await
            .unwrap();
        assert!(store.like_comment(comment.id, jane.id).await.unwrap());
        assert!(store.like_comment(comment.id, jane.id).await.unwrap());
        assert!(!store.like_comment(Id::from(1_u64), jane.id).await.unwrap());

        let comments = store.fetch_comments(post_id, Some(jane.id)).await.unwrap().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].reply_count, 1);
        assert!(comments[0].liked_by_viewer);

        let replies = store.fetch_replies(comment.id, Some(john.id)).await.unwrap().unwrap();
        assert_eq!(replies.iter().map(|c| c.id).collect::<Vec<_>>(), vec![reply.id]);
        assert!(!replies[0].liked_by_viewer);

        let liked = store.fetch_comment(comment.id, Some(jane.id)).await.unwrap().unwrap();
        assert_eq!(liked.like_count, 1);
        assert!(store.unlike_comment(comment.id, jane.id).await.unwrap());
        assert!(!store.unlike_comment(comment.id, jane.id).await.unwrap());
        let unliked = store.fetch_comment(comment.id, Some(jane.id)).await.unwrap().unwrap();
        assert_eq!(unliked.like_count, 0);
        assert!(!unliked.liked_by_viewer);

        let post = store.fetch_post(post_id, None).await.unwrap().unwrap();
        assert_eq!(post.counts.comments, 2);

        assert!(store.delete_post(post_id).await.unwrap());
        assert!(store.fetch_comment(comment.id, None).await.unwrap().is_none());
        assert!(store.fetch_replies(comment.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn username_conflicts() {
        let store = MemoryStore::default();
        let jane = user(&store, "jane").await;
        user(&store, "john").await;

        let err = store
            .update_user_field(jane.id, UserField::Username, Some("john".to_owned()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        let updated = store
            .update_user_field(jane.id, UserField::Username, Some("jane.d".to_owned()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.value.as_deref(), Some("jane.d"));
        let handle = UserHandle::new("jane.d".to_owned()).unwrap();
        assert_eq!(store.fetch_user_by_handle(&handle).await.unwrap().unwrap().id, jane.id);
    }
}
