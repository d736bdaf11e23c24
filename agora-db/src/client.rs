use crate::{
    record::{CommentRecord, PostRecord, ProfileRecord, UserRecord, VisualMediaRecord},
    store::{DbError, Result, Store},
};
use agora_common::{
    model::{
        AgoraSnowflakeGenerator, Id,
        comment::{Comment, CommentMarker, CreateComment},
        media::VisualMedia,
        page::PageQuery,
        post::{CreatePost, Post, PostContent, PostLikeMarker, PostMarker},
        user::{
            CreateUser, UpdatedUserField, User, UserField, UserHandle, UserMarker, UserProfile,
        },
    },
    snowflake::{ProcessId, WorkerId},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction, query, query_as, query_scalar};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

macro_rules! user_query {
    ($tail:literal) => {
        concat!(
            "
            SELECT
                users.user_snowflake,
                users.handle,
                users.name,
                users.email,
                users.bio,
                users.website,
                users.gender,
                users.relationship_status,
                users.profile_photo
            FROM
                users.users
            ",
            $tail
        )
    };
}

/// `$1` is always the viewer.
macro_rules! post_query {
    ($tail:literal) => {
        concat!(
            "
            SELECT
                posts.post_snowflake,
                posts.content,
                posts.created_at,
                users.user_snowflake,
                users.name,
                users.profile_photo,
                (SELECT count(*) FROM posts.post_likes AS likes
                    WHERE likes.post_snowflake = posts.post_snowflake) AS like_count,
                (SELECT count(*) FROM posts.comments AS comments
                    WHERE comments.post_snowflake = posts.post_snowflake) AS comment_count,
                (SELECT likes.like_snowflake FROM posts.post_likes AS likes
                    WHERE likes.post_snowflake = posts.post_snowflake
                    AND likes.user_snowflake = $1) AS viewer_like
            FROM
                posts.posts JOIN users.users ON users.user_snowflake = posts.user_snowflake
            ",
            $tail
        )
    };
}

/// `$1` is always the viewer.
macro_rules! comment_query {
    ($tail:literal) => {
        concat!(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.parent_snowflake,
                comments.content,
                comments.created_at,
                users.user_snowflake,
                users.name,
                users.profile_photo,
                (SELECT count(*) FROM posts.comment_likes AS likes
                    WHERE likes.comment_snowflake = comments.comment_snowflake) AS like_count,
                (SELECT count(*) FROM posts.comments AS replies
                    WHERE replies.parent_snowflake = comments.comment_snowflake) AS reply_count,
                EXISTS (SELECT 1 FROM posts.comment_likes AS likes
                    WHERE likes.comment_snowflake = comments.comment_snowflake
                    AND likes.user_snowflake = $1) AS liked_by_viewer
            FROM
                posts.comments JOIN users.users ON users.user_snowflake = comments.user_snowflake
            ",
            $tail
        )
    };
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|err| err.is_unique_violation())
}

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<AgoraSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(AgoraSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn next_snowflake(&self) -> i64 {
        self.snowflake_generator
            .lock()
            .await
            .generate()
            .get()
            .cast_signed()
    }

    async fn user_exists(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let exists = query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users.users WHERE users.user_snowflake = $1)",
        )
        .bind(user_id.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let exists = query_scalar(
            "SELECT EXISTS (SELECT 1 FROM posts.posts WHERE posts.post_snowflake = $1)",
        )
        .bind(post_id.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Converts post records and attaches their media in one extra query.
    async fn assemble_posts(&self, records: Vec<PostRecord>) -> Result<Vec<Post>> {
        let snowflakes: Vec<i64> = records.iter().map(|record| record.post_snowflake).collect();

        let media_records = query_as::<_, VisualMediaRecord>(
            "
            SELECT
                visual_media.post_snowflake,
                visual_media.type,
                visual_media.url
            FROM
                posts.visual_media
            WHERE
                visual_media.post_snowflake = ANY($1)
            ORDER BY
                visual_media.post_snowflake, visual_media.position
            ",
        )
        .bind(snowflakes)
        .fetch_all(&self.pool)
        .await?;

        let mut media: HashMap<i64, Vec<VisualMedia>> = HashMap::new();
        for record in media_records {
            let post_snowflake = record.post_snowflake;
            media
                .entry(post_snowflake)
                .or_default()
                .push(record.try_into()?);
        }

        records
            .into_iter()
            .map(|record| -> Result<Post> {
                let visual_media = media.remove(&record.post_snowflake).unwrap_or_default();
                let mut post = Post::try_from(record)?;
                post.visual_media = visual_media;
                Ok(post)
            })
            .collect()
    }

    async fn insert_media(
        tx: &mut Transaction<'_, Postgres>,
        post_snowflake: i64,
        visual_media: &[VisualMedia],
    ) -> Result<()> {
        for (position, media) in (0_i32..).zip(visual_media) {
            query(
                "
                INSERT INTO posts.visual_media (post_snowflake, position, type, url)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(post_snowflake)
            .bind(position)
            .bind(media.kind.as_str())
            .bind(media.url.get())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Store for DbClient {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(user_query!(
            "WHERE users.user_snowflake = $1"
        ))
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_by_handle(&self, handle: &UserHandle) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(user_query!("WHERE users.handle = $1"))
            .bind(handle.get())
            .fetch_optional(&self.pool)
            .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user_snowflake = self.next_snowflake().await;

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, handle, name, email)
            VALUES ($1, $2, $3, $4)
            RETURNING
                user_snowflake, handle, name, email, bio, website, gender,
                relationship_status, profile_photo
            ",
        )
        .bind(user_snowflake)
        .bind(user.handle.get())
        .bind(&user.name)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                DbError::Conflict("Username is already taken.".to_owned())
            } else {
                err.into()
            }
        })?;

        Ok(record.try_into()?)
    }

    async fn fetch_profile(
        &self,
        user_id: Id<UserMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<UserProfile>> {
        let record = query_as::<_, ProfileRecord>(
            "
            SELECT
                users.user_snowflake,
                users.handle,
                users.name,
                users.email,
                users.bio,
                users.website,
                users.gender,
                users.relationship_status,
                users.profile_photo,
                (SELECT count(*) FROM users.follows
                    WHERE follows.followee_snowflake = users.user_snowflake) AS follower_count,
                (SELECT count(*) FROM users.follows
                    WHERE follows.follower_snowflake = users.user_snowflake) AS following_count,
                CASE WHEN $2::BIGINT IS NULL THEN NULL ELSE EXISTS (
                    SELECT 1 FROM users.follows
                    WHERE follows.follower_snowflake = $2
                    AND follows.followee_snowflake = users.user_snowflake
                ) END AS is_following
            FROM
                users.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .bind(viewer.map(Id::to_db))
        .fetch_optional(&self.pool)
        .await?;

        let profile = record.map(UserProfile::try_from).transpose()?;
        Ok(profile)
    }

    async fn update_user_field(
        &self,
        user_id: Id<UserMarker>,
        field: UserField,
        value: Option<String>,
    ) -> Result<Option<UpdatedUserField>> {
        let column = match field {
            UserField::Username => "handle",
            UserField::Name => "name",
            UserField::Email => "email",
            UserField::Bio => "bio",
            UserField::Website => "website",
            UserField::Gender => "gender",
            UserField::RelationshipStatus => "relationship_status",
        };
        let sql = format!(
            "UPDATE users.users SET {column} = $2 WHERE users.user_snowflake = $1 RETURNING {column}"
        );

        let stored: Option<Option<String>> = query_scalar(&sql)
            .bind(user_id.to_db())
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    DbError::Conflict("Username is already taken.".to_owned())
                } else {
                    err.into()
                }
            })?;

        debug!(%user_id, %field, "Updated user field");
        Ok(stored.map(|value| UpdatedUserField { field, value }))
    }

    async fn follow(&self, follower: Id<UserMarker>, followee: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "
            INSERT INTO users.follows (follower_snowflake, followee_snowflake)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(follower.to_db())
        .bind(followee.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower: Id<UserMarker>, followee: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "
            DELETE FROM users.follows
            WHERE follows.follower_snowflake = $1 AND follows.followee_snowflake = $2
            ",
        )
        .bind(follower.to_db())
        .bind(followee.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_user_posts(
        &self,
        user_id: Id<UserMarker>,
        viewer: Option<Id<UserMarker>>,
        page: PageQuery,
    ) -> Result<Option<Vec<Post>>> {
        if !self.user_exists(user_id).await? {
            return Ok(None);
        }

        let records = query_as::<_, PostRecord>(post_query!(
            "
            WHERE
                posts.user_snowflake = $2
                AND ($3::BIGINT IS NULL OR posts.post_snowflake < $3)
            ORDER BY
                posts.post_snowflake DESC
            LIMIT $4
            "
        ))
        .bind(viewer.map(Id::to_db))
        .bind(user_id.to_db())
        .bind(page.cursor().map(Id::to_db))
        .bind(i64::from(page.limit()))
        .fetch_all(&self.pool)
        .await?;

        self.assemble_posts(records).await.map(Some)
    }

    async fn fetch_feed(
        &self,
        user_id: Id<UserMarker>,
        viewer: Option<Id<UserMarker>>,
        page: PageQuery,
    ) -> Result<Option<Vec<Post>>> {
        if !self.user_exists(user_id).await? {
            return Ok(None);
        }

        let records = query_as::<_, PostRecord>(post_query!(
            "
            WHERE
                (
                    posts.user_snowflake = $2
                    OR posts.user_snowflake IN (
                        SELECT follows.followee_snowflake FROM users.follows
                        WHERE follows.follower_snowflake = $2
                    )
                )
                AND ($3::BIGINT IS NULL OR posts.post_snowflake < $3)
            ORDER BY
                posts.post_snowflake DESC
            LIMIT $4
            "
        ))
        .bind(viewer.map(Id::to_db))
        .bind(user_id.to_db())
        .bind(page.cursor().map(Id::to_db))
        .bind(i64::from(page.limit()))
        .fetch_all(&self.pool)
        .await?;

        self.assemble_posts(records).await.map(Some)
    }

    async fn fetch_post(
        &self,
        post_id: Id<PostMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(post_query!("WHERE posts.post_snowflake = $2"))
            .bind(viewer.map(Id::to_db))
            .bind(post_id.to_db())
            .fetch_optional(&self.pool)
            .await?;

        let Some(record) = record else {
            return Ok(None);
        };
        Ok(self.assemble_posts(vec![record]).await?.pop())
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let post_snowflake = self.next_snowflake().await;

        let mut tx = self.pool.begin().await?;
        query(
            "
            INSERT INTO posts.posts (post_snowflake, content, user_snowflake)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(post_snowflake)
        .bind(post.content.content.as_deref())
        .bind(post.author.to_db())
        .execute(&mut *tx)
        .await?;
        Self::insert_media(&mut tx, post_snowflake, &post.content.visual_media).await?;
        tx.commit().await?;

        let post_id = Id::from_db(post_snowflake);
        self.fetch_post(post_id, Some(post.author))
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn edit_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let mut tx = self.pool.begin().await?;
        let author: Option<i64> = query_scalar(
            "
            UPDATE posts.posts SET content = $2
            WHERE posts.post_snowflake = $1
            RETURNING posts.user_snowflake
            ",
        )
        .bind(post_id.to_db())
        .bind(content.content.as_deref())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(author) = author else {
            return Ok(None);
        };

        query("DELETE FROM posts.visual_media WHERE visual_media.post_snowflake = $1")
            .bind(post_id.to_db())
            .execute(&mut *tx)
            .await?;
        Self::insert_media(&mut tx, post_id.to_db(), &content.visual_media).await?;
        tx.commit().await?;

        self.fetch_post(post_id, Some(Id::from_db(author))).await
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE posts.post_snowflake = $1")
            .bind(post_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Option<Id<PostLikeMarker>>> {
        let like_snowflake = self.next_snowflake().await;

        query(
            "
            INSERT INTO posts.post_likes (like_snowflake, post_snowflake, user_snowflake)
            SELECT $1, $2, $3
            WHERE EXISTS (SELECT 1 FROM posts.posts WHERE posts.post_snowflake = $2)
            ON CONFLICT (post_snowflake, user_snowflake) DO NOTHING
            ",
        )
        .bind(like_snowflake)
        .bind(post_id.to_db())
        .bind(user_id.to_db())
        .execute(&self.pool)
        .await?;

        let like: Option<i64> = query_scalar(
            "
            SELECT post_likes.like_snowflake FROM posts.post_likes
            WHERE post_likes.post_snowflake = $1 AND post_likes.user_snowflake = $2
            ",
        )
        .bind(post_id.to_db())
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(like.map(Id::from_db))
    }

    async fn unlike_post(&self, post_id: Id<PostMarker>, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "
            DELETE FROM posts.post_likes
            WHERE post_likes.post_snowflake = $1 AND post_likes.user_snowflake = $2
            ",
        )
        .bind(post_id.to_db())
        .bind(user_id.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_comments(
        &self,
        post_id: Id<PostMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Vec<Comment>>> {
        if !self.post_exists(post_id).await? {
            return Ok(None);
        }

        let records = query_as::<_, CommentRecord>(comment_query!(
            "
            WHERE
                comments.post_snowflake = $2 AND comments.parent_snowflake IS NULL
            ORDER BY
                comments.comment_snowflake
            "
        ))
        .bind(viewer.map(Id::to_db))
        .bind(post_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Some(comments))
    }

    async fn fetch_replies(
        &self,
        parent_id: Id<CommentMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Vec<Comment>>> {
        if self.fetch_comment(parent_id, None).await?.is_none() {
            return Ok(None);
        }

        let records = query_as::<_, CommentRecord>(comment_query!(
            "
            WHERE
                comments.parent_snowflake = $2
            ORDER BY
                comments.comment_snowflake
            "
        ))
        .bind(viewer.map(Id::to_db))
        .bind(parent_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let replies = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Some(replies))
    }

    async fn fetch_comment(
        &self,
        comment_id: Id<CommentMarker>,
        viewer: Option<Id<UserMarker>>,
    ) -> Result<Option<Comment>> {
        let record = query_as::<_, CommentRecord>(comment_query!(
            "WHERE comments.comment_snowflake = $2"
        ))
        .bind(viewer.map(Id::to_db))
        .bind(comment_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let comment = record.map(Comment::try_from).transpose()?;
        Ok(comment)
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let comment_snowflake = self.next_snowflake().await;

        query(
            "
            INSERT INTO posts.comments
                (comment_snowflake, post_snowflake, parent_snowflake, user_snowflake, content)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(comment_snowflake)
        .bind(comment.post_id.to_db())
        .bind(comment.parent_id.map(Id::to_db))
        .bind(comment.author.to_db())
        .bind(&comment.content)
        .execute(&self.pool)
        .await?;

        self.fetch_comment(Id::from_db(comment_snowflake), Some(comment.author))
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn like_comment(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<bool> {
        query(
            "
            INSERT INTO posts.comment_likes (comment_snowflake, user_snowflake)
            SELECT $1, $2
            WHERE EXISTS (SELECT 1 FROM posts.comments WHERE comments.comment_snowflake = $1)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(comment_id.to_db())
        .bind(user_id.to_db())
        .execute(&self.pool)
        .await?;

        let exists = query_scalar(
            "SELECT EXISTS (SELECT 1 FROM posts.comments WHERE comments.comment_snowflake = $1)",
        )
        .bind(comment_id.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn unlike_comment(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<bool> {
        let result = query(
            "
            DELETE FROM posts.comment_likes
            WHERE comment_likes.comment_snowflake = $1 AND comment_likes.user_snowflake = $2
            ",
        )
        .bind(comment_id.to_db())
        .bind(user_id.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
