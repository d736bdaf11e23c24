use crate::server::{
    Result, ServerError, ServerRouter,
    extract::Json,
    viewer::{AuthenticatedUser, Viewer},
};
use agora_common::model::{
    Id,
    comment::{Comment, CommentContent, CreateComment},
    post::{CreatePost, Post, PostContent, PostMarker},
    user::UserMarker,
};
use agora_db::store::Store;
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_put(edit_post)
        .typed_delete(delete_post)
        .typed_put(like_post)
        .typed_delete(unlike_post)
        .typed_get(get_comments)
        .typed_post(create_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

async fn create_post(
    PostsPath(): PostsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(content): Json<PostContent>,
) -> Result<(StatusCode, Json<Post>)> {
    let post = store
        .create_post(&CreatePost {
            author: user.user_id(),
            content: content.validated()?,
        })
        .await?;

    info!(post = %post.id, author = %post.author.id, "Created post");
    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn fetch_post(
    store: &dyn Store,
    post_id: Id<PostMarker>,
    viewer: Option<Id<UserMarker>>,
) -> Result<Post> {
    store
        .fetch_post(post_id, viewer)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))
}

async fn get_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
) -> Result<Json<Post>> {
    Ok(Json(fetch_post(store.as_ref(), id, viewer).await?))
}

async fn edit_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(content): Json<PostContent>,
) -> Result<Json<Post>> {
    let post = fetch_post(store.as_ref(), id, None).await?;
    user.ensure_is(post.author.id)?;

    let post = store
        .edit_post(id, &content.validated()?)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    let post = fetch_post(store.as_ref(), id, None).await?;
    user.ensure_is(post.author.id)?;

    if !store.delete_post(id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }

    info!(post = %id, "Deleted post");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/likes", rejection(ServerError))]
struct PostLikesPath {
    id: Id<PostMarker>,
}

async fn like_post(
    PostLikesPath { id }: PostLikesPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Post>> {
    store
        .like_post(id, user.user_id())
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(fetch_post(store.as_ref(), id, Some(user.user_id())).await?))
}

async fn unlike_post(
    PostLikesPath { id }: PostLikesPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Post>> {
    store.unlike_post(id, user.user_id()).await?;

    Ok(Json(fetch_post(store.as_ref(), id, Some(user.user_id())).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comments", rejection(ServerError))]
struct PostCommentsPath {
    id: Id<PostMarker>,
}

async fn get_comments(
    PostCommentsPath { id }: PostCommentsPath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
) -> Result<Json<Vec<Comment>>> {
    let comments = store
        .fetch_comments(id, viewer)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(comments))
}

async fn create_comment(
    PostCommentsPath { id }: PostCommentsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(content): Json<CommentContent>,
) -> Result<(StatusCode, Json<Comment>)> {
    let CommentContent { content } = content.validated()?;
    fetch_post(store.as_ref(), id, None).await?;

    let comment = store
        .create_comment(&CreateComment {
            post_id: id,
            parent_id: None,
            author: user.user_id(),
            content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::TestServer;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn create_and_fetch() {
        let server = TestServer::new();
        let jane = server.user("jane").await;

        let (status, created) = server
            .api(
                "POST",
                "/api/posts",
                Some(&jane),
                Some(json!({
                    "content": "  first light  ",
                    "visual_media": [{ "type": "PHOTO", "url": "/media/sunrise.jpg" }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["content"], json!("first light"));
        assert_eq!(created["author"]["name"], json!("JANE"));
        assert_eq!(created["counts"], json!({ "likes": 0, "comments": 0 }));
        assert_eq!(created["liked_by_viewer"], json!(null));

        let id = created["id"].as_u64().unwrap();
        let (status, fetched) = server.api("GET", &format!("/api/posts/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["visual_media"], created["visual_media"]);
    }

    #[tokio::test]
    async fn empty_posts_are_rejected() {
        let server = TestServer::new();
        let jane = server.user("jane").await;

        let (status, body) = server
            .api("POST", "/api/posts", Some(&jane), Some(json!({ "content": "   " })))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["message"],
            json!("A post needs text or at least one attachment.")
        );
    }

    #[tokio::test]
    async fn only_the_author_edits_and_deletes() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let john = server.user("john").await;
        let post = server.post(&jane, "mine").await;
        let uri = format!("/api/posts/{post}");

        let (status, _) = server
            .api("PUT", &uri, Some(&john), Some(json!({ "content": "yours" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = server.api("DELETE", &uri, Some(&john), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, edited) = server
            .api("PUT", &uri, Some(&jane), Some(json!({ "content": "still mine" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["content"], json!("still mine"));
        assert_eq!(edited["id"].as_u64(), Some(post.get()));

        let (status, _) = server.api("DELETE", &uri, Some(&jane), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = server.api("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn likes_are_tagged_for_the_liking_viewer() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let john = server.user("john").await;
        let post = server.post(&jane, "like me").await;
        let likes = format!("/api/posts/{post}/likes");

        let (status, liked) = server.api("PUT", &likes, Some(&john), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(liked["counts"]["likes"], json!(1));
        assert!(liked["liked_by_viewer"].is_u64());

        let (_, again) = server.api("PUT", &likes, Some(&john), None).await;
        assert_eq!(again["counts"]["likes"], json!(1));
        assert_eq!(again["liked_by_viewer"], liked["liked_by_viewer"]);

        let (_, as_jane) = server
            .api("GET", &format!("/api/posts/{post}"), Some(&jane), None)
            .await;
        assert_eq!(as_jane["counts"]["likes"], json!(1));
        assert_eq!(as_jane["liked_by_viewer"], json!(null));

        let (_, unliked) = server.api("DELETE", &likes, Some(&john), None).await;
        assert_eq!(unliked["counts"]["likes"], json!(0));
        assert_eq!(unliked["liked_by_viewer"], json!(null));
    }

    #[tokio::test]
    async fn comments_count_towards_the_post() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let post = server.post(&jane, "discuss").await;
        let comments = format!("/api/posts/{post}/comments");

        let (status, comment) = server
            .api("POST", &comments, Some(&jane), Some(json!({ "content": "first" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["parent_id"], json!(null));
        assert_eq!(comment["post_id"].as_u64(), Some(post.get()));

        let (status, listed) = server.api("GET", &comments, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let (_, fetched) = server.api("GET", &format!("/api/posts/{post}"), None, None).await;
        assert_eq!(fetched["counts"]["comments"], json!(1));

        let (status, _) = server
            .api("GET", "/api/posts/404/comments", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
