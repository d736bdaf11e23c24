use crate::server::{
    Result, ServerError, ServerRouter,
    extract::Json,
    viewer::{AuthenticatedUser, Viewer},
};
use agora_common::model::{
    Id,
    comment::{Comment, CommentContent, CommentMarker, CreateComment},
};
use agora_db::store::Store;
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_replies)
        .typed_post(create_reply)
        .typed_put(like_comment)
        .typed_delete(unlike_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comments/{id}/replies", rejection(ServerError))]
struct RepliesPath {
    id: Id<CommentMarker>,
}

async fn get_replies(
    RepliesPath { id }: RepliesPath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
) -> Result<Json<Vec<Comment>>> {
    let replies = store
        .fetch_replies(id, viewer)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;

    Ok(Json(replies))
}

/// Replies live on the same post as their parent.
async fn create_reply(
    RepliesPath { id }: RepliesPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(content): Json<CommentContent>,
) -> Result<(StatusCode, Json<Comment>)> {
    let CommentContent { content } = content.validated()?;
    let parent = store
        .fetch_comment(id, None)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;

    let reply = store
        .create_comment(&CreateComment {
            post_id: parent.post_id,
            parent_id: Some(id),
            author: user.user_id(),
            content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comments/{id}/likes", rejection(ServerError))]
struct CommentLikesPath {
    id: Id<CommentMarker>,
}

async fn fetch_comment_for(
    store: &dyn Store,
    user: AuthenticatedUser,
    id: Id<CommentMarker>,
) -> Result<Comment> {
    store
        .fetch_comment(id, Some(user.user_id()))
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))
}

async fn like_comment(
    CommentLikesPath { id }: CommentLikesPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Comment>> {
    if !store.like_comment(id, user.user_id()).await? {
        return Err(ServerError::CommentByIdNotFound(id));
    }

    Ok(Json(fetch_comment_for(store.as_ref(), user, id).await?))
}

async fn unlike_comment(
    CommentLikesPath { id }: CommentLikesPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Comment>> {
    store.unlike_comment(id, user.user_id()).await?;

    Ok(Json(fetch_comment_for(store.as_ref(), user, id).await?))
}
