use crate::server::{
    Result, ServerError, ServerRouter,
    extract::{Json, Query},
    viewer::{AuthenticatedUser, Viewer},
};
use agora_common::model::{
    Id,
    page::PageQuery,
    post::Post,
    user::{UpdateUserField, UpdatedUserField, UserHandle, UserMarker, UserProfile},
};
use agora_db::store::Store;
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_user)
        .typed_get(get_user_by_handle)
        .typed_patch(update_user_field)
        .typed_get(get_user_posts)
        .typed_get(get_user_feed)
        .typed_put(follow_user)
        .typed_delete(unfollow_user)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    UserPath { id }: UserPath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
) -> Result<Json<UserProfile>> {
    let profile = store
        .fetch_profile(id, viewer)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(profile))
}

/// Profiles are addressed by username in links.
#[derive(TypedPath, Deserialize)]
#[typed_path("/handles/{handle}", rejection(ServerError))]
struct HandlePath {
    handle: UserHandle,
}

async fn get_user_by_handle(
    HandlePath { handle }: HandlePath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
) -> Result<Json<UserProfile>> {
    let Some(user) = store.fetch_user_by_handle(&handle).await? else {
        return Err(ServerError::UserByHandleNotFound(handle));
    };
    let profile = store
        .fetch_profile(user.id, viewer)
        .await?
        .ok_or(ServerError::UserByIdNotFound(user.id))?;

    Ok(Json(profile))
}

async fn update_user_field(
    UserPath { id }: UserPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(UpdateUserField { field, value }): Json<UpdateUserField>,
) -> Result<Json<UpdatedUserField>> {
    user.ensure_is(id)?;
    let value = field.normalize(value)?;

    let updated = store
        .update_user_field(id, field, value)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(updated))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/posts", rejection(ServerError))]
struct UserPostsPath {
    id: Id<UserMarker>,
}

async fn get_user_posts(
    UserPostsPath { id }: UserPostsPath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Post>>> {
    let page = page.validated()?;
    let posts = store
        .fetch_user_posts(id, viewer, page)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    debug!(user = %id, count = posts.len(), cursor = ?page.cursor(), "Serving profile page");
    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/feed", rejection(ServerError))]
struct UserFeedPath {
    id: Id<UserMarker>,
}

async fn get_user_feed(
    UserFeedPath { id }: UserFeedPath,
    State(store): State<Arc<dyn Store>>,
    Viewer(viewer): Viewer,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Post>>> {
    let page = page.validated()?;
    let posts = store
        .fetch_feed(id, viewer, page)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    debug!(user = %id, count = posts.len(), cursor = ?page.cursor(), "Serving feed page");
    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/followers", rejection(ServerError))]
struct FollowersPath {
    id: Id<UserMarker>,
}

async fn follow_user(
    FollowersPath { id }: FollowersPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    if user.user_id() == id {
        return Err(ServerError::SelfFollow);
    }
    store
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    store.follow(user.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unfollow_user(
    FollowersPath { id }: FollowersPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    store.unfollow(user.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::TestServer;
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    fn ids(body: &Value) -> Vec<u64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|post| post["id"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn profile_pages_follow_the_cursor() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let mut posted = Vec::new();
        for n in 0..12 {
            posted.push(server.post(&jane, &format!("post {n}")).await.get());
        }
        posted.reverse();

        let (status, first) = server
            .api("GET", &format!("/api/users/{}/posts?limit=10&cursor=0", jane.id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&first), posted[..10].to_vec());

        let cursor = posted[9];
        let (_, second) = server
            .api(
                "GET",
                &format!("/api/users/{}/posts?limit=10&cursor={cursor}", jane.id),
                None,
                None,
            )
            .await;
        assert_eq!(ids(&second), posted[10..].to_vec());

        let cursor = posted[11];
        let (_, third) = server
            .api(
                "GET",
                &format!("/api/users/{}/posts?limit=10&cursor={cursor}", jane.id),
                None,
                None,
            )
            .await;
        assert_eq!(third, json!([]));
    }

    #[tokio::test]
    async fn bad_query_is_rejected() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let (status, _) = server
            .api("GET", &format!("/api/users/{}/posts?limit=many", jane.id), None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cursors_beyond_stored_ids_are_rejected() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        server.post(&jane, "hello").await;

        for listing in ["posts", "feed"] {
            let (status, body) = server
                .api(
                    "GET",
                    &format!("/api/users/{}/{listing}?cursor=9223372036854775808", jane.id),
                    None,
                    None,
                )
                .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(
                body["message"],
                json!("Cursor 9223372036854775808 is out of range.")
            );
        }

        let (status, body) = server
            .api(
                "GET",
                &format!("/api/users/{}/posts?cursor=9223372036854775807", jane.id),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let server = TestServer::new();
        let (status, body) = server.api("GET", "/api/users/999/feed", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "status": 404 }));
    }

    #[tokio::test]
    async fn feed_follows_and_profile_counts() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let john = server.user("john").await;
        let johns_post = server.post(&john, "hello").await.get();

        let (status, _) = server
            .api("PUT", &format!("/api/users/{}/followers", john.id), Some(&jane), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, feed) = server
            .api("GET", &format!("/api/users/{}/feed", jane.id), Some(&jane), None)
            .await;
        assert_eq!(ids(&feed), vec![johns_post]);

        let (_, profile) = server
            .api("GET", &format!("/api/users/{}", john.id), Some(&jane), None)
            .await;
        assert_eq!(profile["follower_count"], json!(1));
        assert_eq!(profile["is_following"], json!(true));
        assert_eq!(profile["handle"], json!("john"));

        let (status, _) = server
            .api("PUT", &format!("/api/users/{}/followers", jane.id), Some(&jane), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        server
            .api("DELETE", &format!("/api/users/{}/followers", john.id), Some(&jane), None)
            .await;
        let (_, feed) = server
            .api("GET", &format!("/api/users/{}/feed", jane.id), Some(&jane), None)
            .await;
        assert_eq!(feed, json!([]));
    }

    #[tokio::test]
    async fn field_edits() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        server.user("john").await;
        let uri = format!("/api/users/{}", jane.id);

        let (status, body) = server
            .api(
                "PATCH",
                &uri,
                Some(&jane),
                Some(json!({ "field": "relationship_status", "value": "in a relationship" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "relationship_status": "IN_A_RELATIONSHIP" }));

        let (status, body) = server
            .api(
                "PATCH",
                &uri,
                Some(&jane),
                Some(json!({ "field": "relationship_status", "value": "it's complicated" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "relationship_status": "IT'S_COMPLICATED" }));
        let (_, profile) = server.api("GET", &uri, None, None).await;
        assert_eq!(profile["relationship_status"], json!("IT'S_COMPLICATED"));

        let (status, body) = server
            .api(
                "PATCH",
                &uri,
                Some(&jane),
                Some(json!({ "field": "username", "value": "john" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], json!("Username is already taken."));

        let (status, body) = server
            .api(
                "PATCH",
                &uri,
                Some(&jane),
                Some(json!({ "field": "name", "value": null })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], json!("name cannot be removed."));

        let (status, body) = server
            .api("PATCH", &uri, Some(&jane), Some(json!({ "field": "bio", "value": null })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "bio": null }));
    }

    #[tokio::test]
    async fn field_edits_of_other_users_are_forbidden() {
        let server = TestServer::new();
        let jane = server.user("jane").await;
        let john = server.user("john").await;

        let (status, _) = server
            .api(
                "PATCH",
                &format!("/api/users/{}", jane.id),
                Some(&john),
                Some(json!({ "field": "name", "value": "Mallory" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn profiles_by_handle_follow_renames() {
        let server = TestServer::new();
        let jane = server.user("jane").await;

        let (status, profile) = server.api("GET", "/api/handles/jane", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["id"].as_u64(), Some(jane.id.get()));

        server
            .api(
                "PATCH",
                &format!("/api/users/{}", jane.id),
                Some(&jane),
                Some(json!({ "field": "username", "value": "jane.doe" })),
            )
            .await;
        let (status, _) = server.api("GET", "/api/handles/jane", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, profile) = server.api("GET", "/api/handles/jane.doe", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["handle"], json!("jane.doe"));

        let (status, _) = server.api("GET", "/api/handles/not%20valid", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
