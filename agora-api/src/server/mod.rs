use agora_common::model::{
    Id,
    comment::{CommentMarker, InvalidCommentContentError},
    page::CursorOutOfRangeError,
    post::{InvalidPostContentError, PostMarker},
    user::{InvalidUserFieldValueError, UserHandle, UserMarker},
};
use agora_db::store::{DbError, Store};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use extract::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod extract;
mod routes;
mod viewer;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
}

/// All endpoints live under `/api`.
pub fn routes() -> ServerRouter {
    Router::new()
        .nest("/api", routes::routes())
        .fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Viewer header was invalid: {0}")]
    InvalidViewerHeader(TypedHeaderRejection),
    #[error("This action requires a viewer")]
    MissingViewer,
    #[error("Viewer {0} does not exist")]
    UnknownViewer(Id<UserMarker>),
    #[error("Viewer {0} may not modify this resource")]
    Forbidden(Id<UserMarker>),
    #[error("Users cannot follow themselves")]
    SelfFollow,
    #[error(transparent)]
    InvalidUserField(#[from] InvalidUserFieldValueError),
    #[error(transparent)]
    InvalidPostContent(#[from] InvalidPostContentError),
    #[error(transparent)]
    InvalidCommentContent(#[from] InvalidCommentContentError),
    #[error(transparent)]
    InvalidCursor(#[from] CursorOutOfRangeError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
    #[error("User with handle {0} was not found.")]
    UserByHandleNotFound(UserHandle),
    #[error("Comment with id {0} was not found.")]
    CommentByIdNotFound(Id<CommentMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByIdNotFound(_)
            | ServerError::UserByHandleNotFound(_)
            | ServerError::CommentByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MissingViewer | ServerError::UnknownViewer(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidViewerHeader(_)
            | ServerError::SelfFollow => StatusCode::BAD_REQUEST,
            ServerError::InvalidUserField(_)
            | ServerError::InvalidPostContent(_)
            | ServerError::InvalidCommentContent(_)
            | ServerError::InvalidCursor(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Database(DbError::Conflict(_)) => StatusCode::CONFLICT,
            ServerError::JsonResponse(_) | ServerError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown next to the offending input. Only set for errors the user can fix.
    pub fn message(&self) -> Option<String> {
        match self {
            ServerError::InvalidUserField(_)
            | ServerError::InvalidPostContent(_)
            | ServerError::InvalidCommentContent(_)
            | ServerError::InvalidCursor(_)
            | ServerError::SelfFollow
            | ServerError::Database(DbError::Conflict(_)) => Some(self.to_string()),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message: self.message(),
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::server::{ServerState, routes, viewer::VIEWER_HEADER};
    use agora_common::model::{
        Id,
        post::{CreatePost, PostContent, PostMarker},
        user::{CreateUser, User, UserHandle},
    };
    use agora_db::{memory::MemoryStore, store::Store};
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    pub struct TestServer {
        pub store: Arc<MemoryStore>,
        router: Router,
    }

    impl TestServer {
        pub fn new() -> Self {
            let store = Arc::new(MemoryStore::default());
            let router = routes().with_state(ServerState {
                store: store.clone(),
            });
            Self { store, router }
        }

        pub async fn user(&self, handle: &str) -> User {
            self.store
                .create_user(&CreateUser {
                    handle: UserHandle::new(handle.to_owned()).unwrap(),
                    name: handle.to_uppercase(),
                    email: format!("{handle}@example.com"),
                })
                .await
                .unwrap()
        }

        pub async fn post(&self, author: &User, text: &str) -> Id<PostMarker> {
            self.store
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

        pub async fn api(
            &self,
            method: &str,
            uri: &str,
            viewer: Option<&User>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(viewer) = viewer {
                builder = builder.header(VIEWER_HEADER.as_str(), viewer.id.to_string());
            }
            if body.is_some() {
                builder = builder.header("content-type", "application/json");
            }
            let body = match body {
                Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
                None => Body::empty(),
            };
            let req = builder.body(body).unwrap();
            let resp = self.router.clone().oneshot(req).await.unwrap();
            let status = resp.status();
            let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                serde_json::json!(null)
            } else {
                serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null))
            };
            (status, json)
        }
    }
}
