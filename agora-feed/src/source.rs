use agora_common::model::{
    Id,
    comment::{Comment, CommentMarker},
    page::FeedKind,
    post::{Post, PostContent, PostMarker},
    user::{UpdateUserField, UpdatedUserField, UserField, UserMarker},
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const VIEWER_HEADER: &str = "x-viewer-id";

/// Identifies one listing: whose posts, and which kind.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct FeedKey {
    pub user_id: Id<UserMarker>,
    pub kind: FeedKind,
}

/// The listings a [`FetchError`] can be shown for.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Listing {
    Posts,
    Comments,
    Replies,
}

impl Listing {
    /// What users get to see when loading fails. Failures are not told apart.
    #[must_use]
    pub fn error_message(self) -> &'static str {
        match self {
            Listing::Posts => "Error loading posts",
            Listing::Comments => "Error loading comments",
            Listing::Replies => "Error getting replies",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Server replied with status {0}")]
    Status(StatusCode),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

/// A failed edit.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The server refused the value; the message belongs next to the input.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// What to do after a profile field was saved.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum FieldUpdateOutcome {
    Updated(UpdatedUserField),
    /// The username changed, so the profile moved to a new path.
    Navigate(String),
}

impl From<UpdatedUserField> for FieldUpdateOutcome {
    fn from(updated: UpdatedUserField) -> Self {
        match (&updated.field, &updated.value) {
            (UserField::Username, Some(username)) => {
                FieldUpdateOutcome::Navigate(format!("/{username}/about"))
            }
            _ => FieldUpdateOutcome::Updated(updated),
        }
    }
}

/// Where a [`Feed`](crate::feed::Feed) gets its pages from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Up to `limit` posts older than `cursor`, newest first. Empty at the end.
    async fn fetch_page(
        &self,
        key: FeedKey,
        cursor: Option<Id<PostMarker>>,
        limit: u32,
    ) -> Result<Vec<Post>, FetchError>;

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<(), FetchError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the agora api.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: Url,
    viewer: Option<Id<UserMarker>>,
}

impl ApiClient {
    /// `base` is the origin the api is served from, e.g. `http://localhost:3000`.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    #[must_use]
    pub fn with_client(http: Client, base: Url) -> Self {
        Self {
            http,
            base,
            viewer: None,
        }
    }

    /// Requests are made on behalf of `viewer`.
    #[must_use]
    pub fn with_viewer(mut self, viewer: Id<UserMarker>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn page_url(
        &self,
        key: FeedKey,
        cursor: Option<Id<PostMarker>>,
        limit: u32,
    ) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join(&format!("/api/users/{}/{}", key.user_id, key.kind.endpoint()))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("cursor", &cursor.map_or(0, Id::get).to_string());
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, FetchError> {
        Ok(self.request_url(method, self.base.join(path)?))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match self.viewer {
            Some(viewer) => request.header(VIEWER_HEADER, viewer.to_string()),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, FetchError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, url = %response.url(), "Request failed");
            return Err(FetchError::Status(status));
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
        Ok(Self::send(request).await?.json().await?)
    }

    /// Like [`Self::fetch`], but hands the server's message back for rejected input.
    async fn mutate<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, MutationError> {
        let response = request.send().await.map_err(FetchError::from)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await.map_err(FetchError::from)?);
        }

        match response.json::<ErrorBody>().await {
            Ok(ErrorBody {
                message: Some(message),
            }) => Err(MutationError::Rejected(message)),
            _ => Err(FetchError::Status(status).into()),
        }
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Post, FetchError> {
        Self::fetch(self.request(Method::GET, &format!("/api/posts/{post_id}"))?).await
    }

    /// Top-level comments, oldest first.
    pub async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>, FetchError> {
        Self::fetch(self.request(Method::GET, &format!("/api/posts/{post_id}/comments"))?).await
    }

    pub async fn fetch_replies(
        &self,
        parent_id: Id<CommentMarker>,
    ) -> Result<Vec<Comment>, FetchError> {
        Self::fetch(self.request(Method::GET, &format!("/api/comments/{parent_id}/replies"))?)
            .await
    }

    pub async fn update_user_field(
        &self,
        user_id: Id<UserMarker>,
        edit: &UpdateUserField,
    ) -> Result<FieldUpdateOutcome, MutationError> {
        let request = self
            .request(Method::PATCH, &format!("/api/users/{user_id}"))?
            .json(edit);
        let updated: UpdatedUserField = Self::mutate(request).await?;

        debug!(%user_id, field = %updated.field, "Updated profile field");
        Ok(updated.into())
    }

    pub async fn edit_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Post, MutationError> {
        let request = self
            .request(Method::PUT, &format!("/api/posts/{post_id}"))?
            .json(content);
        Self::mutate(request).await
    }

    pub async fn like_post(&self, post_id: Id<PostMarker>) -> Result<Post, FetchError> {
        Self::fetch(self.request(Method::PUT, &format!("/api/posts/{post_id}/likes"))?).await
    }

    pub async fn unlike_post(&self, post_id: Id<PostMarker>) -> Result<Post, FetchError> {
        Self::fetch(self.request(Method::DELETE, &format!("/api/posts/{post_id}/likes"))?).await
    }
}

#[async_trait]
impl FeedSource for ApiClient {
    async fn fetch_page(
        &self,
        key: FeedKey,
        cursor: Option<Id<PostMarker>>,
        limit: u32,
    ) -> Result<Vec<Post>, FetchError> {
        let url = self.page_url(key, cursor, limit)?;
        debug!(%url, "Fetching page");

        Self::fetch(self.request_url(Method::GET, url)).await
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<(), FetchError> {
        Self::send(self.request(Method::DELETE, &format!("/api/posts/{post_id}"))?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::source::{ApiClient, FeedKey, FieldUpdateOutcome, Listing};
    use agora_common::model::{
        Id,
        page::FeedKind,
        user::{UpdatedUserField, UserField},
    };
    use url::Url;

    fn client() -> ApiClient {
        ApiClient::new(Url::parse("http://localhost:3000").unwrap())
    }

    #[test]
    fn page_urls() {
        let feed = FeedKey {
            user_id: Id::from(7_u64),
            kind: FeedKind::Feed,
        };
        let url = client().page_url(feed, None, 10).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/users/7/feed?limit=10&cursor=0"
        );

        let profile = FeedKey {
            kind: FeedKind::Profile,
            ..feed
        };
        let url = client().page_url(profile, Some(Id::from(91_u64)), 10).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/users/7/posts?limit=10&cursor=91"
        );
    }

    #[test]
    fn username_changes_navigate() {
        let renamed = UpdatedUserField {
            field: UserField::Username,
            value: Some("jane.doe".to_owned()),
        };
        assert_eq!(
            FieldUpdateOutcome::from(renamed),
            FieldUpdateOutcome::Navigate("/jane.doe/about".to_owned())
        );

        let bio = UpdatedUserField {
            field: UserField::Bio,
            value: None,
        };
        assert_eq!(
            FieldUpdateOutcome::from(bio.clone()),
            FieldUpdateOutcome::Updated(bio)
        );
    }

    #[test]
    fn failures_are_generic() {
        assert_eq!(Listing::Posts.error_message(), "Error loading posts");
        assert_eq!(Listing::Replies.error_message(), "Error getting replies");
    }
}
