//! Resolves the user a request is made on behalf of.
//!
//! Sessions are handled by the gateway in front of this service, which passes the
//! resolved user id along in the `X-Viewer-Id` header.

use crate::server::ServerError;
use agora_common::model::{Id, user::UserMarker};
use agora_db::store::Store;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Header, HeaderName, HeaderValue};
use std::sync::Arc;

pub static VIEWER_HEADER: HeaderName = HeaderName::from_static("x-viewer-id");

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct ViewerId(pub Id<UserMarker>);

impl Header for ViewerId {
    fn name() -> &'static HeaderName {
        &VIEWER_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        values
            .next()
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map(ViewerId)
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(HeaderValue::from(self.0.get())));
    }
}

/// A viewer that must be present and must exist.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }

    /// Fails with [`ServerError::Forbidden`] unless this is `owner`.
    pub fn ensure_is(self, owner: Id<UserMarker>) -> Result<(), ServerError> {
        if self.id == owner {
            Ok(())
        } else {
            Err(ServerError::Forbidden(self.id))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(ViewerId(id)) = TypedHeader::<ViewerId>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                if rejection.is_missing() {
                    ServerError::MissingViewer
                } else {
                    ServerError::InvalidViewerHeader(rejection)
                }
            })?;

        Arc::<dyn Store>::from_ref(state)
            .fetch_user(id)
            .await?
            .ok_or(ServerError::UnknownViewer(id))?;

        Ok(Self { id })
    }
}

/// An optional viewer, used by reads to tag likes and follows.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Viewer(pub Option<Id<UserMarker>>);

impl<S> FromRequestParts<S> for Viewer
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(ViewerId::name()) {
            return Ok(Self(None));
        }

        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        Ok(Self(Some(user.user_id())))
    }
}
