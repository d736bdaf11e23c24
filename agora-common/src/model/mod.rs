pub mod comment;
pub mod media;
pub mod page;
pub mod post;
pub mod user;

use crate::{
    model::{
        media::InvalidMediaUrlError,
        user::{InvalidUserFieldValueError, InvalidUserHandleError},
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData, str::FromStr};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserHandle(#[from] InvalidUserHandleError),
    #[error(transparent)]
    UserFieldValue(#[from] InvalidUserFieldValueError),
    #[error(transparent)]
    MediaUrl(#[from] InvalidMediaUrlError),
    #[error("Unknown visual media type: {0}")]
    MediaType(String),
    #[error("Negative count in aggregate: {0}")]
    NegativeCount(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AgoraEpoch;
impl Epoch for AgoraEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type AgoraSnowflake = Snowflake<AgoraEpoch>;
pub type AgoraSnowflakeGenerator = SnowflakeGenerator<AgoraEpoch>;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(AgoraSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: AgoraSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> AgoraSnowflake {
        self.0
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Ids travel through Postgres `BIGINT` columns bit for bit.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::from)
    }
}

impl<Marker> From<AgoraSnowflake> for Id<Marker> {
    fn from(value: AgoraSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for AgoraSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(AgoraSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

/// Converts a database aggregate into a count.
pub fn count_from_db(value: i64) -> Result<u64, ModelValidationError> {
    u64::try_from(value).map_err(|_| ModelValidationError::NegativeCount(value))
}
