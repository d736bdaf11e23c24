use crate::model::{Id, media::MediaUrl};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected},
    ser::SerializeMap,
};
use std::{collections::BTreeMap, fmt::Display};
use thiserror::Error;

pub const USER_HANDLE_MAX_LEN: usize = 50;
pub const USER_NAME_MAX_LEN: usize = 100;
pub const USER_EMAIL_MAX_LEN: usize = 254;
pub const USER_BIO_MAX_LEN: usize = 500;

pub const GENDERS: &[&str] = &["MALE", "FEMALE", "NONBINARY"];
pub const RELATIONSHIP_STATUSES: &[&str] = &[
    "SINGLE",
    "IN_A_RELATIONSHIP",
    "ENGAGED",
    "MARRIED",
    "IT'S_COMPLICATED",
];

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub handle: UserHandle,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub gender: Option<String>,
    pub relationship_status: Option<String>,
    pub profile_photo: Option<MediaUrl>,
}

/// A user as seen by a viewer.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub follower_count: u64,
    pub following_count: u64,
    /// `None` for anonymous viewers.
    pub is_following: Option<bool>,
}

/// The slice of a user embedded into posts and comments.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostAuthor {
    pub id: Id<UserMarker>,
    pub name: String,
    pub profile_photo: Option<MediaUrl>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreateUser {
    pub handle: UserHandle,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserHandle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The user handle is invalid: {0}")]
pub struct InvalidUserHandleError(String);

impl UserHandle {
    pub fn new(handle: String) -> Result<Self, InvalidUserHandleError> {
        let valid = !handle.is_empty()
            && handle.chars().count() <= USER_HANDLE_MAX_LEN
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

        if valid {
            Ok(UserHandle(handle))
        } else {
            Err(InvalidUserHandleError(handle))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for UserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserHandle::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"UserHandle"))
    }
}

/// Profile fields a user may edit one at a time.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    Username,
    Name,
    Email,
    Bio,
    Website,
    Gender,
    RelationshipStatus,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum InvalidUserFieldValueError {
    #[error("{0} cannot be removed.")]
    Required(UserField),
    #[error("{0} is too long.")]
    TooLong(UserField),
    #[error("{0} cannot be empty.")]
    Empty(UserField),
    #[error("Username may only contain letters, digits, '_' and '.'.")]
    Handle(#[from] InvalidUserHandleError),
    #[error("Email address is invalid.")]
    Email,
    #[error("Website must be an http(s) url.")]
    Website,
    #[error("'{1}' is not a valid {0}.")]
    NotAnOption(UserField, String),
}

impl UserField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserField::Username => "username",
            UserField::Name => "name",
            UserField::Email => "email",
            UserField::Bio => "bio",
            UserField::Website => "website",
            UserField::Gender => "gender",
            UserField::RelationshipStatus => "relationship_status",
        }
    }

    /// Fields every account must keep a value for.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, UserField::Username | UserField::Name | UserField::Email)
    }

    /// Validates a new value and brings it into its stored form.
    ///
    /// Enumerated fields are stored in upper snake case, so `"in a relationship"`
    /// becomes `"IN_A_RELATIONSHIP"`.
    pub fn normalize(
        self,
        value: Option<String>,
    ) -> Result<Option<String>, InvalidUserFieldValueError> {
        let Some(value) = value else {
            return if self.is_required() {
                Err(InvalidUserFieldValueError::Required(self))
            } else {
                Ok(None)
            };
        };
        let value = value.trim().to_owned();
        if value.is_empty() {
            return Err(InvalidUserFieldValueError::Empty(self));
        }

        let too_long = |max: usize| value.chars().count() > max;
        match self {
            UserField::Username => Ok(Some(UserHandle::new(value)?.into_inner())),
            UserField::Name if too_long(USER_NAME_MAX_LEN) => {
                Err(InvalidUserFieldValueError::TooLong(self))
            }
            UserField::Bio if too_long(USER_BIO_MAX_LEN) => {
                Err(InvalidUserFieldValueError::TooLong(self))
            }
            UserField::Email => {
                let well_formed = !too_long(USER_EMAIL_MAX_LEN)
                    && value
                        .split_once('@')
                        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
                well_formed
                    .then_some(Some(value))
                    .ok_or(InvalidUserFieldValueError::Email)
            }
            UserField::Website => MediaUrl::new(value)
                .ok()
                .filter(|url| url.get().starts_with("http"))
                .map(|url| Some(url.into_inner()))
                .ok_or(InvalidUserFieldValueError::Website),
            UserField::Gender => Self::normalize_option(self, &value, GENDERS),
            UserField::RelationshipStatus => {
                Self::normalize_option(self, &value, RELATIONSHIP_STATUSES)
            }
            UserField::Name | UserField::Bio => Ok(Some(value)),
        }
    }

    fn normalize_option(
        self,
        value: &str,
        options: &[&str],
    ) -> Result<Option<String>, InvalidUserFieldValueError> {
        let normalized = value.to_uppercase().replace(' ', "_");
        if options.contains(&normalized.as_str()) {
            Ok(Some(normalized))
        } else {
            Err(InvalidUserFieldValueError::NotAnOption(
                self,
                value.to_owned(),
            ))
        }
    }
}

impl Display for UserField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sets or clears a single profile field.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UpdateUserField {
    pub field: UserField,
    pub value: Option<String>,
}

/// The stored value of a field after an update.
///
/// Travels as an object with the field name as its only key, e.g.
/// `{ "relationship_status": "SINGLE" }`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdatedUserField {
    pub field: UserField,
    pub value: Option<String>,
}

impl Serialize for UpdatedUserField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field.as_str(), &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for UpdatedUserField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = BTreeMap::<UserField, Option<String>>::deserialize(deserializer)?;
        let len = entries.len();
        match entries.into_iter().next() {
            Some((field, value)) if len == 1 => Ok(Self { field, value }),
            _ => Err(Error::invalid_length(len, &"an object with a single field")),
        }
    }
}
