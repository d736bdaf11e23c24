use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

pub const MEDIA_URL_MAX_LEN: usize = 2048;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualMediaType {
    #[default]
    Photo,
    Video,
}

impl VisualMediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VisualMediaType::Photo => "PHOTO",
            VisualMediaType::Video => "VIDEO",
        }
    }
}

impl Display for VisualMediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualMediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PHOTO" => Ok(VisualMediaType::Photo),
            "VIDEO" => Ok(VisualMediaType::Video),
            other => Err(other.to_owned()),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct MediaUrl(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The media url is invalid: {0}")]
pub struct InvalidMediaUrlError(String);

impl MediaUrl {
    /// Accepts absolute `http(s)` urls and server-relative paths like `/uploads/a.png`.
    pub fn new(url: String) -> Result<Self, InvalidMediaUrlError> {
        let well_formed = url.len() <= MEDIA_URL_MAX_LEN
            && !url.chars().any(char::is_whitespace)
            && (url.starts_with("https://")
                || url.starts_with("http://")
                || (url.starts_with('/') && url.len() > 1));

        if well_formed {
            Ok(MediaUrl(url))
        } else {
            Err(InvalidMediaUrlError(url))
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

impl<'de> Deserialize<'de> for MediaUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        MediaUrl::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"MediaUrl"))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct VisualMedia {
    #[serde(rename = "type")]
    pub kind: VisualMediaType,
    pub url: MediaUrl,
}

#[cfg(test)]
mod tests {
    use crate::model::media::{MediaUrl, VisualMedia, VisualMediaType};

    #[test]
    fn media_urls() {
        assert!(MediaUrl::new("/uploads/profilePhoto.png".to_owned()).is_ok());
        assert!(MediaUrl::new("https://cdn.example.com/a.jpeg".to_owned()).is_ok());
        assert!(MediaUrl::new("/".to_owned()).is_err());
        assert!(MediaUrl::new("ftp://example.com/a".to_owned()).is_err());
        assert!(MediaUrl::new("/uploads/a b.png".to_owned()).is_err());
    }

    #[test]
    fn visual_media_json_shape() {
        let media: VisualMedia =
            serde_json::from_str(r#"{"type":"VIDEO","url":"/uploads/clip.mp4"}"#).unwrap();
        assert_eq!(media.kind, VisualMediaType::Video);
        assert_eq!(media.url.get(), "/uploads/clip.mp4");

        assert!(serde_json::from_str::<VisualMedia>(r#"{"type":"PHOTO","url":"nope"}"#).is_err());
    }
}
