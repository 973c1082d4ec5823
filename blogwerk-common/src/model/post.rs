use crate::model::{
    Id, Text,
    group::{Group, GroupMarker},
    user::User,
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use std::fmt::Display;
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_PREVIEW_LEN: usize = 15;
pub const IMAGE_REF_MAX_LEN: usize = 255;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: Text,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: User,
    pub group: Option<Group>,
    pub image: Option<ImageRef>,
}

impl Post {
    /// The first few characters of the text, used wherever a post needs a short label.
    #[must_use]
    pub fn preview(&self) -> String {
        self.text.get().chars().take(POST_PREVIEW_LEN).collect()
    }

    /// Most recent first, newer ids first among equal timestamps.
    #[must_use]
    pub fn recency_order(&self, other: &Self) -> std::cmp::Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.preview())
    }
}

/// The author-editable part of a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct PostContent {
    pub text: Text,
    #[serde(default)]
    pub group: Option<Id<GroupMarker>>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

/// Location of an image in the external media storage, e.g. `posts/small.gif`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageRef(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The image reference is invalid: {0}")]
pub struct InvalidImageRefError(String);

impl ImageRef {
    pub fn new(path: String) -> Result<Self, InvalidImageRefError> {
        let valid = !path.is_empty()
            && path.chars().count() <= IMAGE_REF_MAX_LEN
            && !path.starts_with('/')
            && !path.split('/').any(|segment| segment.is_empty() || segment == "..");

        if valid {
            Ok(Self(path))
        } else {
            Err(InvalidImageRefError(path))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        ImageRef::new(inner)
            .map_err(|err| D::Error::invalid_value(Unexpected::Str(&err.0), &"ImageRef"))
    }
}
