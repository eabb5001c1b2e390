use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UploaderError;

pub const DEFAULT_UID_ROOT: &str = "1.2.826.0.1.3680043";

const UID_MAX_LENGTH: usize = 64;

static UID_ROOT_REGEX: OnceLock<Regex> = OnceLock::new();

/// One `<image>` element of the metadata XML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub src: String,
    pub description: String,
    pub original_url: String,
    pub magnification: String,
    pub uid: String,
    pub author: Option<String>,
}

/// Organisational prefix prepended to every image uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UidRoot(String);

impl UidRoot {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the SOPInstanceUID for an image uid such as `"007"`.
    pub fn sop_instance_uid(&self, image_uid: &str) -> Result<SopInstanceUid, UploaderError> {
        let trimmed = image_uid.trim();
        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() || !stripped.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(UploaderError::InvalidImageUid(image_uid.to_string()));
        }
        let uid = format!("{}.{}", self.0, stripped);
        if uid.len() > UID_MAX_LENGTH {
            return Err(UploaderError::InvalidImageUid(image_uid.to_string()));
        }
        Ok(SopInstanceUid(uid))
    }
}

impl Default for UidRoot {
    fn default() -> Self {
        Self(DEFAULT_UID_ROOT.to_string())
    }
}

impl fmt::Display for UidRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UidRoot {
    type Err = UploaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let regex = UID_ROOT_REGEX.get_or_init(|| {
            Regex::new(r"^[1-9][0-9]*(\.(0|[1-9][0-9]*))*$").expect("static regex")
        });
        let normalized = value.trim().trim_end_matches('.');
        if !regex.is_match(normalized) || normalized.len() > 32 {
            return Err(UploaderError::InvalidUidRoot(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for UidRoot {
    type Error = UploaderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UidRoot> for String {
    fn from(value: UidRoot) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SopInstanceUid(String);

impl SopInstanceUid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SopInstanceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random UID under the UUID-derived `2.25` arc.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}
