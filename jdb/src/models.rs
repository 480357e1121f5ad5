//! Record shapes persisted by the site
//!
//! Tracked CV downloads and user accounts. Both are plain serde structs; the
//! store adds `id`, `createdAt` and `updatedAt` around them.

use serde::{Deserialize, Serialize};

use crate::record::{format_timestamp, now};

pub const USERS_COLLECTION: &str = "users";
pub const CV_DOWNLOADS_COLLECTION: &str = "cv-download-tracking";

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl User {
    /// New user, active unless told otherwise
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            age: None,
            active: Some(true),
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

/// Partial update for a [`User`]; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// One tracked download of the CV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvDownload {
    pub ip: String,
    pub user_agent: String,
    pub country: Option<String>,
    /// ISO-8601 time of the download
    pub datetime: String,
}

impl CvDownload {
    /// Download happening now
    pub fn now(ip: impl Into<String>, user_agent: impl Into<String>, country: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
            country,
            datetime: format_timestamp(&now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_timestamp;
    use serde_json::json;

    #[test]
    fn test_user_serializes_optional_fields_only_when_set() {
        let user = User::new("Ann", "a@x.com");
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            json!({"name": "Ann", "email": "a@x.com", "active": true})
        );
        let user = user.with_age(30).with_active(false);
        assert_eq!(serde_json::to_value(&user).unwrap()["age"], json!(30));
    }

    #[test]
    fn test_user_patch_skips_unset_fields() {
        let patch = UserPatch {
            age: Some(31),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"age": 31}));
    }

    #[test]
    fn test_cv_download_uses_camel_case() {
        let download = CvDownload::now("1.2.3.4", "curl/8", None);
        let value = serde_json::to_value(&download).unwrap();
        assert_eq!(value["userAgent"], json!("curl/8"));
        assert_eq!(value["country"], json!(null));
        assert!(parse_timestamp(value["datetime"].as_str().unwrap()).is_some());
    }
}
