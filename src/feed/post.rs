// SPDX-License-Identifier: MPL-2.0

use crate::format::{format_count, format_relative};
use crate::remote::{Document, PageCursor, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire field names the feed queries depend on
pub const FIELD_CREATOR_ID: &str = "creatorId";
pub const FIELD_CREATOR_LAST_NINE: &str = "creatorPhoneLastNine";
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Content of a post, tagged by `postType` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "postType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PostBody {
    Text {
        text: String,
    },
    Media {
        #[serde(default)]
        caption: Option<String>,
        media_urls: Vec<String>,
    },
    Audio {
        audio_url: String,
        #[serde(default)]
        duration_secs: u32,
    },
}

impl PostBody {
    pub fn post_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Media { .. } => "media",
            Self::Audio { .. } => "audio",
        }
    }
}

/// A post document as stored in the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub creator_id: String,
    /// Denormalized at write time; the feed query matches on it directly
    pub creator_phone_last_nine: String,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub star_count: u32,
    #[serde(default)]
    pub starred_by: Vec<String>,
    #[serde(flatten)]
    pub body: PostBody,
}

/// A post as shown to one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub creator_id: String,
    pub creator_phone_last_nine: String,
    pub created_at: Timestamp,
    pub like_count: u32,
    pub liked: bool,
    pub star_count: u32,
    pub starred: bool,
    pub body: PostBody,
}

impl Post {
    pub fn from_record(id: impl Into<String>, record: PostRecord, viewer_id: &str) -> Self {
        let liked = record.liked_by.iter().any(|u| u == viewer_id);
        let starred = record.starred_by.iter().any(|u| u == viewer_id);
        Self {
            id: id.into(),
            creator_id: record.creator_id,
            creator_phone_last_nine: record.creator_phone_last_nine,
            created_at: record.created_at,
            like_count: record.like_count,
            liked,
            star_count: record.star_count,
            starred,
            body: record.body,
        }
    }

    pub fn from_document(doc: &Document, viewer_id: &str) -> Result<Self, serde_json::Error> {
        let record: PostRecord = doc.decode()?;
        Ok(Self::from_record(doc.id.clone(), record, viewer_id))
    }

    /// Cursor resuming a `createdAt`-ordered query after this post
    pub fn cursor(&self) -> PageCursor {
        PageCursor::new(self.id.clone(), Value::from(self.created_at.as_millis()))
    }

    pub fn relative_time(&self, now: DateTime<Utc>) -> String {
        self.created_at
            .to_datetime()
            .map(|at| format_relative(at, now))
            .unwrap_or_default()
    }

    pub fn like_label(&self) -> String {
        format_count(self.like_count)
    }

    pub fn star_label(&self) -> String {
        format_count(self.star_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => Document::new("p1", map),
            _ => Document::new("p1", Default::default()),
        }
    }

    #[test]
    fn decodes_tagged_bodies() {
        let media = doc(json!({
            "creatorId": "u2",
            "creatorPhoneLastNine": "771234567",
            "createdAt": 100,
            "postType": "media",
            "mediaUrls": ["https://cdn.example/a.jpg"],
        }));
        let post = Post::from_document(&media, "u1").unwrap();
        assert_eq!(post.body.post_type(), "media");
        assert_eq!(
            post.body,
            PostBody::Media {
                caption: None,
                media_urls: vec!["https://cdn.example/a.jpg".to_string()],
            }
        );

        let audio = doc(json!({
            "creatorId": "u2",
            "creatorPhoneLastNine": "771234567",
            "createdAt": 100,
            "postType": "audio",
            "audioUrl": "https://cdn.example/a.m4a",
            "durationSecs": 12,
        }));
        let post = Post::from_document(&audio, "u1").unwrap();
        assert!(matches!(post.body, PostBody::Audio { duration_secs: 12, .. }));
    }

    #[test]
    fn viewer_reaction_flags_come_from_member_lists() {
        let raw = doc(json!({
            "creatorId": "u2",
            "creatorPhoneLastNine": "771234567",
            "createdAt": 100,
            "likeCount": 2,
            "likedBy": ["u1", "u3"],
            "starCount": 1,
            "starredBy": ["u3"],
            "postType": "text",
            "text": "hello",
        }));

        let post = Post::from_document(&raw, "u1").unwrap();
        assert!(post.liked);
        assert!(!post.starred);
        assert_eq!(post.like_count, 2);
        assert_eq!(post.like_label(), "2");
    }

    #[test]
    fn unknown_post_type_is_an_error() {
        let raw = doc(json!({
            "creatorId": "u2",
            "creatorPhoneLastNine": "771234567",
            "createdAt": 100,
            "postType": "poll",
        }));
        assert!(Post::from_document(&raw, "u1").is_err());
    }

    #[test]
    fn cursor_points_at_creation_time() {
        let raw = doc(json!({
            "creatorId": "u2",
            "creatorPhoneLastNine": "771234567",
            "createdAt": 1234,
            "postType": "text",
            "text": "x",
        }));
        let cursor = Post::from_document(&raw, "u1").unwrap().cursor();
        assert_eq!(cursor.doc_id(), "p1");
        assert_eq!(cursor.order_value(), &json!(1234));
    }
}
