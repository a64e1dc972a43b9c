//! Data models
//!
//! Rust structs representing stored rows and the values derived from them.
//! Rows travel as JSON objects; IDs are opaque strings and timestamps use
//! chrono.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A single stored row as it travels to and from the store
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Serialize a model into a row
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, AppError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(AppError::Internal(anyhow::anyhow!(
            "model serialized to non-object value: {other}"
        ))),
    }
}

/// Deserialize a row into a model
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, AppError> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

/// Deserialize a batch of rows
pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, AppError> {
    rows.into_iter().map(from_row).collect()
}

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Used for rows created by the in-process store and for blob names.
/// Remote stores may hand out any opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Tables known to the feed core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Posts,
    StatusUpdates,
    PostLikes,
    StatusLikes,
    UserFollows,
    Notes,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Posts => "posts",
            Self::StatusUpdates => "status_updates",
            Self::PostLikes => "post_likes",
            Self::StatusLikes => "status_likes",
            Self::UserFollows => "user_follows",
            Self::Notes => "notes",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Mood
// =============================================================================

/// Colour used when a mood is not in the palette
pub const FALLBACK_COLOR: &str = "bg-gray-100";
/// Emoji used when a mood is not in the palette
pub const FALLBACK_EMOJI: &str = "✨";

/// name, colour, emoji
const MOOD_PALETTE: &[(&str, &str, &str)] = &[
    ("love", "bg-pink-100", "💖"),
    ("joy", "bg-yellow-100", "😊"),
    ("melancholy", "bg-blue-100", "😔"),
    ("wanderlust", "bg-green-100", "✨"),
    ("excitement", "bg-orange-100", "⚡"),
    ("heartbreak", "bg-purple-100", "💔"),
    ("lost", "bg-gray-100", "😶"),
    ("hopeful", "bg-yellow-100", "🌈"),
    ("nostalgic", "bg-orange-100", "🍂"),
    ("peaceful", "bg-green-100", "☁️"),
];

/// Mood tag
///
/// Stored as a plain string. Known moods carry a colour and emoji;
/// unknown ones are kept verbatim and fall back to neutral styling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mood(String);

impl Mood {
    /// Parse a mood tag
    ///
    /// Tags are trimmed and lowercased. Empty tags and the reserved
    /// filter value `all` are rejected.
    pub fn parse(tag: &str) -> Result<Self, AppError> {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(AppError::Validation("mood cannot be empty".to_string()));
        }
        if tag == "all" {
            return Err(AppError::Validation(
                "\"all\" is a filter, not a mood".to_string(),
            ));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn palette_entry(&self) -> Option<&'static (&'static str, &'static str, &'static str)> {
        MOOD_PALETTE.iter().find(|(name, _, _)| *name == self.0)
    }

    pub fn is_known(&self) -> bool {
        self.palette_entry().is_some()
    }

    /// Display colour for this mood
    pub fn color(&self) -> &'static str {
        self.palette_entry()
            .map(|(_, color, _)| *color)
            .unwrap_or(FALLBACK_COLOR)
    }

    /// Default emoji for this mood
    pub fn emoji(&self) -> &'static str {
        self.palette_entry()
            .map(|(_, _, emoji)| *emoji)
            .unwrap_or(FALLBACK_EMOJI)
    }

    /// All moods with a known palette entry
    pub fn known() -> impl Iterator<Item = Mood> {
        MOOD_PALETTE.iter().map(|(name, _, _)| Mood(name.to_string()))
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feed filter: every mood, or exactly one
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MoodFilter {
    #[default]
    All,
    Only(Mood),
}

impl MoodFilter {
    /// Parse "all" or a mood tag
    pub fn parse(value: &str) -> Result<Self, AppError> {
        if value.trim().eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Mood::parse(value).map(Self::Only)
        }
    }

    pub fn matches(&self, mood: &Mood) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == mood,
        }
    }
}

// =============================================================================
// Media
// =============================================================================

/// Kind of attached media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// Classify a MIME type, `None` if it is not an accepted kind
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let top_level = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match top_level.as_str() {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// True if this media produces sound
    pub fn is_playable(&self) -> bool {
        matches!(self, Self::Audio | Self::Video)
    }
}

/// Uploaded media reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

// =============================================================================
// Profile
// =============================================================================

/// Public identity record of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Display name
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

// =============================================================================
// Post
// =============================================================================

/// A mood-tagged reflection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub mood: Mood,
    /// Colour frozen from the mood at creation time
    pub color: String,
    pub is_anonymous: bool,
    pub location: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaKind>,
    /// Owner; retained even for anonymous posts
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Cached like count
    #[serde(default)]
    pub like_count: i64,
}

impl Post {
    /// Attached media, if both URL and kind are present
    pub fn media(&self) -> Option<MediaRef> {
        match (&self.media_url, self.media_type) {
            (Some(url), Some(kind)) if !url.is_empty() => Some(MediaRef {
                url: url.clone(),
                kind,
            }),
            _ => None,
        }
    }
}

/// Row inserted by the post-creation action
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub content: String,
    pub mood: Mood,
    pub color: String,
    pub is_anonymous: bool,
    pub location: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaKind>,
    pub user_id: String,
}

// =============================================================================
// Status (ephemeral)
// =============================================================================

/// Lifecycle phase of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPhase {
    /// now < expires_at
    Active,
    /// now >= expires_at, no longer listed
    Expired,
}

/// Short-lived mood status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub content: Option<String>,
    pub mood: Mood,
    pub color: String,
    pub emoji: Option<String>,
    pub audio_url: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: i64,
}

impl Status {
    /// Phase at the given instant
    ///
    /// Deleted statuses are simply absent from storage.
    pub fn phase_at(&self, now: DateTime<Utc>) -> StatusPhase {
        if now < self.expires_at {
            StatusPhase::Active
        } else {
            StatusPhase::Expired
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.phase_at(now) == StatusPhase::Active
    }
}

/// Row inserted by the status-creation action
#[derive(Debug, Clone, Serialize)]
pub struct NewStatus {
    pub content: Option<String>,
    pub mood: Mood,
    pub color: String,
    pub emoji: Option<String>,
    pub audio_url: Option<String>,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Engagement relations
// =============================================================================

/// Kind of likeable subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Post,
    Status,
}

impl SubjectKind {
    /// Table holding the subject rows
    pub fn table(&self) -> Table {
        match self {
            Self::Post => Table::Posts,
            Self::Status => Table::StatusUpdates,
        }
    }

    /// Table holding the like relation
    pub fn like_table(&self) -> Table {
        match self {
            Self::Post => Table::PostLikes,
            Self::Status => Table::StatusLikes,
        }
    }

    /// Foreign key column in the like relation
    pub fn like_column(&self) -> &'static str {
        match self {
            Self::Post => "post_id",
            Self::Status => "status_id",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Status => "status",
        }
    }
}

/// A post or status that can be liked
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: String,
}

impl SubjectRef {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Post,
            id: id.into(),
        }
    }

    pub fn status(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Status,
            id: id.into(),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Follow relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: String,
    pub following_id: String,
}

/// Follower / following totals for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FollowStats {
    pub followers: u64,
    pub following: u64,
}

// =============================================================================
// Notes
// =============================================================================

/// Private note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub mood: Option<Mood>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row inserted when creating a note
#[derive(Debug, Clone, Serialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub mood: Option<Mood>,
    pub user_id: String,
}

/// Patch applied when editing a note
#[derive(Debug, Clone, Serialize)]
pub struct NotePatch {
    pub title: String,
    pub content: String,
    pub mood: Option<Mood>,
    pub updated_at: DateTime<Utc>,
}
