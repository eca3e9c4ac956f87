//! Core types for Notecast

use serde::{Deserialize, Serialize};

/// Maximum note length, enforced at creation time only.
pub const MAX_NOTE_LENGTH: usize = 280;

/// A user-authored text post awaiting or having undergone multi-platform publication.
///
/// The per-platform identifier fields (`tweet_id`, `nostr_id`) are the idempotency
/// markers: a non-empty value means "already published on that platform" and is never
/// cleared by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub status: NoteStatus,
    /// Unix seconds; `None` means not yet scheduled (never selected as due).
    pub scheduled_time: Option<i64>,
    pub created_at: i64,
    pub published_at: Option<i64>,
    pub tweet_id: String,
    pub nostr_id: String,
    pub publish_to_x: bool,
    pub publish_to_nostr: bool,
    pub last_error: String,
}

impl Note {
    /// The centralized platform still needs a publish attempt.
    pub fn needs_x(&self) -> bool {
        self.publish_to_x && self.tweet_id.is_empty()
    }

    /// The decentralized platform still needs a publish attempt.
    pub fn needs_nostr(&self) -> bool {
        self.publish_to_nostr && self.nostr_id.is_empty()
    }

    /// Timestamp used for the Nostr event, fixed per note so that recomputing the
    /// event on a later retry yields the same content-derived event id.
    pub fn event_timestamp(&self) -> i64 {
        self.scheduled_time.unwrap_or(self.created_at)
    }
}

/// Fields supplied when a note is created (by CRUD or bulk import collaborators).
#[derive(Debug, Clone)]
pub struct NewNote {
    pub user_id: i64,
    pub content: String,
    pub scheduled_time: Option<i64>,
    pub publish_to_x: bool,
    pub publish_to_nostr: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NoteStatus {
    Pending,
    PublishedX,
    PublishedN,
    Published,
    Error,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Pending => "pending",
            NoteStatus::PublishedX => "published_x",
            NoteStatus::PublishedN => "published_n",
            NoteStatus::Published => "published",
            NoteStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "published_x" => NoteStatus::PublishedX,
            "published_n" => NoteStatus::PublishedN,
            "published" => NoteStatus::Published,
            "error" => NoteStatus::Error,
            _ => NoteStatus::Pending,
        }
    }
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

/// OAuth2 user-context bearer token for the X API.
#[derive(Debug, Clone)]
pub struct XCredentials {
    pub user_id: i64,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct NostrCredentials {
    pub user_id: i64,
    /// Hex or bech32 nsec private key.
    pub private_key: String,
    pub public_key: String,
    /// One relay URL per line.
    pub relay_urls: String,
}

impl NostrCredentials {
    /// Convert the stored relay_urls text to a list of URLs
    pub fn relay_list(&self) -> Vec<String> {
        self.relay_urls
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}
