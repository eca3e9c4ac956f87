//! Per-user publish pass: runs each due note through its requested platforms
//! and settles the note's final status.

use tracing::{debug, info};

use crate::db::Database;
use crate::platforms::PlatformPublisher;
use crate::retry::{publish_with_retry, RetryPolicy};
use crate::types::{Note, NoteStatus};

pub const ERR_NO_X_CREDENTIALS: &str = "User does not have Twitter API credentials configured";
pub const ERR_NO_NOSTR_CREDENTIALS: &str = "User does not have Nostr credentials configured";
pub const ERR_X_ONLY: &str = "Published to X/Twitter but failed to publish to Nostr";
pub const ERR_NOSTR_ONLY: &str = "Published to Nostr but failed to publish to X/Twitter";

/// The status transition to apply once a publish pass settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusChange {
    pub status: NoteStatus,
    pub last_error: String,
    pub set_published_at: bool,
}

/// Decide the note's final status from what this pass needed and achieved
///
/// Returns `None` when nothing was accomplished, leaving the note untouched for
/// the next dispatcher run (last_error already records the failures).
pub(crate) fn resolve_status(
    needs_x: bool,
    needs_nostr: bool,
    x_ok: bool,
    nostr_ok: bool,
) -> Option<StatusChange> {
    if needs_x && needs_nostr {
        return match (x_ok, nostr_ok) {
            (true, true) => Some(StatusChange {
                status: NoteStatus::Published,
                last_error: String::new(),
                set_published_at: true,
            }),
            (true, false) => Some(StatusChange {
                status: NoteStatus::PublishedX,
                last_error: ERR_X_ONLY.to_string(),
                set_published_at: false,
            }),
            (false, true) => Some(StatusChange {
                status: NoteStatus::PublishedN,
                last_error: ERR_NOSTR_ONLY.to_string(),
                set_published_at: false,
            }),
            (false, false) => None,
        };
    }

    if (needs_x && x_ok) || (needs_nostr && nostr_ok) {
        return Some(StatusChange {
            status: NoteStatus::Published,
            last_error: String::new(),
            set_published_at: true,
        });
    }

    None
}

/// Publish every note in the batch for one user
///
/// `x` and `nostr` are `None` when the user has no credentials for that
/// platform. Returns the number of notes that completed every platform they
/// still needed.
pub async fn publish_user_notes(
    db: &Database,
    policy: &RetryPolicy,
    notes: &[Note],
    x: Option<&dyn PlatformPublisher>,
    nostr: Option<&dyn PlatformPublisher>,
) -> crate::error::Result<usize> {
    let mut published = 0;

    for note in notes {
        if publish_note(db, policy, note.id, x, nostr).await? {
            published += 1;
        }
    }

    Ok(published)
}

async fn publish_note(
    db: &Database,
    policy: &RetryPolicy,
    note_id: i64,
    x: Option<&dyn PlatformPublisher>,
    nostr: Option<&dyn PlatformPublisher>,
) -> crate::error::Result<bool> {
    // Refetch: the batch snapshot may be stale by the time we get here
    let note = match db.get_note(note_id).await? {
        Some(note) => note,
        None => return Ok(false),
    };

    let needs_x = note.needs_x();
    let needs_nostr = note.needs_nostr();

    if !needs_x && !needs_nostr {
        debug!(note_id, "note already published everywhere it was asked to be");
        return Ok(true);
    }

    let mut x_ok = false;
    if needs_x {
        match x {
            Some(platform) => {
                if let Some(tweet_id) = publish_with_retry(db, policy, &note, platform).await {
                    db.set_tweet_id_if_empty(note.id, &tweet_id).await?;
                    x_ok = true;
                    info!(note_id, tweet_id = %tweet_id, "published to X");
                }
            }
            None => {
                db.set_last_error(note.id, ERR_NO_X_CREDENTIALS).await?;
            }
        }
    }

    // Refetch again: the X round took time, and the Nostr adapter itself may
    // have recorded an id on an earlier run.
    let fresh = match db.get_note(note_id).await? {
        Some(note) => note,
        None => return Ok(false),
    };

    let mut nostr_ok = false;
    if needs_nostr {
        if !fresh.nostr_id.is_empty() {
            // A concurrent run recorded the event id; the marker is the truth.
            nostr_ok = true;
        } else {
            match nostr {
                Some(platform) => {
                    if let Some(event_id) =
                        publish_with_retry(db, policy, &fresh, platform).await
                    {
                        db.set_nostr_id_if_empty(note.id, &event_id).await?;
                        nostr_ok = true;
                        info!(note_id, event_id = %event_id, "published to Nostr");
                    }
                }
                None => {
                    db.set_last_error(note.id, ERR_NO_NOSTR_CREDENTIALS).await?;
                }
            }
        }
    }

    if let Some(change) = resolve_status(needs_x, needs_nostr, x_ok, nostr_ok) {
        let published_at = change
            .set_published_at
            .then(|| chrono::Utc::now().timestamp());
        db.apply_status(note.id, change.status, &change.last_error, published_at)
            .await?;
    }

    Ok((!needs_x || x_ok) && (!needs_nostr || nostr_ok))
}
