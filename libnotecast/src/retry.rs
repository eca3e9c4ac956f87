//! Retry engine for per-platform publish attempts

use std::time::Duration;
use tracing::{debug, warn};

use crate::db::Database;
use crate::platforms::{Attempt, PlatformPublisher};
use crate::types::Note;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after attempt number `retry_index` (0-based)
    ///
    /// With the default 2s base this yields 2s, then 4s.
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry_index)
    }
}

/// Run up to `policy.max_attempts` publish attempts for one note on one platform
///
/// Returns the platform id on success. Recoverable failures sleep with
/// exponential backoff between attempts; fatal failures abort immediately.
/// Every failure is recorded on the note's last_error before any sleep, so the
/// freshest error survives a crash mid-backoff.
pub async fn publish_with_retry(
    db: &Database,
    policy: &RetryPolicy,
    note: &Note,
    platform: &dyn PlatformPublisher,
) -> Option<String> {
    for attempt_index in 0..policy.max_attempts {
        debug!(
            note_id = note.id,
            platform = platform.name(),
            attempt = attempt_index + 1,
            "publish attempt"
        );

        match platform.attempt(note).await {
            Attempt::Success(platform_id) => {
                debug!(
                    note_id = note.id,
                    platform = platform.name(),
                    platform_id = %platform_id,
                    "publish succeeded"
                );
                return Some(platform_id);
            }
            Attempt::Recoverable(reason) => {
                warn!(
                    note_id = note.id,
                    platform = platform.name(),
                    attempt = attempt_index + 1,
                    reason = %reason,
                    "publish attempt failed"
                );
                record_failure(db, note.id, platform.label(), &reason).await;

                let is_last = attempt_index + 1 >= policy.max_attempts;
                if !is_last {
                    tokio::time::sleep(policy.backoff_delay(attempt_index)).await;
                }
            }
            Attempt::Fatal(reason) => {
                warn!(
                    note_id = note.id,
                    platform = platform.name(),
                    reason = %reason,
                    "publish failed permanently"
                );
                record_failure(db, note.id, platform.label(), &reason).await;
                return None;
            }
        }
    }

    None
}

async fn record_failure(db: &Database, note_id: i64, label: &str, reason: &str) {
    let message = format!("{} error: {}", label, reason);
    if let Err(e) = db.set_last_error(note_id, &message).await {
        warn!(note_id, error = %e, "failed to record publish error");
    }
}
