//! Dispatcher: finds due notes and drives them through their platforms

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::platforms::{NostrPublisher, PlatformPublisher, XPublisher};
use crate::retry::RetryPolicy;
use crate::types::Note;

mod publish;

pub use publish::publish_user_notes;
pub use publish::{
    ERR_NOSTR_ONLY, ERR_NO_NOSTR_CREDENTIALS, ERR_NO_X_CREDENTIALS, ERR_X_ONLY,
};

pub const ERR_USER_MISSING: &str = "User does not exist";
pub const ERR_NO_CREDENTIALS: &str = "User does not have any platform credentials configured";

pub struct Dispatcher {
    db: Database,
    policy: RetryPolicy,
    x_base_url: String,
    nostr_default_relays: Vec<String>,
    nostr_settle: Duration,
}

impl Dispatcher {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            policy: RetryPolicy {
                max_attempts: config.dispatch.max_attempts,
                backoff_base: Duration::from_secs(config.dispatch.backoff_base_secs),
            },
            x_base_url: config.x.api_base_url.clone(),
            nostr_default_relays: config.nostr.default_relays.clone(),
            nostr_settle: Duration::from_millis(config.nostr.settle_ms),
        }
    }

    /// One dispatcher tick: publish everything currently due
    ///
    /// Notes are grouped by user so one user's bad credentials or crashed pass
    /// cannot block another user's notes. Returns how many notes finished every
    /// platform they still needed.
    pub async fn run(&self) -> crate::error::Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let due = self.db.select_due_notes(now).await?;

        if due.is_empty() {
            debug!("no notes due");
            return Ok(0);
        }

        info!(count = due.len(), "found due notes");

        let mut by_user: BTreeMap<i64, Vec<Note>> = BTreeMap::new();
        for note in due {
            by_user.entry(note.user_id).or_default().push(note);
        }

        let mut published = 0;
        for (user_id, notes) in by_user {
            match self.process_user(user_id, &notes).await {
                Ok(count) => published += count,
                Err(e) => {
                    error!(user_id, error = %e, "failed to process user's notes");
                }
            }
        }

        Ok(published)
    }

    /// One dispatcher tick, summarized for interactive use
    pub async fn run_summary(&self) -> crate::error::Result<String> {
        let now = chrono::Utc::now().timestamp();
        if self.db.select_due_notes(now).await?.is_empty() {
            return Ok("There are no notes pending to be published.".to_string());
        }

        let published = self.run().await?;
        Ok(format!("Published {} note(s)", published))
    }

    async fn process_user(&self, user_id: i64, notes: &[Note]) -> crate::error::Result<usize> {
        if self.db.get_user(user_id).await?.is_none() {
            warn!(user_id, "due notes reference a missing user");
            self.mark_all(notes, ERR_USER_MISSING).await?;
            return Ok(0);
        }

        let x = self.build_x_publisher(user_id).await?;
        let nostr = self.build_nostr_publisher(user_id).await?;

        if x.is_none() && nostr.is_none() {
            warn!(user_id, "user has no platform credentials");
            self.mark_all(notes, ERR_NO_CREDENTIALS).await?;
            return Ok(0);
        }

        publish_user_notes(
            &self.db,
            &self.policy,
            notes,
            x.as_ref().map(|p| p as &dyn PlatformPublisher),
            nostr.as_ref().map(|p| p as &dyn PlatformPublisher),
        )
        .await
    }

    async fn build_x_publisher(&self, user_id: i64) -> crate::error::Result<Option<XPublisher>> {
        let credentials = match self.db.get_x_credentials(user_id).await? {
            Some(credentials) => credentials,
            None => return Ok(None),
        };

        if credentials.access_token.is_empty() {
            warn!(user_id, "X credentials are incomplete, skipping platform");
            return Ok(None);
        }

        Ok(Some(XPublisher::from_credentials(
            &credentials,
            &self.x_base_url,
        )))
    }

    async fn build_nostr_publisher(
        &self,
        user_id: i64,
    ) -> crate::error::Result<Option<NostrPublisher>> {
        let credentials = match self.db.get_nostr_credentials(user_id).await? {
            Some(credentials) => credentials,
            None => return Ok(None),
        };

        if credentials.private_key.is_empty() {
            warn!(user_id, "Nostr credentials are incomplete, skipping platform");
            return Ok(None);
        }

        match NostrPublisher::from_credentials(
            self.db.clone(),
            &credentials,
            &self.nostr_default_relays,
            self.nostr_settle,
        ) {
            Ok(publisher) => Ok(Some(publisher)),
            Err(e) => {
                warn!(user_id, error = %e, "Nostr key rejected, skipping platform");
                Ok(None)
            }
        }
    }

    async fn mark_all(&self, notes: &[Note], message: &str) -> crate::error::Result<()> {
        for note in notes {
            self.db.mark_error(note.id, message).await?;
        }
        Ok(())
    }
}
