//! Nostr publishing via relay broadcast
//!
//! Event ids are deterministic: the event is signed with a fixed `created_at`
//! taken from the note (scheduled time, else creation time), so recomputing the
//! event on a retry yields the same id. The id is persisted before the first
//! broadcast so a crash mid-broadcast cannot publish an event we have no record
//! of.

use async_trait::async_trait;
use nostr_sdk::{Client, Event, EventBuilder, Keys, Timestamp};
use std::time::Duration;

use super::{Attempt, PlatformPublisher};
use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::types::{Note, NostrCredentials};

/// Relays every event is broadcast to, in addition to each user's own list
pub const DEFAULT_RELAYS: [&str; 4] = [
    "wss://nostr-pub.wellorder.net",
    "wss://relay.damus.io",
    "wss://relay.snort.social",
    "wss://relay.primal.net",
];

pub struct NostrPublisher {
    keys: Keys,
    relays: Vec<String>,
    db: Database,
    settle: Duration,
}

impl NostrPublisher {
    /// Build a publisher from stored credentials
    ///
    /// The relay set is the user's own relays followed by the configured
    /// defaults, deduplicated.
    pub fn from_credentials(
        db: Database,
        credentials: &NostrCredentials,
        default_relays: &[String],
        settle: Duration,
    ) -> Result<Self> {
        let keys = parse_keys(&credentials.private_key)?;

        let mut relays = credentials.relay_list();
        for url in default_relays {
            if !relays.contains(url) {
                relays.push(url.clone());
            }
        }

        Ok(Self {
            keys,
            relays,
            db,
            settle,
        })
    }

    /// Build a publisher with explicit keys and relays, without settle delays
    pub fn with_relays(db: Database, keys: Keys, relays: Vec<String>) -> Self {
        Self {
            keys,
            relays,
            db,
            settle: Duration::ZERO,
        }
    }

    /// Sign the note's text event with its fixed timestamp
    pub fn build_signed_event(&self, note: &Note) -> Result<Event> {
        let event = EventBuilder::text_note(&note.content, [])
            .custom_created_at(Timestamp::from(note.event_timestamp() as u64))
            .to_event(&self.keys)
            .map_err(|e| PlatformError::Posting(format!("failed to sign event: {}", e)))?;

        Ok(event)
    }

    async fn broadcast(&self, event: Event) -> Result<()> {
        if self.relays.is_empty() {
            return Err(PlatformError::Posting("no relays configured".to_string()).into());
        }

        let client = Client::new(self.keys.clone());

        for url in &self.relays {
            client
                .add_relay(url)
                .await
                .map_err(|e| PlatformError::Posting(format!("bad relay {}: {}", url, e)))?;
        }

        client.connect().await;
        tokio::time::sleep(self.settle).await;

        let send_result = client
            .send_event(event)
            .await
            .map_err(|e| PlatformError::Posting(format!("relay broadcast failed: {}", e)));

        tokio::time::sleep(self.settle).await;
        client.disconnect().await.ok();

        send_result?;
        Ok(())
    }
}

/// Parse a private key in hex or bech32 nsec form
pub fn parse_keys(private_key: &str) -> Result<Keys> {
    Keys::parse(private_key)
        .map_err(|e| PlatformError::Authentication(format!("invalid Nostr key: {}", e)).into())
}

#[async_trait]
impl PlatformPublisher for NostrPublisher {
    fn name(&self) -> &'static str {
        "nostr"
    }

    fn label(&self) -> &'static str {
        "Nostr"
    }

    async fn attempt(&self, note: &Note) -> Attempt {
        // Already on the platform, nothing to do
        if !note.nostr_id.is_empty() {
            return Attempt::Success(note.nostr_id.clone());
        }

        let event = match self.build_signed_event(note) {
            Ok(event) => event,
            Err(e) => return Attempt::Recoverable(e.to_string()),
        };
        let event_id = event.id.to_hex();

        // Persist the id before broadcasting. The id is deterministic, so if a
        // concurrent run won this write we are about to broadcast the same event.
        match self.db.set_nostr_id_if_empty(note.id, &event_id).await {
            Ok(_) => {}
            Err(e) => return Attempt::Recoverable(format!("failed to record event id: {}", e)),
        }

        if let Err(e) = self.broadcast(event).await {
            return Attempt::Recoverable(e.to_string());
        }

        Attempt::Success(event_id)
    }
}
