//! Mock platform for testing the retry engine and dispatcher

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Attempt, PlatformPublisher};
use crate::types::Note;

/// Scripted platform: pops outcomes from a queue, falling back to a fixed
/// outcome once the script runs out.
pub struct MockPlatform {
    name: &'static str,
    label: &'static str,
    script: Mutex<VecDeque<Attempt>>,
    fallback: Attempt,
    attempts: AtomicUsize,
}

impl MockPlatform {
    pub fn new(name: &'static str, label: &'static str, fallback: Attempt) -> Self {
        Self {
            name,
            label,
            script: Mutex::new(VecDeque::new()),
            fallback,
            attempts: AtomicUsize::new(0),
        }
    }

    /// A platform whose every attempt succeeds with the given id
    pub fn succeeding(name: &'static str, label: &'static str, id: &str) -> Self {
        Self::new(name, label, Attempt::Success(id.to_string()))
    }

    /// A platform whose every attempt fails with a recoverable error
    pub fn failing_transient(name: &'static str, label: &'static str, reason: &str) -> Self {
        Self::new(name, label, Attempt::Recoverable(reason.to_string()))
    }

    /// A platform whose every attempt fails fatally
    pub fn failing_fatal(name: &'static str, label: &'static str, reason: &str) -> Self {
        Self::new(name, label, Attempt::Fatal(reason.to_string()))
    }

    /// A platform that plays back the given outcomes in order, then the fallback
    pub fn with_script(
        name: &'static str,
        label: &'static str,
        script: Vec<Attempt>,
        fallback: Attempt,
    ) -> Self {
        Self {
            name,
            label,
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicUsize::new(0),
        }
    }

    /// How many attempts have been made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformPublisher for MockPlatform {
    fn name(&self) -> &'static str {
        self.name
    }

    fn label(&self) -> &'static str {
        self.label
    }

    async fn attempt(&self, _note: &Note) -> Attempt {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoteStatus;

    fn sample_note() -> Note {
        Note {
            id: 1,
            user_id: 1,
            content: "test".to_string(),
            status: NoteStatus::Pending,
            scheduled_time: Some(100),
            created_at: 50,
            published_at: None,
            tweet_id: String::new(),
            nostr_id: String::new(),
            publish_to_x: true,
            publish_to_nostr: true,
            last_error: String::new(),
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let platform = MockPlatform::with_script(
            "mock",
            "Mock",
            vec![Attempt::Recoverable("net".to_string())],
            Attempt::Success("id-1".to_string()),
        );
        let note = sample_note();

        assert_eq!(
            platform.attempt(&note).await,
            Attempt::Recoverable("net".to_string())
        );
        assert_eq!(
            platform.attempt(&note).await,
            Attempt::Success("id-1".to_string())
        );
        assert_eq!(platform.attempts(), 2);
    }
}
