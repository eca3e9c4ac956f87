//! Platform abstraction for publishing notes

use async_trait::async_trait;

use crate::types::Note;

pub mod mock;
pub mod nostr;
pub mod x;

pub use mock::MockPlatform;
pub use nostr::NostrPublisher;
pub use x::XPublisher;

/// Outcome of a single publish attempt against one platform.
///
/// The retry engine treats every outcome uniformly: `Recoverable` failures are
/// retried with backoff, `Fatal` failures abort the note's attempts for this
/// platform in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The note is on the platform; carries the platform identifier.
    Success(String),
    /// Transient failure worth retrying (network, rate limit, relay outage).
    Recoverable(String),
    /// Permanent failure; retrying cannot help (bad credentials, rejected content).
    Fatal(String),
}

/// A platform that notes can be published to
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Short machine name used in logs
    fn name(&self) -> &'static str;

    /// Human-facing platform label used in stored error messages
    fn label(&self) -> &'static str;

    /// Make one publish attempt for the note
    async fn attempt(&self, note: &Note) -> Attempt;
}
