//! Notecast - scheduled note publishing to X and Nostr
//!
//! This library provides the dispatcher that finds due notes in the local
//! database and publishes them to each platform the author asked for, with
//! retries, failure isolation between users, and idempotent re-runs.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatch::Dispatcher;
pub use error::{NotecastError, Result};
pub use retry::RetryPolicy;
pub use types::{NewNote, Note, NoteStatus, User};
