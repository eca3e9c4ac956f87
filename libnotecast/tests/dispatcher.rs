//! End-to-end dispatcher tests against a real database and a mock X API

use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use libnotecast::config::{Config, DatabaseConfig, DispatchConfig, NostrConfig, XConfig};
use libnotecast::dispatch::{
    ERR_NO_CREDENTIALS, ERR_NO_NOSTR_CREDENTIALS, ERR_USER_MISSING, ERR_X_ONLY,
};
use libnotecast::{Database, Dispatcher, NewNote, NoteStatus};

async fn test_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.db");
    let db = Database::new(path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

fn test_config(x_base_url: &str) -> Config {
    Config {
        database: DatabaseConfig {
            path: "unused".to_string(),
        },
        dispatch: DispatchConfig {
            max_attempts: 3,
            backoff_base_secs: 0,
            poll_interval: 60,
        },
        x: XConfig {
            api_base_url: x_base_url.to_string(),
        },
        nostr: NostrConfig {
            default_relays: vec![],
            settle_ms: 0,
        },
    }
}

fn due_note(user_id: i64, content: &str, to_x: bool, to_nostr: bool) -> NewNote {
    NewNote {
        user_id,
        content: content.to_string(),
        // Well in the past, so the note is due on any run
        scheduled_time: Some(1_000_000),
        publish_to_x: to_x,
        publish_to_nostr: to_nostr,
    }
}

fn mock_tweet_created(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(serde_json::json!({
        "data": { "id": id }
    }))
}

#[tokio::test]
async fn no_due_notes_reports_nothing_pending() {
    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();

    // Scheduled far in the future, and one unscheduled
    db.create_note(&NewNote {
        user_id,
        content: "later".to_string(),
        scheduled_time: Some(4_000_000_000),
        publish_to_x: true,
        publish_to_nostr: false,
    })
    .await
    .unwrap();
    db.create_note(&NewNote {
        user_id,
        content: "draft".to_string(),
        scheduled_time: None,
        publish_to_x: true,
        publish_to_nostr: false,
    })
    .await
    .unwrap();

    let dispatcher = Dispatcher::new(db, &test_config("http://unused"));
    let summary = dispatcher.run_summary().await.unwrap();
    assert_eq!(summary, "There are no notes pending to be published.");
}

#[tokio::test]
async fn user_without_credentials_gets_all_notes_errored() {
    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();

    let first = db
        .create_note(&due_note(user_id, "one", true, true))
        .await
        .unwrap();
    let second = db
        .create_note(&due_note(user_id, "two", false, true))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db.clone(), &test_config("http://unused"));
    let published = dispatcher.run().await.unwrap();
    assert_eq!(published, 0);

    for id in [first.id, second.id] {
        let note = db.get_note(id).await.unwrap().unwrap();
        assert_eq!(note.status, NoteStatus::Error);
        assert_eq!(note.last_error, ERR_NO_CREDENTIALS);
    }

    // Errored notes are never selected again
    let summary = dispatcher.run_summary().await.unwrap();
    assert_eq!(summary, "There are no notes pending to be published.");
}

#[tokio::test]
async fn notes_of_a_missing_user_are_errored() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("notes.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    // Plant a note whose user row is gone, bypassing foreign key enforcement
    {
        use std::str::FromStr;
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            db_path.display()
        ))
        .unwrap()
        .foreign_keys(false);
        let pool = sqlx::sqlite::SqlitePool::connect_with(options).await.unwrap();
        sqlx::query(
            "INSERT INTO notes (user_id, content, status, scheduled_time, created_at, \
             publish_to_x, publish_to_nostr) VALUES (999, 'orphan', 'pending', 1000, 1000, 1, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let dispatcher = Dispatcher::new(db.clone(), &test_config("http://unused"));
    assert_eq!(dispatcher.run().await.unwrap(), 0);

    let note = db.get_note(1).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Error);
    assert_eq!(note.last_error, ERR_USER_MISSING);
}

#[tokio::test]
async fn x_only_note_publishes_and_is_not_republished() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(header("Authorization", "Bearer alice-token"))
        .respond_with(mock_tweet_created("tw-100"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();
    db.upsert_x_credentials(user_id, "alice-token").await.unwrap();

    let note = db
        .create_note(&due_note(user_id, "hello x", true, false))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db.clone(), &test_config(&mock_server.uri()));
    assert_eq!(dispatcher.run().await.unwrap(), 1);

    let fetched = db.get_note(note.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, NoteStatus::Published);
    assert_eq!(fetched.tweet_id, "tw-100");
    assert!(fetched.nostr_id.is_empty());
    assert!(fetched.published_at.is_some());
    assert!(fetched.last_error.is_empty());

    // A second run finds nothing due and makes no API calls (expect(1) above)
    assert_eq!(dispatcher.run().await.unwrap(), 0);
}

#[tokio::test]
async fn overlapping_runs_create_exactly_one_tweet() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(mock_tweet_created("tw-500"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();
    db.upsert_x_credentials(user_id, "alice-token").await.unwrap();

    let note = db
        .create_note(&due_note(user_id, "hello once", true, false))
        .await
        .unwrap();

    let config = test_config(&mock_server.uri());
    let first = Dispatcher::new(db.clone(), &config);
    let second = Dispatcher::new(db.clone(), &config);

    // Two dispatcher instances over the same database. The trailing run must
    // observe the recorded tweet_id and make no API call of its own; the
    // expect(1) above fails the test on any second creation.
    let (a, b) = tokio::join!(first.run(), async {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        second.run().await
    });

    assert_eq!(a.unwrap() + b.unwrap(), 1);

    let fetched = db.get_note(note.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, NoteStatus::Published);
    assert_eq!(fetched.tweet_id, "tw-500");
}

#[tokio::test]
async fn partial_publish_does_not_repost_to_x_on_rerun() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(mock_tweet_created("tw-200"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();
    db.upsert_x_credentials(user_id, "alice-token").await.unwrap();

    // Flagged for both platforms, but the user has no Nostr credentials
    let note = db
        .create_note(&due_note(user_id, "hello both", true, true))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db.clone(), &test_config(&mock_server.uri()));
    assert_eq!(dispatcher.run().await.unwrap(), 0);

    let fetched = db.get_note(note.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, NoteStatus::PublishedX);
    assert_eq!(fetched.tweet_id, "tw-200");
    assert_eq!(fetched.last_error, ERR_X_ONLY);

    // Still due (partially published); the rerun must not hit X again
    assert_eq!(dispatcher.run().await.unwrap(), 0);

    let fetched = db.get_note(note.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, NoteStatus::PublishedX);
    assert_eq!(fetched.tweet_id, "tw-200");
    assert_eq!(fetched.last_error, ERR_NO_NOSTR_CREDENTIALS);
}

#[tokio::test]
async fn transient_x_failures_are_retried_then_left_pending() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();
    db.upsert_x_credentials(user_id, "alice-token").await.unwrap();

    let note = db
        .create_note(&due_note(user_id, "flaky", true, false))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db.clone(), &test_config(&mock_server.uri()));
    assert_eq!(dispatcher.run().await.unwrap(), 0);

    let fetched = db.get_note(note.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, NoteStatus::Pending);
    assert!(fetched.tweet_id.is_empty());
    assert!(fetched.last_error.starts_with("Twitter error:"));
}

#[tokio::test]
async fn fatal_x_failure_makes_a_single_attempt() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();
    db.upsert_x_credentials(user_id, "stale-token").await.unwrap();

    let note = db
        .create_note(&due_note(user_id, "unauthorized", true, false))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db.clone(), &test_config(&mock_server.uri()));
    assert_eq!(dispatcher.run().await.unwrap(), 0);

    let fetched = db.get_note(note.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, NoteStatus::Pending);
    assert!(fetched.last_error.contains("token expired"));
}

#[tokio::test]
async fn one_users_failure_does_not_block_another() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(header("Authorization", "Bearer bob-token"))
        .respond_with(mock_tweet_created("tw-300"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;

    // Alice has no credentials at all; Bob is set up correctly
    let alice = db.create_user("alice").await.unwrap();
    let bob = db.create_user("bob").await.unwrap();
    db.upsert_x_credentials(bob, "bob-token").await.unwrap();

    let alice_note = db
        .create_note(&due_note(alice, "alice note", true, false))
        .await
        .unwrap();
    let bob_note = db
        .create_note(&due_note(bob, "bob note", true, false))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db.clone(), &test_config(&mock_server.uri()));
    assert_eq!(dispatcher.run().await.unwrap(), 1);

    let alice_fetched = db.get_note(alice_note.id).await.unwrap().unwrap();
    assert_eq!(alice_fetched.status, NoteStatus::Error);

    let bob_fetched = db.get_note(bob_note.id).await.unwrap().unwrap();
    assert_eq!(bob_fetched.status, NoteStatus::Published);
    assert_eq!(bob_fetched.tweet_id, "tw-300");
}

#[tokio::test]
async fn summary_counts_published_notes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(mock_tweet_created("tw-400"))
        .mount(&mock_server)
        .await;

    let (db, _dir) = test_db().await;
    let user_id = db.create_user("alice").await.unwrap();
    db.upsert_x_credentials(user_id, "alice-token").await.unwrap();

    db.create_note(&due_note(user_id, "first", true, false))
        .await
        .unwrap();
    db.create_note(&due_note(user_id, "second", true, false))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(db, &test_config(&mock_server.uri()));
    let summary = dispatcher.run_summary().await.unwrap();
    assert_eq!(summary, "Published 2 note(s)");
}
