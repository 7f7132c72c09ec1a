//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

use std::sync::Arc;
use std::time::Duration;

use fred::clients::Client;
use fred::interfaces::{ClientLike, KeysInterface, ListInterface, LuaInterface, SetsInterface,
    SortedSetsInterface};
use fred::types::config::Config as RedisConfig;
use quillstream_common::IdGenerator;
use quillstream_core::{FanoutMessage, OptionState, VoteState};
use quillstream_realtime::{FanoutBridge, FanoutRouter, scripts};

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

async fn connect() -> Client {
    let config = RedisConfig::from_url(&get_redis_url()).expect("Failed to parse REDIS_URL");
    let client = Client::new(config, None, None, None);
    client.init().await.expect("Failed to connect to Redis");
    client
}

fn test_key(kind: &str) -> String {
    format!("test:{kind}:{}", IdGenerator::new().generate_token())
}

fn vote_state(multivote: bool) -> VoteState {
    VoteState {
        vote_id: 1,
        channel_id: 7,
        question: "Where next?".to_string(),
        multivote,
        writein_allowed: true,
        votes_hidden: false,
        close_time: None,
        options: vec![
            OptionState {
                option_id: 11,
                text: "The forest".to_string(),
                killed: false,
                killed_text: None,
                voters: vec!["user:2".to_string(), "user:3".to_string()],
            },
            OptionState {
                option_id: 12,
                text: "The city".to_string(),
                killed: false,
                killed_text: None,
                voters: vec![],
            },
            OptionState {
                option_id: 13,
                text: "The grave".to_string(),
                killed: true,
                killed_text: Some("too grim".to_string()),
                voters: vec![],
            },
        ],
    }
}

async fn seed_vote(client: &Client, key: &str, state: &VoteState) {
    let blob = serde_json::to_string(state).expect("serialize");
    let _: () = client
        .set(key, blob, None, None, false)
        .await
        .expect("seed vote blob");
}

async fn load_vote(client: &Client, key: &str) -> VoteState {
    let raw: String = client.get(key).await.expect("load vote blob");
    serde_json::from_str(&raw).expect("blob must stay parseable after script rewrites")
}

async fn cast(client: &Client, key: &str, option_id: i64, voter: &str) -> Vec<i64> {
    client
        .eval(
            scripts::CAST,
            vec![key.to_string()],
            vec![option_id.to_string(), voter.to_string()],
        )
        .await
        .expect("cast script")
}

/// Single-choice invariant: after any cast sequence by one voter, the voter
/// holds at most the most recently cast option.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_single_choice_voter_holds_most_recent_option() {
    let client = connect().await;
    let key = test_key("vote");
    seed_vote(&client, &key, &vote_state(false)).await;

    assert_eq!(cast(&client, &key, 11, "user:9").await, vec![1, 0]);
    assert_eq!(cast(&client, &key, 12, "user:9").await, vec![1, 11]);

    let state = load_vote(&client, &key).await;
    let holding: Vec<i64> = state
        .options
        .iter()
        .filter(|o| o.voters.iter().any(|v| v == "user:9"))
        .map(|o| o.option_id)
        .collect();
    assert_eq!(holding, vec![12]);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// A duplicate cast is a no-op: no state change, no retraction reported.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_duplicate_cast_is_idempotent() {
    let client = connect().await;
    let key = test_key("vote");
    seed_vote(&client, &key, &vote_state(false)).await;

    assert_eq!(cast(&client, &key, 12, "user:9").await, vec![1, 0]);
    let before = load_vote(&client, &key).await;

    assert_eq!(cast(&client, &key, 12, "user:9").await, vec![0, 0]);
    let after = load_vote(&client, &key).await;
    assert_eq!(before, after);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// Vote-switch scenario: options A (2 votes) and B (0), single-choice.
/// X casting for B after A leaves A without X, B with X, and reports the
/// retraction from A so the unvote notice can be emitted.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_switch_reports_retracted_option() {
    let client = connect().await;
    let key = test_key("vote");
    let mut state = vote_state(false);
    state.options[0].voters.push("user:9".to_string()); // A has X plus 2 others

    seed_vote(&client, &key, &state).await;
    assert_eq!(cast(&client, &key, 12, "user:9").await, vec![1, 11]);

    let after = load_vote(&client, &key).await;
    assert!(!after.options[0].voters.iter().any(|v| v == "user:9"));
    assert!(after.options[1].voters.iter().any(|v| v == "user:9"));
    assert_eq!(after.options[0].voters.len(), 2);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// Multivote allows holding several options at once.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_multivote_holds_multiple_options() {
    let client = connect().await;
    let key = test_key("vote");
    seed_vote(&client, &key, &vote_state(true)).await;

    assert_eq!(cast(&client, &key, 11, "user:9").await, vec![1, 0]);
    assert_eq!(cast(&client, &key, 12, "user:9").await, vec![1, 0]);

    let state = load_vote(&client, &key).await;
    let holding = state
        .options
        .iter()
        .filter(|o| o.voters.iter().any(|v| v == "user:9"))
        .count();
    assert_eq!(holding, 2);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// Casting for a killed option is rejected without touching state.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_cast_for_killed_option_rejected() {
    let client = connect().await;
    let key = test_key("vote");
    seed_vote(&client, &key, &vote_state(false)).await;

    assert_eq!(cast(&client, &key, 13, "user:9").await, vec![-3, 0]);
    assert_eq!(cast(&client, &key, 99, "user:9").await, vec![-2, 0]);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// Retract removes only a held vote.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_retract_is_noop_when_absent() {
    let client = connect().await;
    let key = test_key("vote");
    seed_vote(&client, &key, &vote_state(false)).await;

    let removed: i64 = client
        .eval(
            scripts::RETRACT,
            vec![key.clone()],
            vec!["11".to_string(), "user:2".to_string()],
        )
        .await
        .expect("retract");
    assert_eq!(removed, 1);

    let again: i64 = client
        .eval(
            scripts::RETRACT,
            vec![key.clone()],
            vec!["11".to_string(), "user:2".to_string()],
        )
        .await
        .expect("retract");
    assert_eq!(again, 0);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// Write-in registration is refused once write-ins are off, and the blob
/// stays parseable after a script-side registration (cjson spells empty
/// voter lists as `{}`).
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_writein_registration_and_refusal() {
    let client = connect().await;
    let key = test_key("vote");
    seed_vote(&client, &key, &vote_state(false)).await;

    let status: i64 = client
        .eval(
            scripts::ADD_OPTION,
            vec![key.clone()],
            vec!["44".to_string(), "The sea".to_string()],
        )
        .await
        .expect("add option");
    assert_eq!(status, 1);

    let state = load_vote(&client, &key).await;
    let added = state.option(44).expect("write-in registered");
    assert_eq!(added.text, "The sea");
    assert!(added.voters.is_empty());

    // Turn write-ins off through the config script, then retry.
    let patch = r#"{"writein_allowed": false}"#;
    let zset = test_key("close");
    let _: i64 = client
        .eval(
            scripts::SET_CONFIG,
            vec![key.clone(), zset.clone()],
            vec![patch.to_string(), "7:1".to_string()],
        )
        .await
        .expect("set config");

    let refused: i64 = client
        .eval(
            scripts::ADD_OPTION,
            vec![key.clone()],
            vec!["45".to_string(), "The moon".to_string()],
        )
        .await
        .expect("add option");
    assert_eq!(refused, -2);

    let _: i64 = client.del(vec![key, zset]).await.expect("cleanup");
}

/// A close-time update maintains the schedule zset in the same script.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_set_config_maintains_close_schedule() {
    let client = connect().await;
    let key = test_key("vote");
    let zset = test_key("close");
    seed_vote(&client, &key, &vote_state(false)).await;

    let patch = r#"{"set_close": true, "close_time": "2026-08-05T12:00:00Z", "close_ms": 1785844800000}"#;
    let _: i64 = client
        .eval(
            scripts::SET_CONFIG,
            vec![key.clone(), zset.clone()],
            vec![patch.to_string(), "7:1".to_string()],
        )
        .await
        .expect("set close");

    let score: Option<f64> = client.zscore(&zset, "7:1").await.expect("zscore");
    assert_eq!(score, Some(1_785_844_800_000.0));
    assert!(load_vote(&client, &key).await.close_time.is_some());

    let clear = r#"{"set_close": true}"#;
    let _: i64 = client
        .eval(
            scripts::SET_CONFIG,
            vec![key.clone(), zset.clone()],
            vec![clear.to_string(), "7:1".to_string()],
        )
        .await
        .expect("clear close");

    let score: Option<f64> = client.zscore(&zset, "7:1").await.expect("zscore");
    assert_eq!(score, None);
    assert!(load_vote(&client, &key).await.close_time.is_none());

    let _: i64 = client.del(vec![key, zset]).await.expect("cleanup");
}

/// The channel active-set removal arbitrates the closing race: exactly one
/// of two concurrent closers observes the removal.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_close_race_has_single_winner() {
    let client = connect().await;
    let key = test_key("active");
    let _: i64 = client.sadd(&key, 42).await.expect("seed");

    let first: i64 = client.srem(&key, 42).await.expect("srem");
    let second: i64 = client.srem(&key, 42).await.expect("srem");
    assert_eq!(first, 1);
    assert_eq!(second, 0);

    let _: i64 = client.del(&key).await.expect("cleanup");
}

/// Chat idempotency: the same dedup token appends once; the ring holds one
/// entry and the second submission reports a duplicate.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_chat_append_dedups_on_token() {
    let client = connect().await;
    let seen = test_key("seen");
    let ring = test_key("ring");
    let channels = test_key("channels");

    let args = vec![
        "btok-1".to_string(),
        "1000000".to_string(),
        r#"{"text":"hello"}"#.to_string(),
        "60".to_string(),
        "7".to_string(),
    ];
    let first: i64 = client
        .eval(
            scripts::CHAT_APPEND,
            vec![seen.clone(), ring.clone(), channels.clone()],
            args.clone(),
        )
        .await
        .expect("append");
    let second: i64 = client
        .eval(
            scripts::CHAT_APPEND,
            vec![seen.clone(), ring.clone(), channels.clone()],
            args,
        )
        .await
        .expect("append");

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    let len: i64 = client.llen(&ring).await.expect("llen");
    assert_eq!(len, 1);

    let _: i64 = client
        .del(vec![seen, ring, channels])
        .await
        .expect("cleanup");
}

/// 80 buffered messages against a 60-slot ring leave the 60 most recent.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_chat_ring_trims_to_capacity() {
    let client = connect().await;
    let seen = test_key("seen");
    let ring = test_key("ring");
    let channels = test_key("channels");

    for i in 0..80 {
        let args = vec![
            format!("btok-{i}"),
            format!("{}", 1_000_000 + i),
            format!(r#"{{"seq":{i}}}"#),
            "60".to_string(),
            "7".to_string(),
        ];
        let _: i64 = client
            .eval(
                scripts::CHAT_APPEND,
                vec![seen.clone(), ring.clone(), channels.clone()],
                args,
            )
            .await
            .expect("append");
    }

    let len: i64 = client.llen(&ring).await.expect("llen");
    assert_eq!(len, 60);

    // Oldest entries dropped, newest retained.
    let entries: Vec<String> = client.lrange(&ring, 0, -1).await.expect("lrange");
    assert!(entries.first().map(String::as_str) == Some(r#"{"seq":20}"#));
    assert!(entries.last().map(String::as_str) == Some(r#"{"seq":79}"#));

    let _: i64 = client
        .del(vec![seen, ring, channels])
        .await
        .expect("cleanup");
}

/// Two bridged processes: a publish on one side reaches the other side's
/// local subscribers exactly once, and is not re-delivered to its own
/// process through the echo.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_bridge_delivers_across_processes_without_echo() {
    let url = get_redis_url();

    let router_a = FanoutRouter::new();
    let router_b = FanoutRouter::new();
    let bridge_a = FanoutBridge::connect(&url).await.expect("bridge a");
    let bridge_b = FanoutBridge::connect(&url).await.expect("bridge b");
    bridge_a
        .start(Arc::clone(&router_a))
        .await
        .expect("start a");
    bridge_b
        .start(Arc::clone(&router_b))
        .await
        .expect("start b");

    // Give the subscriptions a moment to land.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut sub_a = router_a.subscribe(vec!["chan:1".to_string()], None);
    let mut sub_b = router_b.subscribe(vec!["chan:1".to_string()], None);

    let message = FanoutMessage::VoteOpenChanged {
        vote_id: 5,
        channel_id: 1,
        open: true,
    };
    router_a.publish_local("chan:1", &message);
    bridge_a.forward("chan:1", &message).await.expect("forward");

    // B receives via the bridge.
    let received = tokio::time::timeout(Duration::from_secs(2), sub_b.recv())
        .await
        .expect("bridged delivery")
        .expect("message");
    assert_eq!(received.0, "chan:1");

    // A's subscriber got exactly the local copy; the echoed frame is
    // discarded by the sender-tag check.
    let first = tokio::time::timeout(Duration::from_secs(2), sub_a.recv())
        .await
        .expect("local delivery")
        .expect("message");
    assert_eq!(first.0, "chan:1");
    let echo = tokio::time::timeout(Duration::from_millis(500), sub_a.recv()).await;
    assert!(echo.is_err(), "publisher must not receive its own echo");

    bridge_a.shutdown().await.expect("shutdown a");
    bridge_b.shutdown().await.expect("shutdown b");
}
