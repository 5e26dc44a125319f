//! End-to-end feed behaviour through the ledger socket.

use std::time::Duration;

use chainfeed_core::{Keypair, Record, FIRST_POST};
use chainfeed_engine::FeedError;
use chainfeed_integration_tests::Node;
use futures::TryStreamExt;
use tokio::sync::mpsc;

#[tokio::test]
async fn scenario_first_post_then_reply_then_stale_conflict() {
    let node = Node::start();
    let engine = node.engine().await;
    let (_, _, founder, first) = node.feed(&engine).await;

    let records: Vec<Record> = engine.enumerate(first).try_collect().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, FIRST_POST);
    assert!(records[0].next.is_nil());

    let hello = engine.post(&founder, "hello", first, None).await.unwrap();
    let records: Vec<Record> = engine.enumerate(first).try_collect().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].address, hello);
    assert_eq!(records[1].text, "hello");
    assert_eq!(records[1].author, founder.address());

    let err = engine.post(&founder, "branch", first, None).await.unwrap_err();
    assert!(err.is_conflict());
    let records: Vec<Record> = engine.enumerate(first).try_collect().await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn concurrent_writers_one_wins() {
    let node = Node::start();
    let engine_a = node.engine().await;
    let engine_b = node.engine().await;
    let (program, feed_key, founder, first) = node.feed(&engine_a).await;
    let other = Keypair::generate();
    engine_b
        .writer()
        .register_user(program, &other, &feed_key)
        .await
        .unwrap();

    let (ra, rb) = tokio::join!(
        engine_a.post(&founder, "a", first, None),
        engine_b.post(&other, "b", first, None),
    );
    assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
    let loser = ra.as_ref().err().or(rb.as_ref().err()).unwrap();
    assert!(loser.is_conflict(), "unexpected error {loser:?}");

    let records: Vec<Record> = engine_a.enumerate(first).try_collect().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].next, ra.or(rb).unwrap());
}

#[tokio::test]
async fn lost_response_over_socket_posts_once() {
    let node = Node::start();
    let engine = node.engine().await;
    let (_, _, founder, first) = node.feed(&engine).await;

    node.ledger.drop_next_responses(1).await;
    let address = engine.post(&founder, "exactly once", first, None).await.unwrap();

    let records: Vec<Record> = engine.enumerate(first).try_collect().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].address, address);
}

#[tokio::test]
async fn exhausted_retries_leave_chain_untouched() {
    let node = Node::start();
    let engine = node.engine().await;
    let (_, _, founder, first) = node.feed(&engine).await;

    node.ledger.fail_next_submits(3).await;
    let err = engine.post(&founder, "lost", first, None).await.unwrap_err();
    assert!(matches!(err, FeedError::PostFailed { attempts: 3, .. }));

    let tail = engine.resolve_tail(first, |_| {}).await.unwrap();
    assert_eq!(tail, first);
}

#[tokio::test]
async fn monitor_over_socket_delivers_in_order() {
    let node = Node::start();
    let engine = node.engine().await;
    let (_, _, founder, first) = node.feed(&engine).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = engine.monitor(first, move |record: &Record| {
        let _ = tx.send(record.address);
    });

    let mut posted = Vec::new();
    let mut tail = first;
    for i in 0..4 {
        tail = engine
            .post(&founder, &format!("message {i}"), tail, None)
            .await
            .unwrap();
        posted.push(tail);
    }

    let mut delivered = Vec::new();
    while delivered.len() < posted.len() {
        let address = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("monitor delivery")
            .expect("monitor alive");
        delivered.push(address);
    }
    assert_eq!(delivered, posted);

    handle.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle.join())
        .await
        .expect("monitor stops")
        .unwrap();
}

#[tokio::test]
async fn revoked_participant_is_refused() {
    let node = Node::start();
    let engine = node.engine().await;
    let (program, feed_key, founder, first) = node.feed(&engine).await;
    let troll = Keypair::generate();
    engine
        .writer()
        .register_user(program, &troll, &feed_key)
        .await
        .unwrap();

    let tail = engine.post(&troll, "spam", first, None).await.unwrap();
    let tail = engine
        .post(&founder, "bye troll", tail, Some(troll.address()))
        .await
        .unwrap();

    let err = engine.post(&troll, "more spam", tail, None).await.unwrap_err();
    assert!(matches!(err, FeedError::Rejected { .. }));
    assert!(!err.is_conflict());
}
