//! Correlated requests over a live connection

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use enginelink_client::{ClientEvent, CorrelationId, EngineClient, Payload, TcpTransport, kinds};
use tokio::sync::oneshot;

use crate::common::{FakeEngine, NOISY, payload, ready_client};

#[tokio::test]
async fn request_returns_reply_payload() {
    let (client, _engine) = ready_client().await;

    let reply = client
        .request(kinds::MESSAGE, Some(payload(serde_json::json!({"query": "status"}))))
        .await
        .unwrap()
        .expect("reply carries a payload");

    assert_eq!(reply["echo"], kinds::MESSAGE);
    assert_eq!(reply["data"]["query"], "status");
    assert_eq!(client.pending_requests(), 0);
    client.dispose().await;
}

#[tokio::test]
async fn request_ack_completes_without_payload() {
    let (client, _engine) = ready_client().await;

    client.request_ack("open_page", None).await.unwrap();

    assert_eq!(client.pending_requests(), 0);
    client.dispose().await;
}

#[tokio::test]
async fn send_with_reply_invokes_callback_once() {
    let (client, _engine) = ready_client().await;
    let (tx, rx) = oneshot::channel();

    let id = client
        .send_with_reply("lookup", None, move |reply| {
            let _ = tx.send(reply);
        })
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!id.is_none());
    assert_eq!(reply["echo"], "lookup");
    client.dispose().await;
}

#[tokio::test]
async fn stray_reply_is_ignored_but_observed() {
    let (client, _engine) = ready_client().await;
    let mut events = client.subscribe();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let (tx, rx) = oneshot::channel();

    client
        .send_with_ack(NOISY, None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        })
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let stray = CorrelationId::new(CorrelationId::MAX).unwrap();
    let mut saw_stray = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::MessageReceived(envelope) = event
            && envelope.id() == stray
        {
            saw_stray = true;
        }
    }
    assert!(saw_stray, "stray reply should still reach observers");
    client.dispose().await;
}

#[tokio::test]
async fn concurrent_requests_are_matched_by_id() {
    let (client, engine) = ready_client().await;

    let replies = four_concurrent_requests(&client).await;

    for (n, reply) in replies.iter().enumerate() {
        assert_eq!(reply["data"]["n"], n);
    }
    let ids: HashSet<_> = engine
        .received()
        .into_iter()
        .filter(|envelope| envelope.kind() == kinds::MESSAGE)
        .map(|envelope| envelope.id())
        .collect();
    assert_eq!(ids.len(), replies.len());
    client.dispose().await;
}

async fn four_concurrent_requests(client: &EngineClient<FakeEngine, TcpTransport>) -> Vec<Payload> {
    let request = |n: usize| {
        client.request(kinds::MESSAGE, Some(payload(serde_json::json!({ "n": n }))))
    };
    let (a, b, c, d) = tokio::join!(request(0), request(1), request(2), request(3));
    [a, b, c, d]
        .into_iter()
        .map(|reply| reply.unwrap().unwrap())
        .collect()
}

#[tokio::test]
async fn fire_and_forget_reaches_engine_without_pending_entry() {
    let (client, engine) = ready_client().await;

    client
        .send("notify", Some(payload(serde_json::json!({"level": "info"}))))
        .unwrap();

    let delivered = engine.wait_for_kind("notify").await;
    assert!(!delivered.is_async());
    assert_eq!(delivered.data().unwrap()["level"], "info");
    assert_eq!(client.pending_requests(), 0);
    client.dispose().await;
}
