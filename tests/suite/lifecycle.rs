//! Disposal and shutdown behaviour

use enginelink_client::{ClientError, kinds};

use crate::common::{FakeEngine, HOLD, Handshake, client_for, ready_client, test_config};

#[tokio::test]
async fn dispose_rejects_waiting_request() {
    let (client, engine) = ready_client().await;

    let (outcome, ()) = tokio::join!(client.request(HOLD, None), async {
        engine.wait_for_kind(HOLD).await;
        assert_eq!(client.pending_requests(), 1);
        client.dispose().await;
    });

    assert!(matches!(outcome, Err(ClientError::Disposed)), "got {outcome:?}");
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn sends_after_dispose_fail() {
    let (client, _engine) = ready_client().await;

    client.dispose().await;

    assert!(matches!(
        client.send(kinds::MESSAGE, None),
        Err(ClientError::Disposed)
    ));
    assert!(matches!(
        client.request_ack(kinds::MESSAGE, None).await,
        Err(ClientError::Disposed)
    ));
    assert!(matches!(client.start().await, Err(ClientError::Disposed)));
}

#[tokio::test]
async fn dispose_is_idempotent_and_stops_engine_once() {
    let engine = FakeEngine::new(Handshake::Accept);
    let client = client_for(&engine, test_config());
    client.start().await.unwrap();

    client.dispose().await;
    client.dispose().await;

    assert_eq!(engine.shutdowns(), 1);
}

#[tokio::test]
async fn fixed_port_is_used_when_configured() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let engine = FakeEngine::new(Handshake::Accept);
    let mut config = test_config();
    config.port = Some(port);
    let client = client_for(&engine, config);

    client.start().await.unwrap();

    client.request_ack("ping", None).await.unwrap();
    client.dispose().await;
}
