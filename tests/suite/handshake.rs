//! Startup handshake against a fake engine over loopback TCP

use enginelink_client::{
    ClientError, ClientEvent, ClientConfig, EngineClient, ProvisioningEvent, Readiness, kinds,
};

use crate::common::{FakeEngine, Handshake, client_for, test_config};

#[tokio::test]
async fn start_completes_after_thread_start() {
    let engine = FakeEngine::new(Handshake::Accept);
    let client = client_for(&engine, test_config());

    client.start().await.unwrap();

    assert!(client.is_ready());
    assert_eq!(client.readiness(), Readiness::Ready);
    client.dispose().await;
}

#[tokio::test]
async fn undecodable_frames_do_not_block_readiness() {
    let engine = FakeEngine::new(Handshake::AcceptAfterGarbage);
    let client = client_for(&engine, test_config());

    client.start().await.unwrap();
    assert!(client.is_ready());

    let reply = client.request("ping", None).await.unwrap().unwrap();
    assert_eq!(reply["echo"], "ping");
    client.dispose().await;
}

#[tokio::test]
async fn initialize_is_acknowledged_with_fixed_envelope() {
    let engine = FakeEngine::new(Handshake::Accept);
    let client = client_for(&engine, test_config());

    client.start().await.unwrap();

    // The fake engine withholds thread_start until the ack arrives.
    let ack = engine.wait_for_kind(kinds::INITIALIZED).await;
    assert!(ack.id().is_none());
    assert!(!ack.is_async());
    assert!(ack.data().is_none());
    client.dispose().await;
}

#[tokio::test]
async fn authentication_failure_rejects_start_with_reason() {
    let engine = FakeEngine::new(Handshake::Reject("license expired".to_string()));
    let client = client_for(&engine, test_config());

    let err = client.start().await.unwrap_err();

    match err {
        ClientError::AuthenticationFailure(reason) => assert_eq!(reason, "license expired"),
        other => panic!("expected AuthenticationFailure, got {other:?}"),
    }
    assert!(!client.is_ready());
    assert!(matches!(
        client.send(kinds::MESSAGE, None),
        Err(ClientError::ClientNotStarted)
    ));
    client.dispose().await;
}

#[tokio::test]
async fn silent_engine_times_out() {
    let engine = FakeEngine::new(Handshake::Silent);
    let config = ClientConfig {
        startup_timeout_secs: 1,
        ..test_config()
    };
    let client = client_for(&engine, config);

    let err = client.start().await.unwrap_err();

    assert!(matches!(err, ClientError::StartupTimeout(_)), "got {err:?}");
    assert_eq!(client.readiness(), Readiness::TimedOut);
    client.dispose().await;
}

#[tokio::test]
async fn startup_events_are_observable() {
    let engine = FakeEngine::new(Handshake::Accept);
    let client = client_for(&engine, test_config());
    let mut events = client.subscribe();

    client.start().await.unwrap();

    let mut provisioning = Vec::new();
    let mut received = Vec::new();
    let mut sent = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::Provisioning(stage) => provisioning.push(stage),
            ClientEvent::MessageReceived(envelope) => received.push(envelope.kind().to_string()),
            ClientEvent::MessageSent(envelope) => sent.push(envelope.kind().to_string()),
        }
    }

    assert_eq!(
        provisioning,
        vec![
            ProvisioningEvent::DownloadStarted,
            ProvisioningEvent::DownloadEnded,
            ProvisioningEvent::ExtractStarted,
            ProvisioningEvent::ExtractEnded,
        ]
    );
    assert_eq!(received, vec![kinds::INITIALIZE, kinds::THREAD_START]);
    assert_eq!(sent, vec![kinds::INITIALIZED]);
    client.dispose().await;
}

#[tokio::test]
async fn missing_engine_binary_is_a_provisioning_error() {
    let mut config = test_config();
    config.engine.command = "enginelink-test-no-such-engine-binary".to_string();
    let client = EngineClient::new(config);

    let err = client.start().await.unwrap_err();

    assert!(matches!(err, ClientError::Provisioning(_)), "got {err:?}");
    client.dispose().await;
}
