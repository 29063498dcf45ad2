//! Token authorization on connect.

mod common;

use common::TestServer;
use ringcast::config::AuthConfig;
use ringcast::protocol::{Request, Response};
use std::time::Duration;

fn secured_config() -> ringcast::Config {
    let mut config = TestServer::config();
    config.auth = Some(AuthConfig {
        tokens: vec!["replica-secret".into(), "backup-secret".into()],
    });
    config
}

#[tokio::test]
async fn test_valid_token_is_authorized() {
    let server = TestServer::spawn_with(secured_config(), &["trades"])
        .await
        .unwrap();
    let mut replica = server.connect().await.unwrap();

    let response = replica
        .request(Request::Auth {
            credentials: "backup-secret".into(),
        })
        .await
        .unwrap();
    assert_eq!(response, Response::Authorized);
    assert_eq!(replica.subscribe().await.unwrap(), -1);

    server.halt().await.unwrap();
}

#[tokio::test]
async fn test_wrong_token_is_denied_and_closed() {
    let server = TestServer::spawn_with(secured_config(), &["trades"])
        .await
        .unwrap();
    let mut replica = server.connect().await.unwrap();

    let response = replica
        .request(Request::Auth {
            credentials: "guess".into(),
        })
        .await
        .unwrap();
    assert_eq!(response, Response::Denied);
    replica.expect_closed().await.unwrap();

    assert!(common::wait_until(Duration::from_secs(2), || server.connected_client_count() == 0).await);
    assert!(server.is_running());
    server.halt().await.unwrap();
}

#[tokio::test]
async fn test_first_request_must_be_auth() {
    let server = TestServer::spawn_with(secured_config(), &["trades"])
        .await
        .unwrap();
    let mut replica = server.connect().await.unwrap();

    assert_eq!(
        replica.request(Request::Subscribe).await.unwrap(),
        Response::Denied
    );
    replica.expect_closed().await.unwrap();
    assert_eq!(server.bridge().subscriber_count(), 0);

    server.halt().await.unwrap();
}

#[tokio::test]
async fn test_open_server_accepts_auth_as_noop() {
    let server = TestServer::spawn(&["trades"]).await.unwrap();
    let mut replica = server.connect().await.unwrap();

    assert_eq!(
        replica
            .request(Request::Auth {
                credentials: "anything".into(),
            })
            .await
            .unwrap(),
        Response::Authorized
    );

    server.halt().await.unwrap();
}
