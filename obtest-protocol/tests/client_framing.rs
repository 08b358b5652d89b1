//! Wire-level behavior of `ProtocolClient` against mock servers

use obtest_core::test_utils::{MockServer, Reply};
use obtest_core::{Endpoint, ObtestError};
use obtest_protocol::ProtocolClient;
use std::time::Duration;

#[tokio::test]
async fn test_send_appends_single_terminator() {
    let server = MockServer::constant("SUCCESS").await.unwrap();
    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();

    client.roundtrip("select * from t;").await.unwrap();

    let raw = server.raw_requests();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0], b"select * from t;\0".to_vec());
}

#[tokio::test]
async fn test_response_is_normalized() {
    let server = MockServer::constant("1|A\n2|B").await.unwrap();
    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();

    let response = client.roundtrip("select * from t;").await.unwrap();
    assert_eq!(response, "1|A\n2|B\n");
}

#[tokio::test]
async fn test_response_split_across_chunks() {
    let server = MockServer::tcp(|_, _| {
        Reply::Chunks(vec![b"id | na".to_vec(), b"me\n1 | a".to_vec(), b"\n\0".to_vec()])
    })
    .await
    .unwrap();
    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();

    let response = client.roundtrip("select * from t;").await.unwrap();
    assert_eq!(response, "id | name\n1 | a\n");
}

#[tokio::test]
async fn test_receive_timeout() {
    let server = MockServer::tcp(|_, _| Reply::Silent).await.unwrap();
    let budget = Duration::from_millis(100);
    let mut client = ProtocolClient::connect_with_timeout(server.endpoint(), budget)
        .await
        .unwrap();

    let err = client.roundtrip("select * from t;").await.unwrap_err();
    assert!(matches!(err, ObtestError::ProtocolTimeout(d) if d == budget));
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_server_hang_up() {
    let server = MockServer::tcp(|_, _| Reply::HangUp).await.unwrap();
    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();

    let err = client.roundtrip("select * from t;").await.unwrap_err();
    assert!(matches!(err, ObtestError::Connection(_)));
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_sequential_requests_on_one_connection() {
    let server = MockServer::tcp(|_, request| Reply::text(format!("echo {request}")))
        .await
        .unwrap();
    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();

    assert_eq!(client.roundtrip("a").await.unwrap(), "echo a\n");
    assert_eq!(client.roundtrip("b").await.unwrap(), "echo b\n");
    assert_eq!(server.requests(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_unix_socket_endpoint() {
    let server = MockServer::unix(|_, _| Reply::text("SUCCESS")).await.unwrap();
    assert!(matches!(server.endpoint(), Endpoint::Unix { .. }));

    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();
    assert_eq!(client.roundtrip("show tables;").await.unwrap(), "SUCCESS\n");
}

#[tokio::test]
async fn test_connect_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("missing.sock")).unwrap();

    let err = ProtocolClient::connect(&Endpoint::unix(path))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ObtestError::Connection(_)));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = MockServer::constant("SUCCESS").await.unwrap();
    let mut client = ProtocolClient::connect(server.endpoint()).await.unwrap();

    client.close();
    client.close();
    assert!(!client.is_open());

    let err = client.send("select 1;").await.unwrap_err();
    assert!(matches!(err, ObtestError::Connection(_)));
}
