//! Integration tests for the network client against a local mock server

use fieldsync_network::{Client, ClientConfig, ConnectivityChecker, NetworkError};
use fieldsync_resilience::{CircuitBreakerConfig, RetryPolicy};
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::time::Duration;

fn fast_client() -> Client {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = ClientConfig {
        timeout: Duration::from_secs(5),
        retry_policy: Some(RetryPolicy::new(3).with_initial_delay(Duration::from_millis(1))),
        circuit_breaker_config: None,
        ..ClientConfig::default()
    };
    Client::with_config(config).unwrap()
}

#[tokio::test]
async fn test_get_json_decodes_body_and_sends_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/sync/trial")
        .match_query(Matcher::UrlEncoded(
            "since".into(),
            "2024-05-01T00:00:00.000Z".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"changes": []}"#)
        .create_async()
        .await;

    let client = fast_client();
    let body: Value = client
        .get_json(
            &format!("{}/sync/trial", server.url()),
            &[("since", "2024-05-01T00:00:00.000Z".to_string())],
        )
        .await
        .unwrap();

    assert_eq!(body, json!({"changes": []}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_retries_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/sync/study")
        .with_status(503)
        .with_body("maintenance")
        .expect(3)
        .create_async()
        .await;

    let client = fast_client();
    let result: Result<Value, _> = client
        .get_json(&format!("{}/sync/study", server.url()), &[])
        .await;

    match result {
        Err(NetworkError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected HTTP 503, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_does_not_retry_client_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/sync/cross")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let client = fast_client();
    let result: Result<Value, _> = client
        .get_json(&format!("{}/sync/cross", server.url()), &[])
        .await;

    assert!(result.unwrap_err().is_client_error());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_writes_are_sent_once() {
    let mut server = Server::new_async().await;
    let post = server
        .mock("POST", "/germplasm")
        .match_body(Matcher::Json(json!({"id": "g1", "name": "IR64"})))
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let client = fast_client();
    let result = client
        .post_json(
            &format!("{}/germplasm", server.url()),
            &json!({"id": "g1", "name": "IR64"}),
        )
        .await;

    assert_eq!(result.unwrap_err().status(), Some(500));
    post.assert_async().await;
}

#[tokio::test]
async fn test_put_and_delete_report_status() {
    let mut server = Server::new_async().await;
    let put = server
        .mock("PUT", "/trial/t1")
        .with_status(200)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/trial/t1")
        .with_status(204)
        .create_async()
        .await;

    let client = fast_client();
    let url = format!("{}/trial/t1", server.url());

    assert_eq!(client.put_json(&url, &json!({"status": "active"})).await.unwrap(), 200);
    assert_eq!(client.delete(&url).await.unwrap(), 204);

    put.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn test_circuit_breaker_fails_fast() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/study/s1")
        .with_status(502)
        .expect(2)
        .create_async()
        .await;

    let config = ClientConfig {
        retry_policy: None,
        circuit_breaker_config: Some(CircuitBreakerConfig::new(2, Duration::from_secs(60))),
        ..ClientConfig::default()
    };
    let client = Client::with_config(config).unwrap();
    let url = format!("{}/study/s1", server.url());

    assert!(client.delete(&url).await.is_err());
    assert!(client.delete(&url).await.is_err());

    let third = client.delete(&url).await.unwrap_err();
    assert!(third.is_circuit_open());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_connectivity_against_mock_server() {
    let mut server = Server::new_async().await;
    let _health = server
        .mock("HEAD", "/health")
        .with_status(404)
        .create_async()
        .await;

    let checker = ConnectivityChecker::new(fast_client(), format!("{}/health", server.url()));
    assert!(checker.is_online().await);

    let offline = ConnectivityChecker::new(fast_client(), "http://127.0.0.1:9/health");
    assert!(!offline.is_online().await);
}
