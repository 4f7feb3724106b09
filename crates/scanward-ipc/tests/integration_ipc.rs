//! Integration tests for Scanward IPC communication.
//!
//! These tests verify end-to-end communication between client and server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{Barrier, Mutex};

use async_trait::async_trait;
use tempfile::tempdir;
use scanward_ipc::{
    DispatchOutcome, ErrorCode, IpcClient, IpcServer, Request, RequestHandler, Response,
    ResponseData,
};

/// Test handler that records scan commands like the daemon would route them
#[derive(Default)]
struct IntegrationHandler {
    received: Mutex<Vec<Request>>,
}

#[async_trait]
impl RequestHandler for IntegrationHandler {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok_with(ResponseData::Pong {
                timestamp: chrono::Utc::now().timestamp(),
            }),
            Request::Status => Response::ok_with(ResponseData::Status {
                version: "0.1.0-test".to_string(),
                uptime_secs: 42,
                session_active: !self.received.lock().await.is_empty(),
                indicator: None,
                parsing_percent: 0,
                current_discovery: None,
                reload_count: 0,
                pending_operations: 0,
                lock_held: false,
                pending_devices: vec![],
            }),
            Request::Shutdown => Response::ack(),
            Request::Unrecognized => {
                Response::error(ErrorCode::InvalidRequest, "unrecognized action")
            }
            command => {
                let name = command.action().to_string();
                self.received.lock().await.push(command);
                Response::ok_with(ResponseData::Dispatched {
                    command: name,
                    outcome: DispatchOutcome::Delivered,
                })
            }
        }
    }
}

async fn start_server(socket_path: &Path, handler: Arc<IntegrationHandler>) {
    let server = IpcServer::new(socket_path, handler).await.unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn send_raw(socket_path: &Path, body: &[u8]) -> Response {
    let mut stream = UnixStream::connect(socket_path).await.unwrap();
    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .await
        .unwrap();
    stream.write_all(body).await.unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await.unwrap();
    rmp_serde::from_slice(&buf).unwrap()
}

#[tokio::test]
async fn test_full_ipc_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("integration.sock");
    let handler = Arc::new(IntegrationHandler::default());
    start_server(&socket_path, handler.clone()).await;

    let client = IpcClient::with_socket_path(&socket_path);

    // 1. Ping
    let response = client.request(Request::Ping).await.unwrap();
    assert!(matches!(
        response,
        Response::Ok {
            data: Some(ResponseData::Pong { .. })
        }
    ));

    // 2. Scan commands
    for request in [
        Request::Init { upgrade: true },
        Request::Discover {
            path: Some("/music".to_string()),
        },
        Request::Reload { path: None },
        Request::PauseScan,
        Request::ResumeScan,
    ] {
        let response = client.call(request).await.unwrap();
        assert!(matches!(
            response,
            Some(ResponseData::Dispatched {
                outcome: DispatchOutcome::Delivered,
                ..
            })
        ));
    }
    assert_eq!(handler.received.lock().await.len(), 5);
    assert_eq!(
        handler.received.lock().await[0],
        Request::Init { upgrade: true }
    );

    // 3. Status
    if let ResponseData::Status {
        version,
        session_active,
        ..
    } = client.get_status().await.unwrap()
    {
        assert_eq!(version, "0.1.0-test");
        assert!(session_active);
    } else {
        panic!("Expected Status response");
    }
}

#[tokio::test]
async fn test_json_requests_accepted() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("json.sock");
    let handler = Arc::new(IntegrationHandler::default());
    start_server(&socket_path, handler.clone()).await;

    let response = send_raw(&socket_path, br#"{"action":"discover_device","path":"/media/sd"}"#).await;
    assert!(matches!(
        response,
        Response::Ok {
            data: Some(ResponseData::Dispatched { .. })
        }
    ));
    assert_eq!(
        handler.received.lock().await.as_slice(),
        &[Request::DiscoverDevice {
            path: "/media/sd".to_string()
        }]
    );

    let response = send_raw(&socket_path, br#"{"action":"defragment"}"#).await;
    assert!(matches!(
        response,
        Response::Error {
            code: ErrorCode::InvalidRequest,
            ..
        }
    ));
}

#[tokio::test]
async fn test_malformed_request_gets_error_response() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("malformed.sock");
    start_server(&socket_path, Arc::new(IntegrationHandler::default())).await;

    let response = send_raw(&socket_path, b"\xc1garbage").await;
    if let Response::Error { code, message } = response {
        assert_eq!(code, ErrorCode::InvalidRequest);
        assert!(message.contains("Failed to parse request"));
    } else {
        panic!("Expected Error response, got {:?}", response);
    }
}

#[tokio::test]
async fn test_concurrent_clients() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("concurrent.sock");
    let handler = Arc::new(IntegrationHandler::default());
    start_server(&socket_path, handler.clone()).await;

    let barrier = Arc::new(Barrier::new(10));
    let mut handles = Vec::new();

    for i in 0..10 {
        let path = socket_path.clone();
        let barrier = barrier.clone();

        handles.push(tokio::spawn(async move {
            barrier.wait().await;

            let client = IpcClient::with_socket_path(&path);
            let response = client
                .request(Request::Discover {
                    path: Some(format!("/music/{i}")),
                })
                .await;

            response.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 10, "All 10 concurrent clients should succeed");
    assert_eq!(handler.received.lock().await.len(), 10);
}

#[tokio::test]
async fn test_client_reconnect() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("reconnect.sock");
    start_server(&socket_path, Arc::new(IntegrationHandler::default())).await;

    let client = IpcClient::with_socket_path(&socket_path);

    for _ in 0..3 {
        let response = client.request(Request::Ping).await.unwrap();
        assert!(matches!(
            response,
            Response::Ok {
                data: Some(ResponseData::Pong { .. })
            }
        ));
    }

    let response = client.request(Request::Shutdown).await.unwrap();
    assert!(matches!(response, Response::Ack));
}
