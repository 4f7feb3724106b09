//! Unix socket server for the Scanward daemon.
//!
//! One request per connection: read a frame, hand the decoded request to the
//! [`RequestHandler`], write the response frame back.

use crate::frame::{read_frame, write_message};
use crate::{ErrorCode, IpcError, Request, Response};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};

/// A client gets this long to deliver its request
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Answers decoded requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

/// Listener bound to the daemon socket
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    handler: Arc<dyn RequestHandler>,
}

impl IpcServer {
    /// Bind `socket_path`, replacing a stale socket file left by a dead daemon.
    pub async fn new<P: AsRef<Path>>(
        socket_path: P,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, IpcError> {
        let socket_path = socket_path.as_ref();

        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        // owner only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(socket = %socket_path.display(), "IPC server listening");

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            handler,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the future is dropped.
    pub async fn run(&self) -> Result<(), IpcError> {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, handler).await {
                    tracing::debug!(error = %e, "Connection closed with error");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    handler: Arc<dyn RequestHandler>,
) -> Result<(), IpcError> {
    let payload = tokio::time::timeout(READ_TIMEOUT, read_frame(&mut stream)).await?;

    let request = match payload.and_then(|bytes| decode_request(&bytes)) {
        Ok(request) => request,
        Err(e) => {
            let response = Response::error(
                ErrorCode::InvalidRequest,
                format!("Failed to parse request: {}", e),
            );
            write_message(&mut stream, &response).await?;
            return Err(e);
        }
    };

    tracing::debug!(action = request.action(), "Request received");
    let response = handler.handle(request).await;
    write_message(&mut stream, &response).await
}

/// MessagePack first, JSON as a fallback for hand-written requests.
fn decode_request(buf: &[u8]) -> Result<Request, IpcError> {
    match rmp_serde::from_slice(buf) {
        Ok(request) => Ok(request),
        Err(msgpack_err) => {
            serde_json::from_slice(buf).map_err(|_| IpcError::Deserialize(msgpack_err))
        }
    }
}
