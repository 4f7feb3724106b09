//! Client side of the daemon socket, used by the CLI.

use crate::frame::{read_frame, write_message};
use crate::{IpcError, Request, Response, ResponseData};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;

/// Socket used when neither the caller nor the config names one
const DEFAULT_SOCKET_PATH: &str = "/tmp/scanward.sock";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Covers writing the request and waiting for the reply
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one connection per request to the daemon socket
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new() -> Self {
        Self::with_socket_path(DEFAULT_SOCKET_PATH)
    }

    pub fn with_socket_path<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// A socket file is taken as a sign of life; the PID lock keeps it honest.
    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists()
    }

    pub async fn connect(&self) -> Result<ConnectedClient, IpcError> {
        if !self.is_daemon_running() {
            return Err(IpcError::DaemonNotRunning);
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| IpcError::ConnectionFailed("connect timed out".to_string()))??;

        Ok(ConnectedClient { stream })
    }

    /// Send one request over a fresh connection
    pub async fn request(&self, request: Request) -> Result<Response, IpcError> {
        self.connect().await?.send(request).await
    }

    /// Like [`IpcClient::request`], but error responses become
    /// [`IpcError::Remote`] and only the payload is returned.
    pub async fn call(&self, request: Request) -> Result<Option<ResponseData>, IpcError> {
        match self.request(request).await? {
            Response::Ok { data } => Ok(data),
            Response::Ack => Ok(None),
            Response::Error { code, message } => Err(IpcError::Remote { code, message }),
        }
    }

    pub async fn get_status(&self) -> Result<ResponseData, IpcError> {
        match self.call(Request::Status).await? {
            Some(status @ ResponseData::Status { .. }) => Ok(status),
            other => Err(IpcError::ConnectionFailed(format!(
                "expected a status reply, got {:?}",
                other
            ))),
        }
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection to the daemon
pub struct ConnectedClient {
    stream: UnixStream,
}

impl ConnectedClient {
    pub async fn send(&mut self, request: Request) -> Result<Response, IpcError> {
        tokio::time::timeout(REQUEST_TIMEOUT, self.exchange(request))
            .await
            .map_err(|_| IpcError::ConnectionFailed("request timed out".to_string()))?
    }

    async fn exchange(&mut self, request: Request) -> Result<Response, IpcError> {
        write_message(&mut self.stream, &request).await?;
        let payload = read_frame(&mut self.stream).await?;
        Ok(rmp_serde::from_slice(&payload)?)
    }
}
