//! Wire framing: a u32 little-endian byte count followed by the payload.
//!
//! Both directions use MessagePack payloads; requests may also be JSON so
//! they can be typed by hand into `socat`.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::IpcError;

/// Largest payload accepted in either direction (1 MiB)
pub(crate) const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;

    let size = u32::from_le_bytes(header) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge { size });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Encode `message` as MessagePack and send it as one frame.
pub(crate) async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = rmp_serde::to_vec(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge {
            size: payload.len(),
        });
    }

    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    #[tokio::test]
    async fn test_message_travels_as_one_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_message(&mut client, &Request::Discover { path: Some("/music".into()) })
            .await
            .unwrap();

        let payload = read_frame(&mut server).await.unwrap();
        let request: Request = rmp_serde::from_slice(&payload).unwrap();
        assert_eq!(request, Request::Discover { path: Some("/music".into()) });
    }

    #[tokio::test]
    async fn test_oversized_header_rejected_before_reading_body() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let size = (MAX_FRAME_SIZE as u32 + 1).to_le_bytes();
        client.write_all(&size).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, IpcError::FrameTooLarge { size } if size == MAX_FRAME_SIZE + 1));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&8u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert!(matches!(read_frame(&mut server).await, Err(IpcError::Io(_))));
    }
}
