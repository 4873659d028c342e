use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{MuxrpcError, Result};

/// Maximum frame payload size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Writes one length-prefixed frame. The caller flushes when the message
/// (usually a header frame plus a body frame) is complete.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(MuxrpcError::FrameTooLarge(payload.len(), MAX_FRAME_SIZE));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Reads one length-prefixed frame.
///
/// # Errors
///
/// Returns an error if the stream ends mid-frame, the prefix announces a
/// payload larger than [`MAX_FRAME_SIZE`], or the read itself fails.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(MuxrpcError::FrameTooLarge(len, MAX_FRAME_SIZE));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Reads and drops one frame, keeping the stream's framing intact without
/// decoding the payload.
pub async fn discard_frame<R>(reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let _ = read_frame(reader).await?;
    Ok(())
}
