//! # Framing
//!
//! Length-prefixed frames over any tokio byte stream: a little-endian `u32`
//! payload length followed by the payload.
//!
//! ## Invariants
//! - A clean end of stream is only recognised on a frame boundary; ending
//!   inside a header or payload is [`Error::TruncatedFrame`].
//! - Oversized frames are rejected before any payload is buffered.

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::error::Result;

/// The default upper bound for a single frame (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Framing limits.
#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    pub max_frame_len: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Reads one frame. Returns `Ok(None)` when the stream ends cleanly.
pub async fn read_frame<R>(io: &mut R, config: &FrameConfig) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = io.read(&mut header[filled..]).await?;
        if n == 0 {
            return if filled == 0 { Ok(None) } else { Err(Error::TruncatedFrame) };
        }
        filled += n;
    }

    let len = u32::from_le_bytes(header);
    if len > config.max_frame_len {
        return Err(Error::FrameTooLarge {
            len: len as u64,
            max: config.max_frame_len,
        });
    }

    let mut payload = vec![0u8; len as usize];
    io.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::TruncatedFrame,
        _ => Error::Io(e),
    })?;
    Ok(Some(payload))
}

/// Writes one frame and flushes it.
pub async fn write_frame<W>(io: &mut W, payload: &[u8], config: &FrameConfig) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as u64;
    if len > config.max_frame_len as u64 {
        return Err(Error::FrameTooLarge {
            len,
            max: config.max_frame_len,
        });
    }
    io.write_all(&(len as u32).to_le_bytes()).await?;
    io.write_all(payload).await?;
    io.flush().await?;
    Ok(())
}
