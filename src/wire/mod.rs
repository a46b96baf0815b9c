//! Multipart framing over async byte streams.
//!
//! Both the topic relay and the request/reply exchanges speak the same
//! framing: a message is an ordered list of frames.
//!
//! ```text
//! ┌────────────┬────────────┬─────────┬────────────┬─────────┬───
//! │ frame count│ len (u32)  │ frame 0 │ len (u32)  │ frame 1 │ ...
//! │  (u32 BE)  │   BE       │  bytes  │   BE       │  bytes  │
//! └────────────┴────────────┴─────────┴────────────┴─────────┴───
//! ```
//!
//! Frames are opaque here. Nothing in this module decodes a payload.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// Largest number of frames in one message.
pub const MAX_FRAMES: usize = 16;

/// Result type for framing operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {len} bytes (max {max})", max = MAX_FRAME_LEN)]
    FrameTooLarge { len: usize },

    #[error("Too many frames: {count} (max {max})", max = MAX_FRAMES)]
    TooManyFrames { count: usize },

    #[error("Connection closed by peer")]
    Closed,
}

/// An ordered list of frames travelling as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    frames: Vec<Bytes>,
}

impl Multipart {
    /// Create a message from frames.
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Single-frame message.
    pub fn single(frame: impl Into<Bytes>) -> Self {
        Self {
            frames: vec![frame.into()],
        }
    }

    /// Two-frame `[topic, payload]` message.
    pub fn topic(topic: &str, payload: impl Into<Bytes>) -> Self {
        Self {
            frames: vec![Bytes::copy_from_slice(topic.as_bytes()), payload.into()],
        }
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total payload bytes across all frames.
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }
}

/// Read one multipart message.
///
/// Returns `WireError::Closed` when the peer closed the stream cleanly on a
/// message boundary.
pub async fn read_message<R>(reader: &mut R) -> Result<Multipart>
where
    R: AsyncRead + Unpin,
{
    let count = match read_u32(reader).await {
        Ok(n) => n as usize,
        Err(WireError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::Closed)
        }
        Err(e) => return Err(e),
    };
    if count > MAX_FRAMES {
        return Err(WireError::TooManyFrames { count });
    }

    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let len = read_u32(reader).await? as usize;
        if len > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge { len });
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        frames.push(Bytes::from(buf));
    }

    Ok(Multipart { frames })
}

/// Write one multipart message and flush it.
pub async fn write_message<W>(writer: &mut W, message: &Multipart) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if message.len() > MAX_FRAMES {
        return Err(WireError::TooManyFrames {
            count: message.len(),
        });
    }

    // Serialize into one buffer so a message is written with a single call
    let mut buf = Vec::with_capacity(4 + message.len() * 4 + message.byte_len());
    buf.extend_from_slice(&(message.len() as u32).to_be_bytes());
    for frame in message.frames() {
        if frame.len() > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge { len: frame.len() });
        }
        buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        buf.extend_from_slice(frame);
    }

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_u32<R>(reader: &mut R) -> Result<u32>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    Ok(u32::from_be_bytes(len_buf))
}
