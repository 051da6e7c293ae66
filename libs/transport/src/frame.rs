//! Length-prefixed bincode framing over Unix sockets.
//!
//! Wire format: u32 little-endian payload length, then the bincode encoding
//! of [`ChannelMessage`]. The length is checked against a maximum before any
//! allocation so a corrupt or hostile peer cannot balloon memory.

use crate::{Result, TransportError};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::trace;
use types::ChannelMessage;

/// Default frame ceiling. Envelopes are small; anything near this size is a
/// protocol violation, not a legitimate message.
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &ChannelMessage,
    max_frame: usize,
) -> Result<()> {
    let payload = bincode::serialize(msg)?;
    if payload.len() > max_frame {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: max_frame,
        });
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    trace!(bytes = payload.len(), kind = msg.kind(), "frame sent");
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame: usize,
) -> Result<ChannelMessage> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await.map_err(eof_as_closed)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max_frame {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_frame,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    let msg = bincode::deserialize(&payload)?;
    trace!(bytes = len, "frame received");
    Ok(msg)
}

fn eof_as_closed(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::ConnectionClosed
    } else {
        TransportError::Io(e)
    }
}

/// A connected, framed Unix socket speaking [`ChannelMessage`].
pub struct FramedConnection {
    stream: UnixStream,
    max_frame: usize,
}

impl FramedConnection {
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &ChannelMessage) -> Result<()> {
        write_frame(&mut self.stream, msg, self.max_frame).await
    }

    pub async fn recv(&mut self) -> Result<ChannelMessage> {
        read_frame(&mut self.stream, self.max_frame).await
    }

    /// Split into independently owned read/write halves; the hub reads for
    /// disconnect detection while broadcasting on the write half.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (
            FrameReader {
                half: read,
                max_frame: self.max_frame,
            },
            FrameWriter {
                half: write,
                max_frame: self.max_frame,
            },
        )
    }
}

/// Read half of a split framed connection.
pub struct FrameReader {
    half: OwnedReadHalf,
    max_frame: usize,
}

impl FrameReader {
    pub async fn recv(&mut self) -> Result<ChannelMessage> {
        read_frame(&mut self.half, self.max_frame).await
    }
}

/// Write half of a split framed connection.
pub struct FrameWriter {
    half: OwnedWriteHalf,
    max_frame: usize,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &ChannelMessage) -> Result<()> {
        write_frame(&mut self.half, msg, self.max_frame).await
    }
}
