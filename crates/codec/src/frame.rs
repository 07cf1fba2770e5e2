//! Length-prefixed framing for protocol streams.
//!
//! Frames are sent as:
//! ```text
//! +---------------------------+-----------------+
//! | length (unsigned varint)  | payload         |
//! +---------------------------+-----------------+
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{CodecError, CodecResult};
use crate::wire::put_varint;

/// Maximum frame payload size (4 MiB).
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// A byte stream carrying length-prefixed frames in both directions.
pub struct FramedStream<S> {
    inner: S,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Write one frame and flush.
    pub async fn write_frame(&mut self, payload: &[u8]) -> CodecResult<()> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(payload.len() + 5);
        put_varint(&mut buf, payload.len() as u64);
        buf.extend_from_slice(payload);

        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;
        trace!(len = payload.len(), "wrote frame");
        Ok(())
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// frames. A close in the middle of a frame is [`CodecError::Truncated`].
    pub async fn read_frame(&mut self) -> CodecResult<Option<Vec<u8>>> {
        let len = match self.read_length().await? {
            Some(len) => len,
            None => return Ok(None),
        };

        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut payload = vec![0u8; len];
        match self.inner.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(CodecError::Truncated("frame payload"))
            }
            Err(e) => return Err(e.into()),
        }
        trace!(len, "read frame");
        Ok(Some(payload))
    }

    /// Shut down the write half so the peer observes end of stream.
    pub async fn close(&mut self) -> CodecResult<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    async fn read_length(&mut self) -> CodecResult<Option<usize>> {
        let mut value = 0u64;
        for (i, shift) in (0..64).step_by(7).enumerate() {
            let byte = match self.inner.read_u8().await {
                Ok(byte) => byte,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return if i == 0 {
                        Ok(None)
                    } else {
                        Err(CodecError::Truncated("frame length"))
                    };
                }
                Err(e) => return Err(e.into()),
            };
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(Some(value as usize));
            }
        }
        Err(CodecError::VarintOverflow)
    }
}
