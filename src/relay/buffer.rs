use crate::error::RelayError;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK: usize = 8 * 1024;

/// Append-only stdout buffer with a hard size cap.
pub(crate) struct OutputBuffer {
    buf: BytesMut,
    limit: usize,
}

impl OutputBuffer {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit.min(CHUNK)),
            limit,
        }
    }

    /// Append a chunk, failing once the total would pass the cap.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<(), RelayError> {
        if self.buf.len() + chunk.len() > self.limit {
            return Err(RelayError::OutputTooLarge { limit: self.limit });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Read `reader` to EOF, appending chunks in arrival order.
pub(crate) async fn drain_into<R: AsyncRead + Unpin>(
    mut reader: R,
    out: &mut OutputBuffer,
) -> Result<(), RelayError> {
    let mut chunk = [0u8; CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        out.push(&chunk[..n])?;
    }
}
