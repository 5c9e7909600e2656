// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire-level read primitives.
//!
//! All multi-byte integers on the RFB wire are big-endian unless the
//! negotiated pixel format says otherwise for pixel words. Any transport
//! read may return short; once the engine has committed to a record it
//! waits for the remaining bytes with a bounded timeout.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout, Duration};

use crate::error::{Result, VncError};

/// Bounded wait applied to reads inside a committed record or rectangle.
///
/// A decoder read that stalls past this aborts the current rectangle and
/// the engine requests a full refresh.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads exactly `buf.len()` bytes, waiting as long as necessary.
///
/// Used during the handshake, which has no explicit timeout.
pub(crate) async fn read_exact<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).await?;
    Ok(())
}

/// Reads exactly `buf.len()` bytes with the bounded [`READ_TIMEOUT`].
pub(crate) async fn read_exact_timed<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut [u8],
) -> Result<()> {
    match timeout(READ_TIMEOUT, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(VncError::Io(e)),
        Err(_) => Err(VncError::Timeout),
    }
}

/// Reads a single byte with the bounded timeout.
pub(crate) async fn read_u8<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact_timed(stream, &mut buf).await?;
    Ok(buf[0])
}

/// Reads a big-endian u16 with the bounded timeout.
pub(crate) async fn read_u16_be<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact_timed(stream, &mut buf).await?;
    Ok(u16::from_be_bytes(buf))
}

/// Reads a big-endian u32 with the bounded timeout.
pub(crate) async fn read_u32_be<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact_timed(stream, &mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Waits for the next server message type byte.
///
/// Returns `Ok(None)` on a clean end-of-stream. This is the engine's idle
/// suspension point and is safe to race against the input queue in a
/// `select!`: a single-byte read either completes or consumes nothing.
pub(crate) async fn read_message_byte<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(buf[0]))
}

/// Reads and discards exactly `len` bytes, keeping the stream aligned when
/// a rectangle payload is skipped rather than decoded.
pub(crate) async fn skip_bytes<S: AsyncRead + Unpin>(stream: &mut S, len: usize) -> Result<()> {
    let mut remaining = len;
    let mut chunk = [0u8; 4096];
    while remaining > 0 {
        let take = remaining.min(chunk.len());
        read_exact_timed(stream, &mut chunk[..take]).await?;
        remaining -= take;
    }
    Ok(())
}
