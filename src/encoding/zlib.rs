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

//! Persistent zlib inflate streams.
//!
//! Both Tight and ZRLE compress across rectangle boundaries: the server
//! keeps its deflate dictionaries alive for the whole connection, so the
//! client must keep the matching inflate state alive too. Resetting a
//! stream between rectangles corrupts every rectangle that follows.

use flate2::{Decompress, FlushDecompress};

use crate::error::{Result, VncError};

/// Manages the four persistent zlib decompression streams for Tight
/// encoding.
///
/// Per the Tight extension, the server may use up to 4 independent zlib
/// streams, selected per rectangle by the low bits of the compression
/// control byte. Each stream's dictionary persists across rectangles until
/// the control byte's reset mask clears it.
pub struct TightInflateStreams {
    /// Lazily initialized inflaters, one per stream id.
    streams: [Option<Decompress>; 4],
}

impl TightInflateStreams {
    /// Creates a pool with all streams uninitialized.
    pub fn new() -> Self {
        Self {
            streams: [None, None, None, None],
        }
    }

    /// Discards stream `id`'s history. The next rectangle using that id
    /// starts a fresh inflate.
    pub fn reset(&mut self, id: usize) {
        self.streams[id] = None;
    }

    /// Discards all four streams; used when the connection is detached.
    pub fn reset_all(&mut self) {
        self.streams = [None, None, None, None];
    }

    /// Inflates `input` through stream `id`, expecting exactly
    /// `expected_len` bytes of output.
    ///
    /// The stream is initialized on first use and keeps its dictionary
    /// afterwards. On error the slot is discarded, since a failed inflate
    /// leaves the dictionary unusable.
    pub fn inflate(&mut self, id: usize, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let stream = self.streams[id].get_or_insert_with(|| Decompress::new(true));
        match inflate_exact(stream, input, expected_len) {
            Ok(data) => Ok(data),
            Err(e) => {
                self.streams[id] = None;
                Err(e)
            }
        }
    }
}

impl Default for TightInflateStreams {
    fn default() -> Self {
        Self::new()
    }
}

/// Inflates `input` into exactly `expected_len` output bytes.
///
/// Uses `Z_SYNC_FLUSH` so the stream's dictionary survives for the next
/// rectangle. Short or stalled output is a decoder error.
pub(crate) fn inflate_exact(
    stream: &mut Decompress,
    input: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>> {
    let mut out = vec![0u8; expected_len];
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;

    while out_pos < expected_len {
        let before_in = stream.total_in();
        let before_out = stream.total_out();
        stream
            .decompress(&input[in_pos..], &mut out[out_pos..], FlushDecompress::Sync)
            .map_err(|e| VncError::Decoder(format!("zlib inflate failed: {e}")))?;
        let consumed = (stream.total_in() - before_in) as usize;
        let produced = (stream.total_out() - before_out) as usize;
        in_pos += consumed;
        out_pos += produced;

        if consumed == 0 && produced == 0 {
            return Err(VncError::Decoder(format!(
                "zlib stream stalled: {out_pos}/{expected_len} bytes inflated"
            )));
        }
    }
    Ok(out)
}

/// Inflates all of `input`, collecting however much output it produces.
///
/// ZRLE's tile stream has no declared inflated length, so output is grown
/// chunk by chunk until the input is consumed and drained.
pub(crate) fn inflate_all(stream: &mut Decompress, input: &[u8]) -> Result<Vec<u8>> {
    const CHUNK: usize = 32 * 1024;
    let mut out = Vec::new();
    let mut chunk = vec![0u8; CHUNK];
    let mut in_pos = 0usize;

    loop {
        let before_in = stream.total_in();
        let before_out = stream.total_out();
        stream
            .decompress(&input[in_pos..], &mut chunk, FlushDecompress::Sync)
            .map_err(|e| VncError::Decoder(format!("zlib inflate failed: {e}")))?;
        let consumed = (stream.total_in() - before_in) as usize;
        let produced = (stream.total_out() - before_out) as usize;
        in_pos += consumed;
        out.extend_from_slice(&chunk[..produced]);

        if in_pos >= input.len() {
            // Drain output the last call could not fit.
            if produced == chunk.len() {
                continue;
            }
            return Ok(out);
        }
        if consumed == 0 && produced == 0 {
            return Err(VncError::Decoder(
                "zlib stream stalled with input remaining".into(),
            ));
        }
    }
}
