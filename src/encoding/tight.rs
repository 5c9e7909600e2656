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

//! VNC Tight encoding decoder.
//!
//! Every Tight rectangle starts with a compression control byte. The high
//! nibble is a reset mask for the four persistent zlib streams (bit k
//! clears stream k); the low nibble selects the subencoding: fill, JPEG, or
//! basic zlib compression with a stream id and an optional filter byte.
//! Only the copy filter is implemented; palette and gradient filters
//! trigger the engine's refresh recovery.

use log::{debug, warn};
use tokio::io::AsyncRead;

use super::zlib::TightInflateStreams;
use super::RectOutcome;
use crate::error::Result;
use crate::framebuffer::Framebuffer;
use crate::protocol::{
    PixelFormat, Rectangle, TIGHT_EXPLICIT_FILTER, TIGHT_FILL, TIGHT_FILTER_COPY, TIGHT_JPEG,
    TIGHT_MIN_TO_COMPRESS, TIGHT_STREAM_MASK,
};
use crate::wire;

/// Upper bound on a JPEG or basic payload; anything larger is treated as a
/// corrupt length field.
const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Decodes one Tight rectangle into the framebuffer.
pub(crate) async fn decode<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
    streams: &mut TightInflateStreams,
) -> Result<RectOutcome> {
    let control = wire::read_u8(stream).await?;

    // High nibble: per-stream reset mask, applied before anything else.
    for id in 0..4 {
        if control & (0x10 << id) != 0 {
            streams.reset(id);
        }
    }

    let subencoding = control & 0x0F;
    match subencoding {
        TIGHT_FILL => decode_fill(stream, framebuffer, format, rect).await,
        TIGHT_JPEG => decode_jpeg(stream, framebuffer, rect).await,
        0x00..=0x07 => decode_basic(stream, framebuffer, format, rect, streams, control).await,
        _ => {
            warn!("Tight: unsupported subencoding {subencoding:#x}");
            Ok(RectOutcome::Abandoned)
        }
    }
}

/// Fill subencoding: a single pixel word covers the whole rectangle.
async fn decode_fill<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
) -> Result<RectOutcome> {
    let mut word = [0u8; 4];
    wire::read_exact_timed(stream, &mut word).await?;
    let argb = format.argb(format.pixel_word(&word));
    framebuffer.fill_rect(rect.x, rect.y, rect.width, rect.height, argb);
    Ok(RectOutcome::Applied)
}

/// JPEG subencoding: a compact length followed by that many JPEG bytes.
async fn decode_jpeg<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    rect: &Rectangle,
) -> Result<RectOutcome> {
    let length = read_compact_length(stream).await?;
    if length > MAX_PAYLOAD_LEN {
        warn!("Tight: implausible JPEG length {length}");
        return Ok(RectOutcome::Abandoned);
    }
    let mut payload = vec![0u8; length];
    wire::read_exact_timed(stream, &mut payload).await?;

    // The wire is aligned from here on; a decode failure discards only
    // this rectangle.
    let mut decoder = jpeg_decoder::Decoder::new(&payload[..]);
    let decoded = match decoder.decode() {
        Ok(data) => data,
        Err(e) => {
            warn!("Tight: JPEG decode failed: {e}");
            return Ok(RectOutcome::Discarded);
        }
    };
    let Some(info) = decoder.info() else {
        warn!("Tight: JPEG decoder reported no image info");
        return Ok(RectOutcome::Discarded);
    };

    let width = rect.width.min(info.width);
    let height = rect.height.min(info.height);
    let mut pixels = Vec::with_capacity(usize::from(width) * usize::from(height));
    match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => {
            for y in 0..usize::from(height) {
                for x in 0..usize::from(width) {
                    let luma = u32::from(decoded[y * usize::from(info.width) + x]);
                    pixels.push(0xFF00_0000 | (luma << 16) | (luma << 8) | luma);
                }
            }
        }
        jpeg_decoder::PixelFormat::RGB24 => {
            for y in 0..usize::from(height) {
                for x in 0..usize::from(width) {
                    let offset = (y * usize::from(info.width) + x) * 3;
                    let r = u32::from(decoded[offset]);
                    let g = u32::from(decoded[offset + 1]);
                    let b = u32::from(decoded[offset + 2]);
                    pixels.push(0xFF00_0000 | (r << 16) | (g << 8) | b);
                }
            }
        }
        other => {
            warn!("Tight: unsupported JPEG pixel format {other:?}");
            return Ok(RectOutcome::Discarded);
        }
    }
    framebuffer.blit(rect.x, rect.y, width, height, &pixels);
    Ok(RectOutcome::Applied)
}

/// Basic compression: optional filter byte, compact length, then either
/// raw or zlib-compressed pixel words through the selected stream.
async fn decode_basic<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
    streams: &mut TightInflateStreams,
    control: u8,
) -> Result<RectOutcome> {
    let stream_id = usize::from(control & TIGHT_STREAM_MASK);

    if control & TIGHT_EXPLICIT_FILTER != 0 {
        let filter = wire::read_u8(stream).await?;
        if filter != TIGHT_FILTER_COPY {
            // Palette filters carry their own header before the length, so
            // the payload cannot be skipped structurally.
            warn!("Tight: filter {filter} not implemented");
            return Ok(RectOutcome::Abandoned);
        }
    }

    let expected = usize::from(rect.width) * usize::from(rect.height) * format.bytes_per_pixel();
    let length = read_compact_length(stream).await?;
    if length > MAX_PAYLOAD_LEN {
        warn!("Tight: implausible basic payload length {length}");
        return Ok(RectOutcome::Abandoned);
    }
    let mut payload = vec![0u8; length];
    wire::read_exact_timed(stream, &mut payload).await?;

    if format.bits_per_pixel != 32 {
        warn!(
            "Tight: {} bits per pixel not supported, skipping rectangle",
            format.bits_per_pixel
        );
        return Ok(RectOutcome::Discarded);
    }

    let raw = if expected < TIGHT_MIN_TO_COMPRESS {
        // Small payloads are transmitted uncompressed.
        debug!("Tight: {length} byte payload below compression threshold");
        if length != expected {
            warn!("Tight: uncompressed payload length {length}, expected {expected}");
            return Ok(RectOutcome::Discarded);
        }
        payload
    } else {
        match streams.inflate(stream_id, &payload, expected) {
            Ok(data) => data,
            Err(e) => {
                warn!("Tight: stream {stream_id}: {e}");
                return Ok(RectOutcome::Discarded);
            }
        }
    };

    let pixels: Vec<u32> = raw
        .chunks_exact(4)
        .map(|word| format.argb(format.pixel_word(word)))
        .collect();
    framebuffer.blit(rect.x, rect.y, rect.width, rect.height, &pixels);
    Ok(RectOutcome::Applied)
}

/// Reads the Tight compact length: 1 to 3 bytes, 7 payload bits each,
/// least-significant group first.
pub(crate) async fn read_compact_length<S: AsyncRead + Unpin>(stream: &mut S) -> Result<usize> {
    let b0 = wire::read_u8(stream).await?;
    if b0 & 0x80 == 0 {
        return Ok(usize::from(b0));
    }
    let b1 = wire::read_u8(stream).await?;
    if b1 & 0x80 == 0 {
        return Ok(usize::from(b0 & 0x7F) | usize::from(b1) << 7);
    }
    let b2 = wire::read_u8(stream).await?;
    Ok(usize::from(b0 & 0x7F) | usize::from(b1 & 0x7F) << 7 | usize::from(b2) << 14)
}
