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

//! VNC Raw encoding decoder.
//!
//! The simplest encoding: `width * height` pixel words in row-major order,
//! in the endianness declared by the negotiated pixel format.

use log::warn;
use tokio::io::AsyncRead;

use super::RectOutcome;
use crate::error::Result;
use crate::framebuffer::Framebuffer;
use crate::protocol::{PixelFormat, Rectangle};
use crate::wire;

/// Decodes one Raw rectangle into the framebuffer.
///
/// Only 32-bit pixel words are decoded. Other depths have a known payload
/// size, so the bytes are skipped to keep the stream aligned and the
/// rectangle is discarded with a warning.
pub(crate) async fn decode<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
) -> Result<RectOutcome> {
    let pixel_count = usize::from(rect.width) * usize::from(rect.height);

    if format.bits_per_pixel != 32 {
        warn!(
            "Raw encoding: {} bits per pixel not supported, skipping rectangle",
            format.bits_per_pixel
        );
        wire::skip_bytes(stream, pixel_count * format.bytes_per_pixel()).await?;
        return Ok(RectOutcome::Discarded);
    }

    let mut payload = vec![0u8; pixel_count * 4];
    wire::read_exact_timed(stream, &mut payload).await?;

    let mut pixels = Vec::with_capacity(pixel_count);
    for word_bytes in payload.chunks_exact(4) {
        pixels.push(format.argb(format.pixel_word(word_bytes)));
    }
    framebuffer.blit(rect.x, rect.y, rect.width, rect.height, &pixels);

    Ok(RectOutcome::Applied)
}
