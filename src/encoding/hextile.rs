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

//! VNC Hextile encoding decoder.
//!
//! The rectangle is partitioned into 16x16 tiles (edge tiles smaller). Each
//! tile carries a subencoding mask selecting raw pixels or a background
//! fill plus optional subrectangles. Background and foreground colors
//! persist across tiles within one rectangle: a tile that omits them reuses
//! the most recently specified values.

use log::warn;
use tokio::io::AsyncRead;

use super::RectOutcome;
use crate::error::Result;
use crate::framebuffer::Framebuffer;
use crate::protocol::{
    PixelFormat, Rectangle, HEXTILE_ANY_SUBRECTS, HEXTILE_BACKGROUND_SPECIFIED,
    HEXTILE_FOREGROUND_SPECIFIED, HEXTILE_RAW, HEXTILE_SUBRECTS_COLOURED,
};
use crate::wire;

const TILE_SIZE: u16 = 16;

/// Decodes one Hextile rectangle into the framebuffer.
///
/// Non-32-bit formats cannot be skipped structurally (tile payloads embed
/// pixel words), so they abandon the update and the engine re-synchronizes
/// with a full refresh.
pub(crate) async fn decode<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
) -> Result<RectOutcome> {
    if format.bits_per_pixel != 32 {
        warn!(
            "Hextile encoding: {} bits per pixel not supported",
            format.bits_per_pixel
        );
        return Ok(RectOutcome::Abandoned);
    }

    // Carried across tiles within this rectangle.
    let mut background: u32 = 0;
    let mut foreground: u32 = 0;

    let mut ty = 0u16;
    while ty < rect.height {
        let tile_h = TILE_SIZE.min(rect.height - ty);
        let mut tx = 0u16;
        while tx < rect.width {
            let tile_w = TILE_SIZE.min(rect.width - tx);
            let subencoding = wire::read_u8(stream).await?;

            if subencoding & HEXTILE_RAW != 0 {
                let mut payload = vec![0u8; usize::from(tile_w) * usize::from(tile_h) * 4];
                wire::read_exact_timed(stream, &mut payload).await?;
                let pixels: Vec<u32> = payload
                    .chunks_exact(4)
                    .map(|word| format.argb(format.pixel_word(word)))
                    .collect();
                framebuffer.blit(rect.x + tx, rect.y + ty, tile_w, tile_h, &pixels);
                tx += tile_w;
                continue;
            }

            if subencoding & HEXTILE_BACKGROUND_SPECIFIED != 0 {
                background = read_pixel_word(stream, format).await?;
            }
            framebuffer.fill_rect(
                rect.x + tx,
                rect.y + ty,
                tile_w,
                tile_h,
                format.argb(background),
            );

            if subencoding & HEXTILE_FOREGROUND_SPECIFIED != 0 {
                foreground = read_pixel_word(stream, format).await?;
            }

            if subencoding & HEXTILE_ANY_SUBRECTS != 0 {
                let count = wire::read_u8(stream).await?;
                for _ in 0..count {
                    let color = if subencoding & HEXTILE_SUBRECTS_COLOURED != 0 {
                        read_pixel_word(stream, format).await?
                    } else {
                        foreground
                    };
                    let xy = wire::read_u8(stream).await?;
                    let wh = wire::read_u8(stream).await?;
                    let sx = u16::from((xy >> 4) & 0x0F);
                    let sy = u16::from(xy & 0x0F);
                    let sw = u16::from(((wh >> 4) & 0x0F) + 1);
                    let sh = u16::from((wh & 0x0F) + 1);

                    // Clamp drawing to the tile's real dimensions.
                    let argb = format.argb(color);
                    for dy in 0..sh {
                        if sy + dy >= tile_h {
                            break;
                        }
                        for dx in 0..sw {
                            if sx + dx >= tile_w {
                                break;
                            }
                            framebuffer.put_pixel(
                                rect.x + tx + sx + dx,
                                rect.y + ty + sy + dy,
                                argb,
                            );
                        }
                    }
                }
            }
            tx += tile_w;
        }
        ty += tile_h;
    }

    Ok(RectOutcome::Applied)
}

async fn read_pixel_word<S: AsyncRead + Unpin>(stream: &mut S, format: &PixelFormat) -> Result<u32> {
    let mut word = [0u8; 4];
    wire::read_exact_timed(stream, &mut word).await?;
    Ok(format.pixel_word(&word))
}
