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

//! VNC ZRLE encoding decoder.
//!
//! Each rectangle carries a 4-byte big-endian length followed by that many
//! bytes of zlib data. The zlib stream is cumulative across every ZRLE
//! rectangle of the connection; the inflater must never be reinitialized
//! between rectangles. The inflated data is a sequence of 64x64 tiles
//! (edges smaller), each led by a subencoding byte.
//!
//! CPIXELs are transmitted as full 4-byte pixel words in this
//! implementation.

use flate2::Decompress;
use log::warn;
use tokio::io::AsyncRead;

use super::zlib::inflate_all;
use super::RectOutcome;
use crate::error::Result;
use crate::framebuffer::Framebuffer;
use crate::protocol::{PixelFormat, Rectangle};
use crate::wire;

const TILE_SIZE: u16 = 64;

/// Upper bound on a single rectangle's compressed payload; anything larger
/// is treated as a corrupt length field.
const MAX_COMPRESSED_LEN: u32 = 64 * 1024 * 1024;

/// Decodes one ZRLE rectangle into the framebuffer.
///
/// `inflater` is the connection-lifetime zlib context; it is created on the
/// first ZRLE rectangle and carried across all subsequent ones.
pub(crate) async fn decode<S: AsyncRead + Unpin>(
    stream: &mut S,
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
    inflater: &mut Option<Decompress>,
) -> Result<RectOutcome> {
    let compressed_len = wire::read_u32_be(stream).await?;
    if compressed_len == 0 {
        return Ok(RectOutcome::Applied);
    }
    if compressed_len > MAX_COMPRESSED_LEN {
        warn!("ZRLE: implausible compressed length {compressed_len}");
        return Ok(RectOutcome::Abandoned);
    }

    let mut compressed = vec![0u8; compressed_len as usize];
    wire::read_exact_timed(stream, &mut compressed).await?;

    // The wire is aligned from here on: any parse failure below discards
    // only this rectangle.
    let inflater = inflater.get_or_insert_with(|| Decompress::new(true));
    let data = match inflate_all(inflater, &compressed) {
        Ok(data) => data,
        Err(e) => {
            warn!("ZRLE: {e}");
            return Ok(RectOutcome::Discarded);
        }
    };

    match parse_tiles(&data, framebuffer, format, rect) {
        Ok(()) => Ok(RectOutcome::Applied),
        Err(reason) => {
            warn!("ZRLE: {reason}");
            Ok(RectOutcome::Discarded)
        }
    }
}

/// Walks the inflated tile stream and paints each tile.
fn parse_tiles(
    data: &[u8],
    framebuffer: &Framebuffer,
    format: &PixelFormat,
    rect: &Rectangle,
) -> std::result::Result<(), String> {
    let mut cursor = Cursor { data, pos: 0 };

    let mut ty = 0u16;
    while ty < rect.height {
        let tile_h = TILE_SIZE.min(rect.height - ty);
        let mut tx = 0u16;
        while tx < rect.width {
            let tile_w = TILE_SIZE.min(rect.width - tx);
            let subencoding = cursor.u8().ok_or("truncated at tile subencoding")?;

            match subencoding {
                0 => {
                    // Raw tile.
                    let count = usize::from(tile_w) * usize::from(tile_h);
                    let words = cursor.take(count * 4).ok_or("truncated raw tile")?;
                    let pixels: Vec<u32> = words
                        .chunks_exact(4)
                        .map(|word| format.argb(format.pixel_word(word)))
                        .collect();
                    framebuffer.blit(rect.x + tx, rect.y + ty, tile_w, tile_h, &pixels);
                }
                1 => {
                    // Solid tile.
                    let word = cursor.take(4).ok_or("truncated solid tile")?;
                    let argb = format.argb(format.pixel_word(word));
                    framebuffer.fill_rect(rect.x + tx, rect.y + ty, tile_w, tile_h, argb);
                }
                2..=16 => {
                    // Packed palette; the subencoding byte is the palette
                    // size.
                    let palette_size = usize::from(subencoding);
                    let mut palette = Vec::with_capacity(palette_size);
                    for _ in 0..palette_size {
                        let word = cursor.take(4).ok_or("truncated palette")?;
                        palette.push(format.argb(format.pixel_word(word)));
                    }
                    let bits_per_index: u32 = match palette_size {
                        0..=2 => 1,
                        3..=4 => 2,
                        _ => 4,
                    };
                    let bytes_per_row =
                        (usize::from(tile_w) * bits_per_index as usize + 7) / 8;
                    let packed = cursor
                        .take(bytes_per_row * usize::from(tile_h))
                        .ok_or("truncated packed indices")?;

                    let mask = (1u8 << bits_per_index) - 1;
                    for row in 0..usize::from(tile_h) {
                        let row_bytes = &packed[row * bytes_per_row..(row + 1) * bytes_per_row];
                        let mut bit_offset: u32 = 0;
                        for col in 0..usize::from(tile_w) {
                            let byte = row_bytes[(bit_offset / 8) as usize];
                            let shift = 8 - bits_per_index - (bit_offset % 8);
                            let index = usize::from((byte >> shift) & mask);
                            bit_offset += bits_per_index;
                            if let Some(&argb) = palette.get(index) {
                                framebuffer.put_pixel(
                                    rect.x + tx + col as u16,
                                    rect.y + ty + row as u16,
                                    argb,
                                );
                            }
                        }
                    }
                }
                128 => return Err("plain RLE tiles not implemented".into()),
                130..=255 => {
                    return Err(format!(
                        "palette RLE tiles not implemented (palette size {})",
                        subencoding - 128
                    ))
                }
                _ => return Err(format!("reserved tile subencoding {subencoding}")),
            }
            tx += tile_w;
        }
        ty += tile_h;
    }
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }
}
