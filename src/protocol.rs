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

//! VNC Remote Framebuffer (RFB) protocol constants and structures.
//!
//! This module provides the fundamental building blocks for VNC protocol
//! communication from the client side: protocol version negotiation, message
//! types, security types, encodings, and pixel format definitions. It
//! implements the RFB protocol as specified in RFC 6143 plus the Tight
//! extension.
//!
//! # Protocol Overview
//!
//! A VNC RFB session passes through the following phases:
//! 1. **Protocol Version** - Server and client agree on protocol version
//! 2. **Security Handshake** - Security type selection and result
//! 3. **Initialization** - ClientInit / ServerInit exchange
//! 4. **Normal Operation** - Framebuffer updates in, input events out

use bytes::{BufMut, BytesMut};

// Client-to-Server Message Types

/// Message type: Client requests to change the pixel format.
///
/// This client echoes the server's format unchanged, pinning the format the
/// decoders will use for the rest of the session.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: Client specifies supported encodings.
///
/// The client sends a list of encoding types it supports, ordered by
/// preference. The server will use the first mutually supported encoding.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: Client requests a framebuffer update.
///
/// The client can request either an incremental update (changes only) or
/// a full refresh of a specified rectangular region.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: Client sends a keyboard event.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: Client sends a pointer (mouse) event.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
///
/// Contains one or more rectangles of pixel data representing screen
/// changes. This is the only message the client strictly requires.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

/// Message type: Server sets colour map entries.
///
/// Used for indexed color modes. Not used by this true-color client.
#[allow(dead_code)]
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;

/// Message type: Server sends a bell (beep) notification.
pub const SERVER_MSG_BELL: u8 = 2;

/// Message type: Server sends cut text (clipboard data).
///
/// Parsed for framing and discarded; clipboard transfer is out of scope.
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

// Encoding Types

/// Encoding type: Raw (uncompressed pixel data).
pub const ENCODING_RAW: i32 = 0;

/// Encoding type: Copy Rectangle. Recognized but not decoded.
#[allow(dead_code)]
pub const ENCODING_COPYRECT: i32 = 1;

/// Encoding type: Rise-and-Run-length Encoding. Recognized but not decoded.
#[allow(dead_code)]
pub const ENCODING_RRE: i32 = 2;

/// Encoding type: Hextile (16x16 tiles with per-tile subencodings).
pub const ENCODING_HEXTILE: i32 = 5;

/// Encoding type: Tight (zlib-streamed compression with a JPEG mode).
pub const ENCODING_TIGHT: i32 = 7;

/// Encoding type: ZRLE (Zlib Run-Length Encoding, 64x64 tiles).
pub const ENCODING_ZRLE: i32 = 16;

// Hextile subencoding mask bits

/// Hextile: the tile is raw pixel data.
pub const HEXTILE_RAW: u8 = 1;

/// Hextile: a new background pixel word follows.
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 2;

/// Hextile: a new foreground pixel word follows.
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 4;

/// Hextile: a 1-byte subrectangle count follows.
pub const HEXTILE_ANY_SUBRECTS: u8 = 8;

/// Hextile: each subrectangle is preceded by its own pixel word.
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 16;

// Tight compression control

/// Tight subencoding selector (low nibble): solid fill.
pub const TIGHT_FILL: u8 = 0x08;

/// Tight subencoding selector (low nibble): JPEG payload.
pub const TIGHT_JPEG: u8 = 0x09;

/// Tight basic compression: mask of the zlib stream id bits.
pub const TIGHT_STREAM_MASK: u8 = 0x03;

/// Tight basic compression: an explicit filter byte follows.
pub const TIGHT_EXPLICIT_FILTER: u8 = 0x04;

/// Tight filter id: copy (pixels pass through unfiltered).
pub const TIGHT_FILTER_COPY: u8 = 0;

/// Tight filter id: palette. Not implemented; triggers a refresh.
pub const TIGHT_FILTER_PALETTE: u8 = 1;

/// Tight filter id: gradient. Not implemented; triggers a refresh.
pub const TIGHT_FILTER_GRADIENT: u8 = 2;

/// Basic Tight payloads whose decoded size is below this many bytes are
/// transmitted uncompressed.
pub const TIGHT_MIN_TO_COMPRESS: usize = 96;

// Security Results

/// Security result: negotiation successful.
pub const SECURITY_RESULT_OK: u32 = 0;

/// The RFB protocol version negotiated during the handshake.
///
/// Set exactly once per connection attempt; decoders never run while the
/// version is still [`Unknown`](ProtocolVersion::Unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// No version negotiated yet.
    Unknown,
    /// RFB 3.3: the server dictates the security type as a 32-bit word.
    V3_3,
    /// RFB 3.7: the server offers a security type list; no SecurityResult
    /// for type None.
    V3_7,
    /// RFB 3.8: like 3.7 but every security type ends with a SecurityResult.
    V3_8,
}

impl ProtocolVersion {
    /// Parses the 12-byte version string sent first by the server.
    ///
    /// Returns `None` for unrecognized strings; the connection then fails.
    pub fn from_bytes(bytes: &[u8; 12]) -> Option<Self> {
        match bytes {
            b"RFB 003.003\n" => Some(Self::V3_3),
            b"RFB 003.007\n" => Some(Self::V3_7),
            b"RFB 003.008\n" => Some(Self::V3_8),
            _ => None,
        }
    }

    /// Returns the 12-byte wire form of this version.
    pub fn as_bytes(self) -> &'static [u8; 12] {
        match self {
            Self::V3_3 | Self::Unknown => b"RFB 003.003\n",
            Self::V3_7 => b"RFB 003.007\n",
            Self::V3_8 => b"RFB 003.008\n",
        }
    }
}

/// The security type negotiated after version selection.
///
/// Only [`None`](SecurityType::None) proceeds to initialization in this
/// client; everything else fails the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    /// Not negotiated yet.
    Unknown,
    /// The server reported failure (type 0) or offered nothing usable.
    Invalid,
    /// No authentication.
    None,
    /// Classic DES challenge-response VNC authentication.
    VncAuth,
    /// RSA-AES authentication.
    RA2,
    /// RSA-AES unencrypted-channel authentication.
    RA2ne,
    /// Tight security extension.
    Tight,
    /// UltraVNC security extension.
    Ultra,
    /// TLS security.
    Tls,
    /// VeNCrypt security.
    VeNCrypt,
    /// SASL (GTK-VNC) security.
    Sasl,
    /// MD5 hash authentication.
    Md5,
    /// Colin Dean xvp security.
    ColinDeanXvp,
}

impl SecurityType {
    /// Maps a security type number from the wire.
    ///
    /// Unassigned numbers map to [`Invalid`](SecurityType::Invalid).
    pub fn from_wire(value: u32) -> Self {
        match value {
            0 => Self::Invalid,
            1 => Self::None,
            2 => Self::VncAuth,
            5 => Self::RA2,
            6 => Self::RA2ne,
            16 => Self::Tight,
            17 => Self::Ultra,
            18 => Self::Tls,
            19 => Self::VeNCrypt,
            20 => Self::Sasl,
            21 => Self::Md5,
            22 => Self::ColinDeanXvp,
            _ => Self::Invalid,
        }
    }

    /// Returns the wire number of this security type, or `None` for the
    /// pseudo-values `Unknown` and `Invalid`.
    pub fn to_wire(self) -> Option<u8> {
        match self {
            Self::Unknown | Self::Invalid => None,
            Self::None => Some(1),
            Self::VncAuth => Some(2),
            Self::RA2 => Some(5),
            Self::RA2ne => Some(6),
            Self::Tight => Some(16),
            Self::Ultra => Some(17),
            Self::Tls => Some(18),
            Self::VeNCrypt => Some(19),
            Self::Sasl => Some(20),
            Self::Md5 => Some(21),
            Self::ColinDeanXvp => Some(22),
        }
    }
}

/// The 16-byte RFB pixel format descriptor.
///
/// Established by ServerInit and echoed back unchanged by this client's
/// `SetPixelFormat`, so all decoders read pixel words with these masks and
/// shifts for the whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per pixel word on the wire (8, 16, 24 or 32).
    pub bits_per_pixel: u8,
    /// Color depth in significant bits.
    pub depth: u8,
    /// 1 if pixel words are big-endian, 0 if little-endian.
    pub big_endian_flag: u8,
    /// 1 if true color, 0 if color-mapped.
    pub true_colour_flag: u8,
    /// Maximum red channel value.
    pub red_max: u16,
    /// Maximum green channel value.
    pub green_max: u16,
    /// Maximum blue channel value.
    pub blue_max: u16,
    /// Right shift to align the red channel.
    pub red_shift: u8,
    /// Right shift to align the green channel.
    pub green_shift: u8,
    /// Right shift to align the blue channel.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The usual 32-bit little-endian true-color format (depth 24,
    /// shifts R=16 G=8 B=0).
    pub fn rgb32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Parses the 16-byte wire record.
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: bytes[0],
            depth: bytes[1],
            big_endian_flag: bytes[2],
            true_colour_flag: bytes[3],
            red_max: u16::from_be_bytes([bytes[4], bytes[5]]),
            green_max: u16::from_be_bytes([bytes[6], bytes[7]]),
            blue_max: u16::from_be_bytes([bytes[8], bytes[9]]),
            red_shift: bytes[10],
            green_shift: bytes[11],
            blue_shift: bytes[12],
            // bytes[13..16] are padding
        }
    }

    /// Serializes the 16-byte wire record.
    ///
    /// The format follows the RFB protocol specification:
    /// bits-per-pixel, depth, big-endian flag, true-colour flag, the three
    /// 2-byte channel maxima, the three channel shifts, and 3 padding bytes.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Whether the format is structurally usable at all.
    pub fn is_valid(&self) -> bool {
        matches!(self.bits_per_pixel, 8 | 16 | 24 | 32)
    }

    /// Bytes per pixel word on the wire.
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel) / 8
    }

    /// Assembles a pixel word from its wire bytes, honoring the format's
    /// endianness. `bytes` must hold exactly one pixel word.
    pub fn pixel_word(&self, bytes: &[u8]) -> u32 {
        let mut word: u32 = 0;
        if self.big_endian_flag != 0 {
            for &b in bytes {
                word = (word << 8) | u32::from(b);
            }
        } else {
            for &b in bytes.iter().rev() {
                word = (word << 8) | u32::from(b);
            }
        }
        word
    }

    /// Extracts the channels of a pixel word and packs them into opaque
    /// ARGB.
    ///
    /// The masked channel values are written verbatim into the 8-bit display
    /// channels; formats with channel maxima below 255 therefore render
    /// proportionally dark.
    pub fn argb(&self, word: u32) -> u32 {
        let r = (word >> self.red_shift) & u32::from(self.red_max);
        let g = (word >> self.green_shift) & u32::from(self.green_max);
        let b = (word >> self.blue_shift) & u32::from(self.blue_max);
        0xFF00_0000 | (r << 16) | (g << 8) | b
    }
}

/// Represents a rectangle header in a framebuffer update message.
///
/// Each framebuffer update can contain multiple rectangles, each with its
/// own encoding type. The rectangle header specifies the position,
/// dimensions, and encoding of the pixel data that follows.
#[derive(Debug, Clone, Copy)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type used for this rectangle's pixel data.
    pub encoding: i32,
}

impl Rectangle {
    /// Parses the 12-byte rectangle header: x, y, width, height (2 bytes
    /// each, big-endian) followed by the signed 32-bit encoding type.
    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        Self {
            x: u16::from_be_bytes([bytes[0], bytes[1]]),
            y: u16::from_be_bytes([bytes[2], bytes[3]]),
            width: u16::from_be_bytes([bytes[4], bytes[5]]),
            height: u16::from_be_bytes([bytes[6], bytes[7]]),
            encoding: i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    /// Whether the rectangle lies entirely inside a `width`x`height`
    /// framebuffer.
    pub fn fits_in(&self, width: u16, height: u16) -> bool {
        u32::from(self.x) + u32::from(self.width) <= u32::from(width)
            && u32::from(self.y) + u32::from(self.height) <= u32::from(height)
    }
}

/// Represents the `ServerInit` message received during initialization.
///
/// Sent by the server after security negotiation completes; provides the
/// framebuffer dimensions, the server's native pixel format, and the
/// desktop name.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// The width of the framebuffer in pixels.
    pub framebuffer_width: u16,
    /// The height of the framebuffer in pixels.
    pub framebuffer_height: u16,
    /// The pixel format used by the framebuffer.
    pub pixel_format: PixelFormat,
    /// The name of the desktop.
    pub name: String,
}

/// Represents all message types this client sends to the server.
///
/// Encapsulates the client messages defined in the RFB protocol so the
/// engine's write path can assemble them in a type-safe manner.
#[derive(Debug)]
pub enum ClientMessage<'a> {
    /// Requests a specific pixel format for framebuffer updates.
    SetPixelFormat(&'a PixelFormat),

    /// Specifies the list of encodings the client supports, in preference
    /// order.
    SetEncodings(&'a [i32]),

    /// Requests a framebuffer update for a specific region.
    FramebufferUpdateRequest {
        /// If true, only send changes since the last update; if false,
        /// resend the full region.
        incremental: bool,
        /// X coordinate of the requested region.
        x: u16,
        /// Y coordinate of the requested region.
        y: u16,
        /// Width of the requested region.
        width: u16,
        /// Height of the requested region.
        height: u16,
    },

    /// A keyboard key event.
    KeyEvent {
        /// True if the key is pressed, false if released.
        down: bool,
        /// The X Window System keysym value of the key.
        keysym: u32,
    },

    /// A pointer (mouse) event.
    PointerEvent {
        /// Bitmask of pressed buttons (bit 0 left, bit 1 middle, bit 2
        /// right).
        button_mask: u8,
        /// X coordinate in framebuffer space.
        x: u16,
        /// Y coordinate in framebuffer space.
        y: u16,
    },
}

impl ClientMessage<'_> {
    /// Serializes the message into a byte buffer.
    ///
    /// All layouts follow RFC 6143: multi-byte integers are big-endian and
    /// padding bytes are zero.
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer to write the serialized message into.
    #[allow(clippy::cast_possible_truncation)] // Encoding count is bounded by the preference list length
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::SetPixelFormat(format) => {
                buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
                buf.put_bytes(0, 3); // padding
                format.write_to(buf);
            }
            Self::SetEncodings(encodings) => {
                buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
                buf.put_u8(0); // padding
                buf.put_u16(encodings.len() as u16);
                for &encoding in *encodings {
                    buf.put_i32(encoding);
                }
            }
            Self::FramebufferUpdateRequest {
                incremental,
                x,
                y,
                width,
                height,
            } => {
                buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
                buf.put_u8(u8::from(*incremental));
                buf.put_u16(*x);
                buf.put_u16(*y);
                buf.put_u16(*width);
                buf.put_u16(*height);
            }
            Self::KeyEvent { down, keysym } => {
                buf.put_u8(CLIENT_MSG_KEY_EVENT);
                buf.put_u8(u8::from(*down));
                buf.put_bytes(0, 2); // padding
                buf.put_u32(*keysym);
            }
            Self::PointerEvent { button_mask, x, y } => {
                buf.put_u8(CLIENT_MSG_POINTER_EVENT);
                buf.put_u8(*button_mask);
                buf.put_u16(*x);
                buf.put_u16(*y);
            }
        }
    }
}
