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

//! VNC framebuffer decoding implementations.
//!
//! This module provides the receive-side decoders for the rectangle
//! encodings the client negotiates, writing decoded pixels into the
//! framebuffer.
//!
//! # Supported Encodings
//!
//! - **Raw**: Uncompressed pixel data. Simple but bandwidth-intensive.
//! - **Hextile**: 16x16 tiles with background/foreground state carried
//!   across tiles.
//! - **ZRLE**: 64x64 tiles inside a zlib stream that is cumulative across
//!   all ZRLE rectangles of the connection.
//! - **Tight**: four persistent zlib streams plus fill and JPEG modes.
//!
//! # Architecture
//!
//! Each decoder is a free function over the engine's mutable state; there is
//! no shared trait. Decoders never run concurrently, and all their reads go
//! through the bounded-timeout wire helpers.

pub mod hextile;
pub mod raw;
pub mod tight;
pub mod zlib;
pub mod zrle;

pub use zlib::TightInflateStreams;

/// What became of one rectangle after its decoder ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RectOutcome {
    /// Pixels were written; the rectangle's region is dirty.
    Applied,
    /// The payload was consumed but not applied (unsupported depth or
    /// sub-encoding, failed inflate). The wire is still aligned; the engine
    /// requests a full refresh.
    Discarded,
    /// Stream alignment was lost mid-rectangle. The engine requests a full
    /// refresh and abandons the rest of the update message.
    Abandoned,
}
