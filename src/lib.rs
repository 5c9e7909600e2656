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

//! # rustvncclient
//!
//! A pure Rust implementation of a VNC (Virtual Network Computing) client
//! protocol engine.
//!
//! This library implements the client side of the RFB (Remote Framebuffer)
//! protocol specified in RFC 6143, plus the Tight extension. It negotiates
//! protocol version and security over any reliable byte stream, maintains a
//! pixel framebuffer mirror of the remote display, decodes incremental
//! rectangle updates, and forwards keyboard and pointer events back to the
//! server.
//!
//! ## Features
//!
//! - **Protocol versions**: RFB 3.3, 3.7, and 3.8 handshakes
//! - **4 encoding types**: Raw, Hextile, ZRLE, Tight (including the JPEG
//!   mode)
//! - **Persistent compression state**: the four Tight zlib streams and the
//!   connection-lifetime ZRLE stream survive across rectangles, as the
//!   protocol requires
//! - **Transport agnostic**: drives any `AsyncRead + AsyncWrite` stream;
//!   the engine never opens connections itself
//! - **Async I/O**: built on Tokio with a single-task cooperative engine
//! - **Memory safe**: pure Rust with no unsafe code
//!
//! ## Quick Start
//!
//! ```no_run
//! use rustvncclient::{VncClient, VncEvent};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stream = TcpStream::connect("127.0.0.1:5900").await?;
//!
//!     let (mut client, mut events) = VncClient::new();
//!
//!     // React to engine events elsewhere in the application.
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             if let VncEvent::ImageChanged { x, y, width, height } = event {
//!                 println!("dirty region {width}x{height} at ({x}, {y})");
//!             }
//!         }
//!     });
//!
//!     // Drive the protocol until the server disconnects or the handle
//!     // detaches. Input is queued through `handle.key` / `handle.pointer`.
//!     client.attach(&mut stream).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Your Application              │
//! │                                         │
//! │  • Render framebuffer snapshots         │
//! │  • Forward key / pointer input          │
//! │  • React to engine events               │
//! └────────┬───────────────────▲────────────┘
//!          │ input, snapshots  │ events
//!          ▼                   │
//! ┌─────────────────────────────────────────┐
//! │          VncClient (engine)             │
//! │                                         │
//! │  • Handshake state machine              │
//! │  • Update loop and decoder dispatch     │
//! │  • Input event encoding                 │
//! └────────┬───────────────────▲────────────┘
//!          │ decoded pixels    │ server bytes
//!          ▼                   │
//! ┌──────────────────┐  ┌──────────────────┐
//! │   Framebuffer    │  │ Borrowed stream  │
//! │  (ARGB mirror)   │  │ (any transport)  │
//! └──────────────────┘  └──────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod framebuffer;
pub mod keysym;
pub mod protocol;

// Internal modules
mod client;
pub mod encoding;
mod wire;

// Re-exports
pub use client::{HandshakeState, VncClient, VncHandle};
pub use error::{Result, VncError};
pub use events::VncEvent;
pub use framebuffer::{Framebuffer, FramebufferImage};
pub use keysym::Key;
pub use protocol::{PixelFormat, ProtocolVersion, SecurityType};

/// Default VNC port.
pub const DEFAULT_PORT: u16 = 5900;
