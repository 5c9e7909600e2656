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

//! Error types for the VNC client.

use thiserror::Error;

/// Errors produced by the VNC client protocol engine.
#[derive(Error, Debug)]
pub enum VncError {
    /// An I/O error on the underlying transport, including the peer
    /// closing the connection mid-record.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server violated the RFB protocol (unknown version string,
    /// invalid message type, out-of-bounds rectangle). Fatal: the engine
    /// stops consuming bytes.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Security negotiation failed: the server offered no usable security
    /// type, or reported a non-zero SecurityResult.
    #[error("security failure: {0}")]
    SecurityFailure(String),

    /// A rectangle payload could not be decoded (zlib or JPEG failure,
    /// truncated encoded data, unsupported sub-encoding). Usually recovered
    /// locally by requesting a full framebuffer refresh.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// The negotiated pixel format is not supported by a decoder.
    #[error("unsupported pixel format: {0} bits per pixel")]
    UnsupportedPixelFormat(u8),

    /// A transport read stalled beyond the bounded wait.
    #[error("read timed out")]
    Timeout,
}

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, VncError>;
