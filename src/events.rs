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

//! Client events that can be received by the application.

use crate::protocol::{ProtocolVersion, SecurityType};

/// Events emitted by the VNC client engine.
///
/// Events are delivered in processing order on the engine's task; handlers
/// must not block or re-enter the engine.
#[derive(Debug, Clone)]
pub enum VncEvent {
    /// The transport became usable (`true`) or was closed or detached
    /// (`false`).
    ConnectionState(bool),

    /// The protocol version was negotiated during the handshake.
    ProtocolVersionChanged(ProtocolVersion),

    /// The security type was negotiated after version selection.
    SecurityTypeChanged(SecurityType),

    /// The framebuffer was created or resized.
    FramebufferSize {
        /// New framebuffer width in pixels.
        width: u16,
        /// New framebuffer height in pixels.
        height: u16,
    },

    /// A region of the framebuffer was modified by a decoded rectangle.
    ///
    /// The region always lies inside the framebuffer bounds, and regions
    /// belonging to one framebuffer update are reported in the order their
    /// rectangles appeared on the wire.
    ImageChanged {
        /// X coordinate of the top-left corner.
        x: u16,
        /// Y coordinate of the top-left corner.
        y: u16,
        /// Width of the modified region.
        width: u16,
        /// Height of the modified region.
        height: u16,
    },

    /// The server rang the bell.
    Bell,

    /// Security negotiation failed; carries the server's reason string
    /// when one was supplied.
    SecurityFailure {
        /// Human-readable failure reason from the server (may be empty).
        reason: String,
    },
}
