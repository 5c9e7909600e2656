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

//! VNC client connection handling and protocol implementation.
//!
//! This module drives a single VNC session over a borrowed transport,
//! handling:
//! - RFB protocol handshake and security negotiation
//! - The continuous framebuffer-update loop and decoder dispatch
//! - Keyboard and pointer event transmission
//! - Local recovery from decoder errors via full-refresh requests
//!
//! # Protocol Flow
//!
//! 1. **Handshake**: Protocol version exchange and security negotiation
//! 2. **Initialization**: ClientInit / ServerInit, framebuffer creation
//! 3. **Message Loop**: Decode framebuffer updates, forward input events
//!
//! The engine is single-task cooperative: one `attach` call multiplexes
//! server bytes against the host's input queue with `select!`. Decoders
//! never run concurrently and no callback holds a lock.

use bytes::BytesMut;
use flate2::Decompress;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::encoding::{self, RectOutcome, TightInflateStreams};
use crate::error::{Result, VncError};
use crate::events::VncEvent;
use crate::framebuffer::{Framebuffer, FramebufferImage};
use crate::keysym::{resolve_keysym, Key};
use crate::protocol::{
    ClientMessage, PixelFormat, ProtocolVersion, Rectangle, SecurityType, ServerInit,
    ENCODING_HEXTILE, ENCODING_RAW, ENCODING_TIGHT, ENCODING_ZRLE, SECURITY_RESULT_OK,
    SERVER_MSG_BELL, SERVER_MSG_FRAMEBUFFER_UPDATE, SERVER_MSG_SERVER_CUT_TEXT,
};
use crate::wire;

/// Encodings advertised to the server, most preferred first.
const PREFERRED_ENCODINGS: [i32; 4] = [
    ENCODING_TIGHT,
    ENCODING_ZRLE,
    ENCODING_HEXTILE,
    ENCODING_RAW,
];

/// Limit on server-supplied string lengths (desktop name, failure reasons,
/// cut text) to prevent memory exhaustion from corrupt length fields.
const MAX_TEXT_LEN: u32 = 10 * 1024 * 1024;

/// Progression of the RFB handshake.
///
/// `Ready` and `Failed` are terminal: `Ready` carries normal traffic,
/// `Failed` means the engine stopped consuming bytes after an unrecoverable
/// protocol or security error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the server's 12-byte protocol version string.
    AwaitingVersion,
    /// Waiting for the security type (3.3) or security type list (3.7+).
    AwaitingSecurity,
    /// Waiting for the 4-byte SecurityResult (3.8 only).
    AwaitingSecurityResult,
    /// Waiting for the ServerInit message.
    AwaitingServerInit,
    /// Handshake complete; framebuffer updates flow.
    Ready,
    /// Unrecoverable failure; no further bytes are consumed.
    Failed,
}

/// Host input requests queued onto the engine's executor.
enum InputRequest {
    Key { key: Key, down: bool, text: String },
    Pointer { x: u16, y: u16, button_mask: u8 },
    Detach,
}

/// A cloneable handle for feeding input to a [`VncClient`] and reading the
/// framebuffer, usable from outside the engine's task.
#[derive(Clone)]
pub struct VncHandle {
    input_tx: mpsc::UnboundedSender<InputRequest>,
    framebuffer: Framebuffer,
}

impl VncHandle {
    /// Queues a key press or release.
    ///
    /// Named keys translate through the static keysym table; for unmapped
    /// keys the first Unicode scalar of `text` is sent. Events with neither
    /// are dropped.
    pub fn key(&self, key: Key, down: bool, text: &str) {
        let _ = self.input_tx.send(InputRequest::Key {
            key,
            down,
            text: text.to_owned(),
        });
    }

    /// Queues a pointer event. Coordinates are in framebuffer space;
    /// `button_mask` bit 0 is left, bit 1 middle, bit 2 right.
    pub fn pointer(&self, x: u16, y: u16, button_mask: u8) {
        let _ = self.input_tx.send(InputRequest::Pointer { x, y, button_mask });
    }

    /// Asks the engine to detach from the transport at the next read
    /// boundary.
    pub fn detach(&self) {
        let _ = self.input_tx.send(InputRequest::Detach);
    }

    /// Returns an owned snapshot of the current framebuffer contents.
    pub fn snapshot(&self) -> FramebufferImage {
        self.framebuffer.snapshot()
    }
}

/// The VNC client protocol engine.
///
/// Owns the framebuffer mirror, the negotiated pixel format, and the
/// persistent zlib decode streams. The transport is borrowed for the
/// duration of one [`attach`](Self::attach) call and never owned.
pub struct VncClient {
    /// The pixel mirror of the remote display.
    framebuffer: Framebuffer,
    /// The session pixel format; decoders read every pixel word with it.
    pixel_format: PixelFormat,
    /// Negotiated protocol version, set exactly once per attach.
    protocol_version: ProtocolVersion,
    /// Negotiated security type, set exactly once per attach.
    security_type: SecurityType,
    /// Handshake progression for the current connection.
    state: HandshakeState,
    /// Desktop name reported by ServerInit.
    desktop_name: String,
    /// The four persistent Tight inflate streams.
    tight_streams: TightInflateStreams,
    /// The connection-lifetime ZRLE inflater, created on first use. The
    /// ZRLE zlib stream is cumulative across rectangles and must never be
    /// reinitialized mid-connection.
    zrle_inflater: Option<Decompress>,
    /// Event channel to the host application.
    event_tx: mpsc::UnboundedSender<VncEvent>,
    /// Kept so `input_rx` never reports closed and handles can be created
    /// after construction.
    input_tx: mpsc::UnboundedSender<InputRequest>,
    /// Host input queue drained by the message loop.
    input_rx: mpsc::UnboundedReceiver<InputRequest>,
}

impl VncClient {
    /// Creates a new client engine and the event stream the host consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<VncEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let client = Self {
            framebuffer: Framebuffer::new(),
            pixel_format: PixelFormat::rgb32(),
            protocol_version: ProtocolVersion::Unknown,
            security_type: SecurityType::Unknown,
            state: HandshakeState::AwaitingVersion,
            desktop_name: String::new(),
            tight_streams: TightInflateStreams::new(),
            zrle_inflater: None,
            event_tx,
            input_tx,
            input_rx,
        };
        (client, event_rx)
    }

    /// Returns a handle for queuing input and taking snapshots.
    pub fn handle(&self) -> VncHandle {
        VncHandle {
            input_tx: self.input_tx.clone(),
            framebuffer: self.framebuffer.clone(),
        }
    }

    /// Returns a shared handle to the framebuffer mirror.
    pub fn framebuffer(&self) -> Framebuffer {
        self.framebuffer.clone()
    }

    /// Returns an owned snapshot of the current framebuffer contents.
    pub fn snapshot(&self) -> FramebufferImage {
        self.framebuffer.snapshot()
    }

    /// Returns the protocol version negotiated on the current connection.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Returns the security type negotiated on the current connection.
    pub fn security_type(&self) -> SecurityType {
        self.security_type
    }

    /// Returns the current handshake state.
    pub fn handshake_state(&self) -> HandshakeState {
        self.state
    }

    /// Returns the desktop name from ServerInit, empty before then.
    pub fn desktop_name(&self) -> &str {
        &self.desktop_name
    }

    /// Binds the transport and drives the session until the peer closes,
    /// the handle requests a detach, or an unrecoverable error occurs.
    ///
    /// Per-connection state is reset on entry, `ConnectionState(true)` is
    /// emitted, and `ConnectionState(false)` is emitted on every exit path.
    /// The zlib contexts are freed when the transport is released.
    ///
    /// # Errors
    ///
    /// Returns transport I/O errors as [`VncError::Io`]; protocol and
    /// security failures mark the state [`HandshakeState::Failed`] and are
    /// returned as their respective variants.
    pub async fn attach<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.reset_connection_state();
        self.emit(VncEvent::ConnectionState(true));

        let result = self.session(transport).await;

        self.tight_streams.reset_all();
        self.zrle_inflater = None;
        if let Err(VncError::ProtocolViolation(_) | VncError::SecurityFailure(_)) = &result {
            self.state = HandshakeState::Failed;
        }
        self.emit(VncEvent::ConnectionState(false));
        result
    }

    fn reset_connection_state(&mut self) {
        self.state = HandshakeState::AwaitingVersion;
        self.protocol_version = ProtocolVersion::Unknown;
        self.security_type = SecurityType::Unknown;
        self.desktop_name.clear();
        self.tight_streams.reset_all();
        self.zrle_inflater = None;
        // Drop input queued while no transport was attached.
        while self.input_rx.try_recv().is_ok() {}
    }

    async fn session<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.handshake(transport).await?;
        self.message_loop(transport).await
    }

    /// Runs the version, security, and init stages.
    ///
    /// The server speaks first. The client echoes the server's announced
    /// version and then runs that version's security sub-flow; unknown
    /// version strings fail the connection.
    async fn handshake<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Protocol version
        let mut version_buf = [0u8; 12];
        wire::read_exact(transport, &mut version_buf).await?;
        let Some(version) = ProtocolVersion::from_bytes(&version_buf) else {
            return Err(VncError::ProtocolViolation(format!(
                "unknown protocol version {:?}",
                String::from_utf8_lossy(&version_buf)
            )));
        };
        self.protocol_version = version;
        self.emit(VncEvent::ProtocolVersionChanged(version));
        info!("Server protocol version: {version:?}");
        transport.write_all(version.as_bytes()).await?;

        // Security negotiation
        self.state = HandshakeState::AwaitingSecurity;
        match version {
            ProtocolVersion::V3_3 | ProtocolVersion::Unknown => {
                let mut buf = [0u8; 4];
                wire::read_exact(transport, &mut buf).await?;
                let value = u32::from_be_bytes(buf);
                if value == 0 {
                    return Err(self.security_refused(transport).await);
                }
                let security = SecurityType::from_wire(value);
                self.set_security_type(security);
                if security != SecurityType::None {
                    return Err(VncError::SecurityFailure(format!(
                        "server requires unsupported security type {security:?}"
                    )));
                }
                // 3.3: the server dictates the type; no client byte is sent.
            }
            ProtocolVersion::V3_7 | ProtocolVersion::V3_8 => {
                let mut count_buf = [0u8; 1];
                wire::read_exact(transport, &mut count_buf).await?;
                if count_buf[0] == 0 {
                    return Err(self.security_refused(transport).await);
                }
                let mut types = vec![0u8; usize::from(count_buf[0])];
                wire::read_exact(transport, &mut types).await?;

                if !types.contains(&1) {
                    self.set_security_type(SecurityType::Invalid);
                    return Err(VncError::SecurityFailure(format!(
                        "server offered no supported security type: {types:?}"
                    )));
                }
                self.set_security_type(SecurityType::None);
                transport.write_all(&[1]).await?;

                if version == ProtocolVersion::V3_8 {
                    self.state = HandshakeState::AwaitingSecurityResult;
                    let mut result_buf = [0u8; 4];
                    wire::read_exact(transport, &mut result_buf).await?;
                    if u32::from_be_bytes(result_buf) != SECURITY_RESULT_OK {
                        return Err(self.security_refused(transport).await);
                    }
                }
            }
        }

        // ClientInit: request a shared session.
        transport.write_all(&[1]).await?;
        self.state = HandshakeState::AwaitingServerInit;
        self.server_init(transport).await
    }

    /// Reads ServerInit, creates the framebuffer, and sends the client's
    /// initial configuration.
    async fn server_init<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut head = [0u8; 20];
        wire::read_exact(transport, &mut head).await?;
        let mut format_bytes = [0u8; 16];
        format_bytes.copy_from_slice(&head[4..20]);
        let format = PixelFormat::from_bytes(&format_bytes);
        if !format.is_valid() {
            return Err(VncError::ProtocolViolation(format!(
                "ServerInit carries invalid pixel format ({} bpp)",
                format.bits_per_pixel
            )));
        }

        let mut name_len_buf = [0u8; 4];
        wire::read_exact(transport, &mut name_len_buf).await?;
        let name_len = u32::from_be_bytes(name_len_buf);
        if name_len > MAX_TEXT_LEN {
            return Err(VncError::ProtocolViolation(format!(
                "implausible desktop name length {name_len}"
            )));
        }
        let mut name_bytes = vec![0u8; name_len as usize];
        wire::read_exact(transport, &mut name_bytes).await?;

        let init = ServerInit {
            framebuffer_width: u16::from_be_bytes([head[0], head[1]]),
            framebuffer_height: u16::from_be_bytes([head[2], head[3]]),
            pixel_format: format,
            name: String::from_utf8_lossy(&name_bytes).into_owned(),
        };
        let (width, height) = (init.framebuffer_width, init.framebuffer_height);

        self.pixel_format = init.pixel_format;
        self.desktop_name = init.name;
        self.framebuffer.resize(width, height);
        self.emit(VncEvent::FramebufferSize { width, height });
        info!(
            "Connected to '{}' ({width}x{height}, {} bpp)",
            self.desktop_name, self.pixel_format.bits_per_pixel
        );
        self.state = HandshakeState::Ready;

        // Echo the server's pixel format, advertise encodings, and request
        // the whole screen once.
        let mut buf = BytesMut::new();
        ClientMessage::SetPixelFormat(&self.pixel_format).write_to(&mut buf);
        ClientMessage::SetEncodings(&PREFERRED_ENCODINGS).write_to(&mut buf);
        ClientMessage::FramebufferUpdateRequest {
            incremental: false,
            x: 0,
            y: 0,
            width,
            height,
        }
        .write_to(&mut buf);
        transport.write_all(&buf).await?;
        Ok(())
    }

    /// The steady-state loop: server messages multiplexed against the host
    /// input queue.
    async fn message_loop<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                request = self.input_rx.recv() => {
                    if let Some(request) = request {
                        if send_input(transport, request).await? {
                            info!("Detaching from VNC server");
                            return Ok(());
                        }
                    }
                }
                message = wire::read_message_byte(transport) => {
                    match message? {
                        None => {
                            info!("Server closed the connection");
                            return Ok(());
                        }
                        Some(SERVER_MSG_FRAMEBUFFER_UPDATE) => {
                            self.framebuffer_update(transport).await?;
                        }
                        Some(SERVER_MSG_BELL) => {
                            debug!("Server bell");
                            self.emit(VncEvent::Bell);
                        }
                        Some(SERVER_MSG_SERVER_CUT_TEXT) => {
                            self.server_cut_text(transport).await?;
                        }
                        Some(other) => {
                            error!("Unknown server message type {other}");
                            return Err(VncError::ProtocolViolation(format!(
                                "unknown server message type {other}"
                            )));
                        }
                    }
                }
            }
        }
    }

    /// Parses one FramebufferUpdate message and dispatches its rectangles
    /// to the decoders.
    ///
    /// Rectangles are applied in wire order and `ImageChanged` is emitted in
    /// that same order. The follow-up update request is incremental unless a
    /// rectangle had to be discarded, and a rectangle that loses stream
    /// alignment abandons the rest of the message after requesting a full
    /// refresh.
    async fn framebuffer_update<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _padding = wire::read_u8(transport).await.map_err(header_error)?;
        let count = wire::read_u16_be(transport).await.map_err(header_error)?;
        let fb_width = self.framebuffer.width();
        let fb_height = self.framebuffer.height();

        let mut needs_refresh = false;
        for index in 0..count {
            let mut header = [0u8; 12];
            wire::read_exact_timed(transport, &mut header)
                .await
                .map_err(header_error)?;
            let rect = Rectangle::from_bytes(&header);
            if !rect.fits_in(fb_width, fb_height) {
                return Err(VncError::ProtocolViolation(format!(
                    "rectangle {}x{} at ({}, {}) exceeds framebuffer {fb_width}x{fb_height}",
                    rect.width, rect.height, rect.x, rect.y
                )));
            }

            let outcome = match rect.encoding {
                ENCODING_RAW => {
                    encoding::raw::decode(transport, &self.framebuffer, &self.pixel_format, &rect)
                        .await
                }
                ENCODING_HEXTILE => {
                    encoding::hextile::decode(
                        transport,
                        &self.framebuffer,
                        &self.pixel_format,
                        &rect,
                    )
                    .await
                }
                ENCODING_ZRLE => {
                    encoding::zrle::decode(
                        transport,
                        &self.framebuffer,
                        &self.pixel_format,
                        &rect,
                        &mut self.zrle_inflater,
                    )
                    .await
                }
                ENCODING_TIGHT => {
                    encoding::tight::decode(
                        transport,
                        &self.framebuffer,
                        &self.pixel_format,
                        &rect,
                        &mut self.tight_streams,
                    )
                    .await
                }
                other => {
                    // The payload length is encoding-defined, so skipping is
                    // impossible; fall back to the refresh re-sync policy.
                    warn!("Unsupported encoding {other} in rectangle {index}");
                    Ok(RectOutcome::Abandoned)
                }
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(VncError::Timeout) => {
                    warn!("Rectangle {index} stalled, requesting full refresh");
                    RectOutcome::Abandoned
                }
                Err(e) => return Err(e),
            };

            match outcome {
                RectOutcome::Applied => {
                    self.emit(VncEvent::ImageChanged {
                        x: rect.x,
                        y: rect.y,
                        width: rect.width,
                        height: rect.height,
                    });
                }
                RectOutcome::Discarded => needs_refresh = true,
                RectOutcome::Abandoned => {
                    self.request_update(transport, false).await?;
                    return Ok(());
                }
            }
        }

        self.request_update(transport, !needs_refresh).await
    }

    /// Sends a FramebufferUpdateRequest covering the whole framebuffer.
    async fn request_update<S>(&self, transport: &mut S, incremental: bool) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        ClientMessage::FramebufferUpdateRequest {
            incremental,
            x: 0,
            y: 0,
            width: self.framebuffer.width(),
            height: self.framebuffer.height(),
        }
        .write_to(&mut buf);
        transport.write_all(&buf).await?;
        Ok(())
    }

    /// Parses and discards a ServerCutText message; clipboard transfer is
    /// out of scope but the framing must be consumed.
    async fn server_cut_text<S>(&mut self, transport: &mut S) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let mut padding = [0u8; 3];
        wire::read_exact_timed(transport, &mut padding)
            .await
            .map_err(header_error)?;
        let length = wire::read_u32_be(transport).await.map_err(header_error)?;
        if length > MAX_TEXT_LEN {
            return Err(VncError::ProtocolViolation(format!(
                "implausible cut text length {length}"
            )));
        }
        wire::skip_bytes(transport, length as usize)
            .await
            .map_err(header_error)?;
        debug!("Discarded {length} byte server cut text");
        Ok(())
    }

    /// Reads the failure reason the server sends when security negotiation
    /// is refused, surfaces it, and produces the session error.
    async fn security_refused<S>(&mut self, transport: &mut S) -> VncError
    where
        S: AsyncRead + Unpin,
    {
        self.set_security_type(SecurityType::Invalid);
        let reason = match self.read_reason(transport).await {
            Ok(reason) => reason,
            Err(e) => return e,
        };
        warn!("Security negotiation failed: {reason}");
        self.emit(VncEvent::SecurityFailure {
            reason: reason.clone(),
        });
        VncError::SecurityFailure(reason)
    }

    /// Reads a length-prefixed reason string.
    async fn read_reason<S>(&self, transport: &mut S) -> Result<String>
    where
        S: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        wire::read_exact(transport, &mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_TEXT_LEN {
            return Err(VncError::ProtocolViolation(format!(
                "implausible reason length {len}"
            )));
        }
        let mut reason = vec![0u8; len as usize];
        wire::read_exact(transport, &mut reason).await?;
        Ok(String::from_utf8_lossy(&reason).into_owned())
    }

    fn set_security_type(&mut self, security: SecurityType) {
        self.security_type = security;
        self.emit(VncEvent::SecurityTypeChanged(security));
    }

    fn emit(&self, event: VncEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Encodes and writes one queued input request. Returns `true` when the
/// request was a detach.
async fn send_input<S>(transport: &mut S, request: InputRequest) -> Result<bool>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    match request {
        InputRequest::Key { key, down, text } => {
            let Some(keysym) = resolve_keysym(key, &text) else {
                debug!("Dropping key event without keysym or text");
                return Ok(false);
            };
            ClientMessage::KeyEvent { down, keysym }.write_to(&mut buf);
        }
        InputRequest::Pointer { x, y, button_mask } => {
            ClientMessage::PointerEvent { button_mask, x, y }.write_to(&mut buf);
        }
        InputRequest::Detach => return Ok(true),
    }
    transport.write_all(&buf).await?;
    Ok(false)
}

/// A stalled or truncated read inside a message header is a protocol
/// violation, unlike a stall inside a rectangle payload.
fn header_error(e: VncError) -> VncError {
    match e {
        VncError::Timeout => {
            VncError::ProtocolViolation("truncated record: read timed out".into())
        }
        other => other,
    }
}
