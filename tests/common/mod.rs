#![allow(dead_code)] // each test binary uses its own subset of helpers

//! Shared helpers for driving the client against a scripted server.
//!
//! Each test runs the engine and a deterministic byte script concurrently
//! over an in-memory duplex stream, then asserts on the client's reply
//! bytes, the emitted events, and the framebuffer contents.

use flate2::{Compress, Compression, FlushCompress};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;

use rustvncclient::VncEvent;

/// The 16-byte wire form of the usual 32-bit little-endian ARGB8888 format
/// (depth 24, shifts R=16 G=8 B=0).
pub const RGB32_LE: [u8; 16] = [32, 24, 0, 1, 0, 255, 0, 255, 0, 255, 16, 8, 0, 0, 0, 0];

/// Builds a ServerInit message for a nameless desktop.
pub fn server_init(width: u16, height: u16) -> Vec<u8> {
    let mut message = Vec::new();
    message.extend_from_slice(&width.to_be_bytes());
    message.extend_from_slice(&height.to_be_bytes());
    message.extend_from_slice(&RGB32_LE);
    message.extend_from_slice(&0u32.to_be_bytes());
    message
}

/// Builds a FramebufferUpdate header for `count` rectangles.
pub fn update_header(count: u16) -> Vec<u8> {
    let mut message = vec![0u8, 0];
    message.extend_from_slice(&count.to_be_bytes());
    message
}

/// Builds a rectangle header.
pub fn rect_header(x: u16, y: u16, width: u16, height: u16, encoding: i32) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(&x.to_be_bytes());
    header.extend_from_slice(&y.to_be_bytes());
    header.extend_from_slice(&width.to_be_bytes());
    header.extend_from_slice(&height.to_be_bytes());
    header.extend_from_slice(&encoding.to_be_bytes());
    header
}

/// Reads exactly `len` bytes from the scripted server's side.
pub async fn read_bytes(stream: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.expect("client bytes");
    buf
}

/// Runs the server side of the handshake for protocol 3.3 with security
/// type None, up to and including the client's initial setup burst.
/// Returns every byte the client wrote.
pub async fn handshake_v33(server: &mut DuplexStream, width: u16, height: u16) -> Vec<u8> {
    let mut client_bytes = Vec::new();

    server.write_all(b"RFB 003.003\n").await.unwrap();
    let reply = read_bytes(server, 12).await;
    assert_eq!(&reply, b"RFB 003.003\n");
    client_bytes.extend_from_slice(&reply);

    // 3.3: the server dictates the security type as a 32-bit word and the
    // client sends no security byte.
    server.write_all(&1u32.to_be_bytes()).await.unwrap();

    let client_init = read_bytes(server, 1).await;
    assert_eq!(client_init, [1], "shared flag");
    client_bytes.extend_from_slice(&client_init);

    server.write_all(&server_init(width, height)).await.unwrap();

    client_bytes.extend(expect_client_setup(server, width, height).await);
    client_bytes
}

/// Reads and validates the client's post-ServerInit burst: SetPixelFormat
/// echoing the server's format, SetEncodings with the preference list, and
/// a full non-incremental update request.
pub async fn expect_client_setup(server: &mut DuplexStream, width: u16, height: u16) -> Vec<u8> {
    let setup = read_bytes(server, 50).await;

    // SetPixelFormat: type, 3 bytes padding, the echoed 16-byte format.
    assert_eq!(setup[0], 0);
    assert_eq!(&setup[1..4], &[0, 0, 0]);
    assert_eq!(&setup[4..20], &RGB32_LE);

    // SetEncodings: Tight, ZRLE, Hextile, Raw in preference order.
    assert_eq!(&setup[20..24], &[2, 0, 0, 4]);
    assert_eq!(&setup[24..28], &7i32.to_be_bytes());
    assert_eq!(&setup[28..32], &16i32.to_be_bytes());
    assert_eq!(&setup[32..36], &5i32.to_be_bytes());
    assert_eq!(&setup[36..40], &0i32.to_be_bytes());

    // Initial FramebufferUpdateRequest: non-incremental, whole screen.
    assert_eq!(setup[40], 3);
    assert_eq!(setup[41], 0, "initial request must be non-incremental");
    assert_eq!(&setup[42..50], &full_screen_region(width, height)[..]);

    setup
}

/// The x, y, width, height fields of a whole-screen update request.
pub fn full_screen_region(width: u16, height: u16) -> Vec<u8> {
    let mut region = vec![0u8, 0, 0, 0];
    region.extend_from_slice(&width.to_be_bytes());
    region.extend_from_slice(&height.to_be_bytes());
    region
}

/// Reads the client's follow-up FramebufferUpdateRequest and returns its
/// incremental flag.
pub async fn expect_update_request(server: &mut DuplexStream, width: u16, height: u16) -> bool {
    let request = read_bytes(server, 10).await;
    assert_eq!(request[0], 3);
    assert_eq!(&request[2..10], &full_screen_region(width, height)[..]);
    request[1] != 0
}

/// Compresses one chunk through a persistent deflate stream with
/// `Z_SYNC_FLUSH`, the same way a VNC server feeds its per-connection
/// streams.
pub fn deflate_sync(compressor: &mut Compress, input: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; input.len() + 64];
    let before = compressor.total_out();
    compressor
        .compress(input, &mut out, FlushCompress::Sync)
        .expect("deflate");
    out.truncate((compressor.total_out() - before) as usize);
    out
}

/// Creates a fresh deflate stream for scripting compressed payloads.
pub fn new_deflater() -> Compress {
    Compress::new(Compression::default(), true)
}

/// Drains every event emitted so far.
pub fn drain_events(events: &mut UnboundedReceiver<VncEvent>) -> Vec<VncEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Returns the dirty regions among `events`, in emission order.
pub fn image_changes(events: &[VncEvent]) -> Vec<(u16, u16, u16, u16)> {
    events
        .iter()
        .filter_map(|event| match event {
            VncEvent::ImageChanged {
                x,
                y,
                width,
                height,
            } => Some((*x, *y, *width, *height)),
            _ => None,
        })
        .collect()
}
