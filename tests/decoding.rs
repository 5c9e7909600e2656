//! Framebuffer update scenarios: one test per encoding plus the recovery
//! and ordering guarantees.

mod common;

use common::*;
use rustvncclient::{VncClient, VncEvent};
use tokio::io::{duplex, AsyncWriteExt};

fn compact_length(mut len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        if len < 0x80 {
            out.push(len as u8);
            return out;
        }
        out.push((len & 0x7F) as u8 | 0x80);
        len >>= 7;
    }
}

/// A v3.3 handshake followed by one Raw rectangle of 16 identical red
/// pixels.
#[tokio::test]
async fn raw_solid_red() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 4, 4).await;

        let mut update = update_header(1);
        update.extend(rect_header(0, 0, 4, 4, 0));
        for _ in 0..16 {
            update.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]); // 0x00FF0000 LE
        }
        server.write_all(&update).await.unwrap();

        assert!(expect_update_request(&mut server, 4, 4).await);
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let snapshot = client.snapshot();
    assert_eq!(snapshot.size(), (4, 4));
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(snapshot.pixel(x, y), Some(0xFFFF_0000), "pixel ({x}, {y})");
        }
    }
    assert_eq!(image_changes(&drain_events(&mut events)), vec![(0, 0, 4, 4)]);
}

/// One Hextile rectangle covering a 32x32 framebuffer, exercising raw
/// tiles, background/foreground persistence, and both subrect flavors.
#[tokio::test]
async fn hextile_tile_state_machine() {
    const RED: [u8; 4] = [0x00, 0x00, 0xFF, 0x00];
    const BLUE: [u8; 4] = [0xFF, 0x00, 0x00, 0x00];
    const GREEN: [u8; 4] = [0x00, 0xFF, 0x00, 0x00];
    const YELLOW: [u8; 4] = [0x00, 0xFF, 0xFF, 0x00];

    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 32, 32).await;

        let mut update = update_header(1);
        update.extend(rect_header(0, 0, 32, 32, 5));

        // Tile (0,0): raw, solid red.
        update.push(1);
        for _ in 0..256 {
            update.extend_from_slice(&RED);
        }
        // Tile (16,0): background blue + one coloured 4x4 green subrect at
        // (2,3).
        update.push(2 | 8 | 16);
        update.extend_from_slice(&BLUE);
        update.push(1);
        update.extend_from_slice(&GREEN);
        update.push((2 << 4) | 3);
        update.push((3 << 4) | 3);
        // Tile (0,16): no bits set; inherits the blue background.
        update.push(0);
        // Tile (16,16): foreground yellow + two uncoloured subrects.
        update.push(4 | 8);
        update.extend_from_slice(&YELLOW);
        update.push(2);
        update.push(0x00);
        update.push((1 << 4) | 1); // 2x2 at (0,0)
        update.push((8 << 4) | 8);
        update.push((3 << 4) | 3); // 4x4 at (8,8)

        server.write_all(&update).await.unwrap();
        assert!(expect_update_request(&mut server, 32, 32).await);
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let snapshot = client.snapshot();
    // Tile 1: raw red.
    assert_eq!(snapshot.pixel(0, 0), Some(0xFFFF_0000));
    assert_eq!(snapshot.pixel(15, 15), Some(0xFFFF_0000));
    // Tile 2: blue background, green subrect spanning (18..22, 3..7).
    assert_eq!(snapshot.pixel(16, 0), Some(0xFF00_00FF));
    assert_eq!(snapshot.pixel(18, 3), Some(0xFF00_FF00));
    assert_eq!(snapshot.pixel(21, 6), Some(0xFF00_FF00));
    assert_eq!(snapshot.pixel(22, 7), Some(0xFF00_00FF));
    // Tile 3: inherited blue background.
    assert_eq!(snapshot.pixel(0, 16), Some(0xFF00_00FF));
    assert_eq!(snapshot.pixel(15, 31), Some(0xFF00_00FF));
    // Tile 4: blue background with yellow subrects.
    assert_eq!(snapshot.pixel(16, 16), Some(0xFFFF_FF00));
    assert_eq!(snapshot.pixel(17, 17), Some(0xFFFF_FF00));
    assert_eq!(snapshot.pixel(24, 24), Some(0xFFFF_FF00));
    assert_eq!(snapshot.pixel(27, 27), Some(0xFFFF_FF00));
    assert_eq!(snapshot.pixel(20, 20), Some(0xFF00_00FF));

    assert_eq!(image_changes(&drain_events(&mut events)), vec![(0, 0, 32, 32)]);
}

/// Two ZRLE rectangles in separate update messages sharing one
/// continuous zlib stream; the second only decodes if the inflater context
/// persisted.
#[tokio::test]
async fn zrle_dictionary_continuity() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    // One 8x8 raw tile whose pixel words enumerate their position.
    let mut tile = vec![0u8];
    for position in 0..64u32 {
        tile.extend_from_slice(&position.to_le_bytes());
    }

    let script = async {
        handshake_v33(&mut server, 16, 8).await;

        let mut deflater = new_deflater();
        for (index, x) in [0u16, 8].into_iter().enumerate() {
            let compressed = deflate_sync(&mut deflater, &tile);
            let mut update = update_header(1);
            update.extend(rect_header(x, 0, 8, 8, 16));
            update.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
            update.extend_from_slice(&compressed);
            server.write_all(&update).await.unwrap();
            assert!(
                expect_update_request(&mut server, 16, 8).await,
                "request after update {index}"
            );
        }
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let snapshot = client.snapshot();
    for y in 0..8u16 {
        for x in 0..8u16 {
            let expected = 0xFF00_0000 | (u32::from(y) * 8 + u32::from(x));
            assert_eq!(snapshot.pixel(x, y), Some(expected), "left ({x}, {y})");
            assert_eq!(snapshot.pixel(x + 8, y), Some(expected), "right ({x}, {y})");
        }
    }
    assert_eq!(
        image_changes(&drain_events(&mut events)),
        vec![(0, 0, 8, 8), (8, 0, 8, 8)]
    );
}

/// A minimal baseline JPEG: 8x8 grayscale, flat quantization, DC 0 and the
/// first two AC coefficients at 80, giving a diagonal gradient.
const JPEG_GRADIENT_8X8: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0xFF, 0xC0, 0x00, 0x0B,
    0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00, 0xFF, 0xC4, 0x00, 0x1B, 0x00, 0x00,
    0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0xFF, 0xC4, 0x00, 0x15, 0x10, 0x00, 0x02,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x07, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0x0D, 0x06, 0x81, 0xFF,
    0xD9,
];

/// The gradient's analytic pixel values (inverse DCT of the coefficients
/// above).
const JPEG_GRADIENT_PIXELS: [[u8; 8]; 8] = [
    [156, 154, 150, 145, 139, 134, 130, 128],
    [154, 152, 148, 143, 137, 132, 128, 126],
    [150, 148, 144, 139, 133, 128, 124, 122],
    [145, 143, 139, 134, 128, 123, 119, 117],
    [139, 137, 133, 128, 122, 117, 113, 111],
    [134, 132, 128, 123, 117, 112, 108, 106],
    [130, 128, 124, 119, 113, 108, 104, 102],
    [128, 126, 122, 117, 111, 106, 102, 100],
];

/// One Tight JPEG rectangle; decoded pixels must match the gradient
/// within the usual quantization tolerance.
#[tokio::test]
async fn tight_jpeg_gradient() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 8, 8).await;

        let mut update = update_header(1);
        update.extend(rect_header(0, 0, 8, 8, 7));
        update.push(0x09); // JPEG subencoding
        update.extend(compact_length(JPEG_GRADIENT_8X8.len()));
        update.extend_from_slice(JPEG_GRADIENT_8X8);
        server.write_all(&update).await.unwrap();

        assert!(expect_update_request(&mut server, 8, 8).await);
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let snapshot = client.snapshot();
    for y in 0..8u16 {
        for x in 0..8u16 {
            let expected = i32::from(JPEG_GRADIENT_PIXELS[usize::from(y)][usize::from(x)]);
            let argb = snapshot.pixel(x, y).unwrap();
            for channel in [(argb >> 16) & 0xFF, (argb >> 8) & 0xFF, argb & 0xFF] {
                assert!(
                    (channel as i32 - expected).abs() <= 4,
                    "pixel ({x}, {y}): channel {channel} vs expected {expected}"
                );
            }
        }
    }
    assert_eq!(image_changes(&drain_events(&mut events)), vec![(0, 0, 8, 8)]);
}

/// Tight basic compression across two updates on one persistent stream.
#[tokio::test]
async fn tight_basic_stream_persistence() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, _events) = VncClient::new();

    // 8x8 at 32bpp = 256 bytes, above the uncompressed threshold.
    let raw: Vec<u8> = (0..64u32).flat_map(|p| (p * 3).to_le_bytes()).collect();

    let script = async {
        handshake_v33(&mut server, 8, 8).await;

        let mut deflater = new_deflater();
        for _ in 0..2 {
            let compressed = deflate_sync(&mut deflater, &raw);
            let mut update = update_header(1);
            update.extend(rect_header(0, 0, 8, 8, 7));
            update.push(0x00); // basic, stream 0, implicit copy filter
            update.extend(compact_length(compressed.len()));
            update.extend_from_slice(&compressed);
            server.write_all(&update).await.unwrap();
            assert!(expect_update_request(&mut server, 8, 8).await);
        }
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let snapshot = client.snapshot();
    assert_eq!(snapshot.pixel(1, 0), Some(0xFF00_0003));
    assert_eq!(snapshot.pixel(7, 7), Some(0xFF00_00BD));
}

/// An unsupported Tight filter must not crash or corrupt the
/// framebuffer, and the client re-synchronizes with a full refresh request.
#[tokio::test]
async fn tight_unsupported_filter_recovery() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 4, 4).await;

        let mut update = update_header(1);
        update.extend(rect_header(0, 0, 4, 4, 7));
        update.push(0x04); // basic with explicit filter byte
        update.push(1); // palette filter, unsupported
        server.write_all(&update).await.unwrap();

        assert!(
            !expect_update_request(&mut server, 4, 4).await,
            "recovery request must be non-incremental"
        );
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let snapshot = client.snapshot();
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(snapshot.pixel(x, y), Some(0xFFFF_FFFF));
        }
    }
    assert!(image_changes(&drain_events(&mut events)).is_empty());
}

/// An unknown encoding tag cannot be skipped; the client requests a full
/// refresh and abandons the rest of the update.
#[tokio::test]
async fn unknown_encoding_triggers_refresh() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 4, 4).await;

        let mut update = update_header(2);
        update.extend(rect_header(0, 0, 4, 4, 99));
        server.write_all(&update).await.unwrap();

        assert!(!expect_update_request(&mut server, 4, 4).await);
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();
    assert!(image_changes(&drain_events(&mut events)).is_empty());
}

/// A discarded rectangle (unimplemented ZRLE sub-encoding) keeps the wire
/// aligned and turns the follow-up request into a full refresh.
#[tokio::test]
async fn discarded_rectangle_requests_refresh() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, _events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 4, 4).await;

        let mut deflater = new_deflater();
        let compressed = deflate_sync(&mut deflater, &[128]); // plain RLE tile
        let mut update = update_header(1);
        update.extend(rect_header(0, 0, 4, 4, 16));
        update.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        update.extend_from_slice(&compressed);
        server.write_all(&update).await.unwrap();

        assert!(
            !expect_update_request(&mut server, 4, 4).await,
            "request after a discarded rectangle must be non-incremental"
        );
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();
}

/// Dirty regions are reported in wire order within one update.
#[tokio::test]
async fn image_changes_follow_wire_order() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 4, 2).await;

        let mut update = update_header(3);
        for x in [2u16, 0, 1] {
            update.extend(rect_header(x, 0, 1, 1, 0));
            update.extend_from_slice(&[0, 0, 0, 0]);
        }
        server.write_all(&update).await.unwrap();
        assert!(expect_update_request(&mut server, 4, 2).await);
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    assert_eq!(
        image_changes(&drain_events(&mut events)),
        vec![(2, 0, 1, 1), (0, 0, 1, 1), (1, 0, 1, 1)]
    );
}

/// Bell and ServerCutText have known grammars: logged, skipped, and the
/// stream stays aligned for the next update.
#[tokio::test]
async fn bell_and_cut_text_are_skipped() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, mut events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 1, 1).await;

        server.write_all(&[2]).await.unwrap(); // Bell
        let mut cut_text = vec![3u8, 0, 0, 0];
        cut_text.extend_from_slice(&5u32.to_be_bytes());
        cut_text.extend_from_slice(b"hello");
        server.write_all(&cut_text).await.unwrap();

        let mut update = update_header(1);
        update.extend(rect_header(0, 0, 1, 1, 0));
        update.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0x00]);
        server.write_all(&update).await.unwrap();
        assert!(expect_update_request(&mut server, 1, 1).await);
        drop(server);
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    result.unwrap();

    let events = drain_events(&mut events);
    assert!(events.iter().any(|event| matches!(event, VncEvent::Bell)));
    assert_eq!(image_changes(&events), vec![(0, 0, 1, 1)]);
    assert_eq!(client.snapshot().pixel(0, 0), Some(0xFFCC_BBAA));
}

/// A rectangle outside the framebuffer bounds is a fatal protocol
/// violation.
#[tokio::test]
async fn out_of_bounds_rectangle_fails() {
    let (mut client_side, mut server) = duplex(1 << 20);
    let (mut client, _events) = VncClient::new();

    let script = async {
        handshake_v33(&mut server, 4, 4).await;
        let mut update = update_header(1);
        update.extend(rect_header(2, 2, 4, 4, 0));
        server.write_all(&update).await.unwrap();
    };
    let (result, ()) = tokio::join!(client.attach(&mut client_side), script);
    assert!(matches!(
        result,
        Err(rustvncclient::VncError::ProtocolViolation(_))
    ));
}
