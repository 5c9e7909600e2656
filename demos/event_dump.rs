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

//! Minimal VNC client demo.
//!
//! Connects to a VNC server, prints every engine event, and detaches after
//! the first full framebuffer update has been applied.
//!
//! Usage:
//!   cargo run --example event_dump -- 127.0.0.1:5900

use std::error::Error;
use tokio::net::TcpStream;

use rustvncclient::{VncClient, VncEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5900".to_string());
    println!("Connecting to VNC server at {address}...");
    let mut stream = TcpStream::connect(&address).await?;

    let (mut client, mut events) = VncClient::new();
    let handle = client.handle();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("event: {event:?}");
            if let VncEvent::ImageChanged { .. } = event {
                // One update is enough for a smoke test.
                handle.detach();
            }
        }
    });

    client.attach(&mut stream).await?;

    let snapshot = client.snapshot();
    let (width, height) = snapshot.size();
    println!("Detached with a {width}x{height} framebuffer mirror");

    printer.abort();
    Ok(())
}
