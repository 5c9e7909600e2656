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

//! X11 keysym mapping for RFB KeyEvent messages.
//!
//! RFB key events carry X Window System key symbols. Named keys (navigation,
//! function, and modifier keys) use fixed keysym constants; printable
//! characters pass through as their Unicode code point.

/// Host-side key identifiers accepted by the input encoder.
///
/// Named keys translate through the static keysym table. `Other` carries no
/// mapping of its own; the key event's text supplies the Unicode code point
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Backspace key.
    Backspace,
    /// Tab key.
    Tab,
    /// Return key (main keyboard).
    Return,
    /// Enter key (keypad); sends the same keysym as Return.
    Enter,
    /// Insert key.
    Insert,
    /// Delete key.
    Delete,
    /// Home key.
    Home,
    /// End key.
    End,
    /// Page Up key.
    PageUp,
    /// Page Down key.
    PageDown,
    /// Left arrow key.
    Left,
    /// Up arrow key.
    Up,
    /// Right arrow key.
    Right,
    /// Down arrow key.
    Down,
    /// Function key F1.
    F1,
    /// Function key F2.
    F2,
    /// Function key F3.
    F3,
    /// Function key F4.
    F4,
    /// Function key F5.
    F5,
    /// Function key F6.
    F6,
    /// Function key F7.
    F7,
    /// Function key F8.
    F8,
    /// Function key F9.
    F9,
    /// Function key F10.
    F10,
    /// Function key F11.
    F11,
    /// Function key F12.
    F12,
    /// Shift modifier.
    Shift,
    /// Control modifier.
    Control,
    /// Meta (Super/Windows) modifier.
    Meta,
    /// Alt modifier.
    Alt,
    /// Any key without a named mapping; the event text is used instead.
    Other,
}

/// Returns the X11 keysym for a named key, or `None` for [`Key::Other`].
///
/// The table is static and immutable; it covers exactly the named keys the
/// client forwards.
pub fn keysym_for_key(key: Key) -> Option<u32> {
    let keysym = match key {
        Key::Backspace => 0xff08,
        Key::Tab => 0xff09,
        Key::Return | Key::Enter => 0xff0d,
        Key::Insert => 0xff63,
        Key::Delete => 0xffff,
        Key::Home => 0xff50,
        Key::End => 0xff57,
        Key::PageUp => 0xff55,
        Key::PageDown => 0xff56,
        Key::Left => 0xff51,
        Key::Up => 0xff52,
        Key::Right => 0xff53,
        Key::Down => 0xff54,
        Key::F1 => 0xffbe,
        Key::F2 => 0xffbf,
        Key::F3 => 0xffc0,
        Key::F4 => 0xffc1,
        Key::F5 => 0xffc2,
        Key::F6 => 0xffc3,
        Key::F7 => 0xffc4,
        Key::F8 => 0xffc5,
        Key::F9 => 0xffc6,
        Key::F10 => 0xffc7,
        Key::F11 => 0xffc8,
        Key::F12 => 0xffc9,
        Key::Shift => 0xffe1,
        Key::Control => 0xffe3,
        Key::Meta => 0xffe7,
        Key::Alt => 0xffe9,
        Key::Other => return None,
    };
    Some(keysym)
}

/// Resolves the keysym for a key event: the static table for named keys,
/// otherwise the first Unicode scalar of the event text.
///
/// Returns `None` when the key is unmapped and the text is empty; such
/// events carry no usable symbol and are dropped by the caller.
pub fn resolve_keysym(key: Key, text: &str) -> Option<u32> {
    keysym_for_key(key).or_else(|| text.chars().next().map(|c| c as u32))
}
