//! Packed ARGB card colors
//!
//! Colors are stored as a single 32-bit ARGB integer. The database column
//! holds the signed reinterpretation, so files written by other tools
//! (where opaque colors are negative) load unchanged.

use crate::config::DEFAULT_CARD_COLOR;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A packed `0xAARRGGBB` color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const RED: Color = Color(0xFFFF_0000);

    pub fn from_argb(alpha: u8, red: u8, green: u8, blue: u8) -> Self {
        Self(u32::from_be_bytes([alpha, red, green, blue]))
    }

    pub fn alpha(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    pub fn red(self) -> u8 {
        self.0.to_be_bytes()[1]
    }

    pub fn green(self) -> u8 {
        self.0.to_be_bytes()[2]
    }

    pub fn blue(self) -> u8 {
        self.0.to_be_bytes()[3]
    }

    /// Signed value written to the `color` column
    pub fn to_packed(self) -> i64 {
        i64::from(self.0 as i32)
    }

    /// Read a `color` column value. Both signed and unsigned encodings of
    /// the same 32 bits map to the same color.
    pub fn from_packed(value: i64) -> Self {
        Self(value as u32)
    }

    /// Parse `#RRGGBB` (opaque) or `#AARRGGBB`
    pub fn parse_hex(input: &str) -> Option<Self> {
        let digits = input.strip_prefix('#')?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        match digits.len() {
            6 => u32::from_str_radix(digits, 16)
                .ok()
                .map(|rgb| Self(0xFF00_0000 | rgb)),
            8 => u32::from_str_radix(digits, 16).ok().map(Self),
            _ => None,
        }
    }

    /// `#AARRGGBB`, or `#RRGGBB` when fully opaque
    pub fn to_hex(self) -> String {
        if self.alpha() == 0xFF {
            format!("#{:06X}", self.0 & 0x00FF_FFFF)
        } else {
            format!("#{:08X}", self.0)
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self(DEFAULT_CARD_COLOR)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Normalize hex input as the user types it.
///
/// A stray trailing `#` is dropped and a missing leading `#` is added.
/// A lone `#` is returned unchanged.
pub fn normalize_hex(input: &str) -> String {
    let trimmed = input.trim();
    let body = match trimmed.strip_suffix('#') {
        Some(rest) if !rest.is_empty() => rest,
        _ => trimmed,
    };

    if body.starts_with('#') {
        body.to_string()
    } else {
        format!("#{}", body)
    }
}
