//! Outline colors for overlay rendering.

use std::{fmt, str::FromStr};

use image::Rgb;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque 8-bit RGB color. Serialized as a `#RRGGBB` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RgbColor {
    pub const RED: Self = Self::new(255, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn to_rgb(self) -> Rgb<u8> {
        Rgb([self.red, self.green, self.blue])
    }
}

impl Default for RgbColor {
    fn default() -> Self {
        Self::RED
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

impl FromStr for RgbColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_color(s).ok_or_else(|| {
            format!("invalid color '{s}'; expected #RGB or #RRGGBB (outlines are opaque)")
        })
    }
}

impl Serialize for RgbColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RgbColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a hexadecimal color string. Accepts `#RGB` or `#RRGGBB`, with or without `#`.
///
/// Eight-digit forms carrying alpha are rejected.
pub fn parse_hex_color(input: &str) -> Option<RgbColor> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("0x"))
        .unwrap_or(trimmed);
    match hex.len() {
        3 => Some(RgbColor::new(
            nibble(hex.get(0..1)?)?,
            nibble(hex.get(1..2)?)?,
            nibble(hex.get(2..3)?)?,
        )),
        6 => Some(RgbColor::new(
            byte(hex.get(0..2)?)?,
            byte(hex.get(2..4)?)?,
            byte(hex.get(4..6)?)?,
        )),
        _ => None,
    }
}

fn byte(slice: &str) -> Option<u8> {
    u8::from_str_radix(slice, 16).ok()
}

fn nibble(slice: &str) -> Option<u8> {
    let nib = u8::from_str_radix(slice, 16).ok()?;
    Some((nib << 4) | nib)
}
