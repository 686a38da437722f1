//! Fill color parsing.

use peniko::Color;
use serde::{Deserialize, Serialize};

/// RGBA8 color as parsed from a fill's CSS color string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for Rgba {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<Rgba> for Color {
    fn from(color: Rgba) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Parse a CSS color string (`transparent`, `#rgb`, `#rrggbb`, `#rrggbbaa`).
///
/// Returns `None` for anything else so callers can pick their own fallback.
pub fn parse_color(color: &str) -> Option<Rgba> {
    let color = color.trim();
    if color.eq_ignore_ascii_case("transparent") {
        return Some(Rgba::transparent());
    }

    let hex = color.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    match hex.len() {
        3 => Some(Rgba::new(
            channel(0..1)? * 17,
            channel(1..2)? * 17,
            channel(2..3)? * 17,
            255,
        )),
        6 => Some(Rgba::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
        8 => Some(Rgba::new(
            channel(0..2)?,
            channel(2..4)?,
            channel(4..6)?,
            channel(6..8)?,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_hex() {
        assert_eq!(parse_color("#fff"), Some(Rgba::new(255, 255, 255, 255)));
        assert_eq!(parse_color("#3b82f6"), Some(Rgba::new(59, 130, 246, 255)));
        assert_eq!(parse_color("#3b82f680"), Some(Rgba::new(59, 130, 246, 128)));
    }

    #[test]
    fn test_parse_transparent() {
        assert_eq!(parse_color("transparent"), Some(Rgba::transparent()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_color("red"), None);
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
    }

    #[test]
    fn test_hex_roundtrip() {
        let c = Rgba::new(1, 2, 3, 255);
        assert_eq!(parse_color(&c.to_hex()), Some(c));
        let c = Rgba::new(1, 2, 3, 4);
        assert_eq!(parse_color(&c.to_hex()), Some(c));
    }
}
