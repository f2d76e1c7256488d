//! Shared primitives for the LED strip effect server.
//!
//! This module provides the pieces everything else builds on:
//! - Integer clamping for channel and brightness inputs
//! - A strip-agnostic `Color` type with 24-bit packing
//! - Strip configuration
//! - Signal handling for clean shutdown
//!
//! It also re-exports the controller, effects, scheduler, server, state,
//! and surface modules used by the main binary.

pub mod controller;
pub mod effects;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod surface;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Clamping ───────────────────────────────────────────────────────

/// Hardware-global brightness ceiling (APA102 5-bit brightness field).
pub const MAX_BRIGHTNESS: u8 = 31;

/// Clamp an arbitrary integer into a color channel's [0, 255] range.
///
/// Out-of-range numeric input is never an error in this system — it is
/// recovered locally by clamping, here and nowhere else.
pub fn clamp_channel(n: i64) -> u8 {
    n.clamp(0, 255) as u8
}

/// Clamp an arbitrary integer into [0, `largest`].
pub fn clamp_to(n: i64, largest: u8) -> u8 {
    n.clamp(0, i64::from(largest)) as u8
}

// ── Strip configuration ────────────────────────────────────────────

/// Configuration for the LED strip.
///
/// Explicit and cheaply copyable — passed through the system rather than
/// read from hidden global state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripConfig {
    /// Number of addressable LEDs on the strip.
    pub leds: usize,
    /// Initial global brightness (0-31).
    pub brightness: u8,
}

impl StripConfig {
    pub fn new(leds: usize, brightness: i64) -> Self {
        Self {
            leds,
            brightness: clamp_to(brightness, MAX_BRIGHTNESS),
        }
    }
}

impl Default for StripConfig {
    /// The reference device: an 8-LED Blinkt! at half brightness.
    fn default() -> Self {
        Self {
            leds: 8,
            brightness: 15,
        }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// This lets us test effect math on any machine without a strip attached.
/// At the hardware boundary, the driver implementation converts to
/// whatever the bus wants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from arbitrary integers, clamping each channel.
    pub fn from_ints(r: i64, g: i64, b: i64) -> Self {
        Self {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }

    /// The packed 24-bit `0xRRGGBB` form used for bulk-set operations.
    pub fn packed(self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }

    /// Unpack a 24-bit `0xRRGGBB` value (upper byte ignored).
    pub fn from_packed(value: u32) -> Self {
        Self {
            r: ((value >> 16) & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: (value & 0xFF) as u8,
        }
    }

    /// Scale every channel by `x / 255`. This is the fade primitive:
    /// `scaled(0)` is black, `scaled(255)` is the color unchanged.
    pub fn scaled(self, x: u8) -> Self {
        Self {
            r: ((u16::from(self.r) * u16::from(x)) / 255) as u8,
            g: ((u16::from(self.g) * u16::from(x)) / 255) as u8,
            b: ((u16::from(self.b) * u16::from(x)) / 255) as u8,
        }
    }

    /// Integer-divide every channel, for halo pixels and other dim accents.
    pub fn dimmed(self, div: u8) -> Self {
        if div == 0 {
            return Color::BLACK;
        }
        Self {
            r: self.r / div,
            g: self.g / div,
            b: self.b / div,
        }
    }

    /// Create a color from a hue value (0-360), with full saturation and
    /// brightness.
    ///
    /// # Rust concept: match expressions
    /// Rust's `match` is exhaustive — the compiler ensures we handle all cases.
    pub fn from_hue(hue: u16) -> Self {
        let hue = hue % 360;
        let sector = hue / 60;
        let fraction = ((hue % 60) as f32) / 60.0;
        let rising = (fraction * 255.0) as u8;
        let falling = ((1.0 - fraction) * 255.0) as u8;

        match sector {
            0 => Self::new(255, rising, 0),  // Red → Yellow
            1 => Self::new(falling, 255, 0), // Yellow → Green
            2 => Self::new(0, 255, rising),  // Green → Cyan
            3 => Self::new(0, falling, 255), // Cyan → Blue
            4 => Self::new(rising, 0, 255),  // Blue → Magenta
            5 => Self::new(255, 0, falling), // Magenta → Red
            _ => Self::new(255, 0, 0),       // Unreachable, but Rust requires exhaustiveness
        }
    }

    /// The classic strip-library color wheel: map a position in [0, 255]
    /// to a rainbow-gradient color.
    pub fn wheel(pos: u8) -> Self {
        Self::from_hue(((u32::from(pos) * 360) / 256) as u16)
    }
}

// ── Signal handling ────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// # Rust concept: Arc and AtomicBool
/// We need to share the `running` flag between the server loop and the
/// signal handler. `Arc` (Atomic Reference Counting) lets multiple owners
/// share data. `AtomicBool` is a thread-safe boolean — no mutex needed
/// for a single bool.
pub fn setup_signal_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone(); // Clone the Arc, not the bool — both point to same data

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    running
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    // ── Clamping tests ─────────────────────────────────────────────

    #[rstest]
    #[case(-1, 0)]
    #[case(0, 0)]
    #[case(128, 128)]
    #[case(255, 255)]
    #[case(256, 255)]
    #[case(99_999, 255)]
    #[case(i64::MIN, 0)]
    #[case(i64::MAX, 255)]
    fn test_clamp_channel(#[case] n: i64, #[case] expected: u8) {
        assert_eq!(clamp_channel(n), expected);
    }

    #[rstest]
    #[case(-5, 0)]
    #[case(15, 15)]
    #[case(31, 31)]
    #[case(32, 31)]
    #[case(500, 31)]
    fn test_clamp_to_brightness(#[case] n: i64, #[case] expected: u8) {
        assert_eq!(clamp_to(n, MAX_BRIGHTNESS), expected);
    }

    // ── StripConfig tests ──────────────────────────────────────────

    #[test]
    fn strip_config_default_is_blinkt() {
        let config = StripConfig::default();
        assert_eq!(config.leds, 8);
        assert_eq!(config.brightness, 15);
    }

    #[test]
    fn strip_config_clamps_brightness() {
        assert_eq!(StripConfig::new(60, 200).brightness, 31);
        assert_eq!(StripConfig::new(60, -3).brightness, 0);
    }

    // ── Color tests ────────────────────────────────────────────────

    #[test]
    fn color_from_ints_clamps() {
        assert_eq!(Color::from_ints(-20, 300, 128), Color::new(0, 255, 128));
    }

    #[rstest]
    #[case(Color::new(0xAB, 0xCD, 0xEF), 0x00AB_CDEF)]
    #[case(Color::BLACK, 0x0000_0000)]
    #[case(Color::WHITE, 0x00FF_FFFF)]
    fn test_packed(#[case] color: Color, #[case] expected: u32) {
        assert_eq!(color.packed(), expected);
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(255, 255, 255)]
    #[case(17, 204, 99)]
    fn test_pack_round_trip(#[case] r: u8, #[case] g: u8, #[case] b: u8) {
        let color = Color::new(r, g, b);
        assert_eq!(Color::from_packed(color.packed()), color);
    }

    #[test]
    fn scaled_endpoints() {
        let c = Color::new(200, 100, 50);
        assert_eq!(c.scaled(255), c);
        assert_eq!(c.scaled(0), Color::BLACK);
    }

    #[test]
    fn scaled_halves_at_midpoint() {
        // 127/255 truncates down
        assert_eq!(Color::new(200, 100, 50).scaled(127), Color::new(99, 49, 24));
    }

    #[test]
    fn dimmed_is_tenth_intensity() {
        assert_eq!(Color::new(250, 100, 9).dimmed(10), Color::new(25, 10, 0));
    }

    #[test]
    fn dimmed_by_zero_is_black() {
        assert_eq!(Color::WHITE.dimmed(0), Color::BLACK);
    }

    #[rstest]
    #[case(0, 255, 0, 0)] // Red
    #[case(60, 255, 255, 0)] // Yellow
    #[case(120, 0, 255, 0)] // Green
    #[case(180, 0, 255, 255)] // Cyan
    #[case(240, 0, 0, 255)] // Blue
    #[case(300, 255, 0, 255)] // Magenta
    fn test_color_from_hue_primary(#[case] hue: u16, #[case] r: u8, #[case] g: u8, #[case] b: u8) {
        let c = Color::from_hue(hue);
        assert_eq!(c, Color::new(r, g, b));
    }

    #[test]
    fn color_from_hue_wraps_at_360() {
        assert_eq!(Color::from_hue(0), Color::from_hue(360));
        assert_eq!(Color::from_hue(90), Color::from_hue(450));
    }

    #[test]
    fn wheel_spans_the_rainbow() {
        assert_eq!(Color::wheel(0), Color::new(255, 0, 0));
        // 255 maps to hue 358, just short of wrapping back to pure red
        assert_eq!(Color::wheel(255), Color::from_hue(358));
    }
}
