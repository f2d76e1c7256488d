//! The pixel-bus boundary: strip drivers behind a trait.
//!
//! The effect engine never talks to hardware directly — it writes through
//! [`PixelStrip`], which has two implementations:
//! - [`MemoryStrip`]: an in-memory frame buffer used in tests and for
//!   development on machines without a strip attached
//! - `BlinktStrip`: the real APA102 driver (Pimoroni Blinkt! on BCM 23/24),
//!   available behind the `hardware` cargo feature
//!
//! ## Rust concepts
//! - Trait objects (`Box<dyn PixelStrip>`) for the driver seam
//! - `Arc<Mutex<T>>` so tests can observe frames the controller renders
//! - Optional dependencies behind a cargo feature

use crate::Color;
use std::sync::{Arc, Mutex};

/// Error type at the hardware boundary. The bus drivers decide what can
/// actually fail; we just carry it.
pub type StripError = Box<dyn std::error::Error + Send + Sync>;

// ── The driver seam ──────────────────────────────────────────────────

/// An ordered sequence of addressable color slots plus a per-write global
/// brightness scale.
///
/// Writes only touch the in-memory buffer; nothing reaches the LEDs until
/// [`show`](PixelStrip::show) flushes it. Out-of-range indices are ignored.
pub trait PixelStrip: Send {
    /// Number of addressable LEDs.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set one slot to the packed `0xRRGGBB` color at the hardware-global
    /// `brightness` (0-31).
    fn set_pixel(&mut self, index: usize, packed: u32, brightness: u8);

    /// Set every slot to off (does not render).
    fn clear(&mut self);

    /// Flush the buffer to the physical LEDs.
    fn show(&mut self) -> Result<(), StripError>;
}

// ── In-memory strip ──────────────────────────────────────────────────

/// One buffered slot: what `show` would push out for that LED.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Slot {
    pub color: Color,
    pub brightness: u8,
}

#[derive(Debug, Default)]
struct Frame {
    slots: Vec<Slot>,
    rendered: Vec<Slot>,
    shows: u64,
}

/// A strip that renders into memory.
///
/// Cloning shares the underlying frame, so a test can keep a handle while
/// the controller owns the boxed strip, then assert on what was rendered.
#[derive(Clone, Debug)]
pub struct MemoryStrip {
    frame: Arc<Mutex<Frame>>,
}

impl MemoryStrip {
    pub fn new(leds: usize) -> Self {
        Self {
            frame: Arc::new(Mutex::new(Frame {
                slots: vec![Slot::default(); leds],
                rendered: vec![Slot::default(); leds],
                shows: 0,
            })),
        }
    }

    /// The frame as of the last `show` call.
    pub fn rendered(&self) -> Vec<Slot> {
        self.frame.lock().unwrap().rendered.clone()
    }

    /// How many times `show` has flushed.
    pub fn show_count(&self) -> u64 {
        self.frame.lock().unwrap().shows
    }
}

impl PixelStrip for MemoryStrip {
    fn len(&self) -> usize {
        self.frame.lock().unwrap().slots.len()
    }

    fn set_pixel(&mut self, index: usize, packed: u32, brightness: u8) {
        let mut frame = self.frame.lock().unwrap();
        if let Some(slot) = frame.slots.get_mut(index) {
            *slot = Slot {
                color: Color::from_packed(packed),
                brightness,
            };
        }
    }

    fn clear(&mut self) {
        let mut frame = self.frame.lock().unwrap();
        for slot in &mut frame.slots {
            *slot = Slot::default();
        }
    }

    fn show(&mut self) -> Result<(), StripError> {
        let mut frame = self.frame.lock().unwrap();
        frame.rendered = frame.slots.clone();
        frame.shows += 1;
        Ok(())
    }
}

// ── Blinkt (APA102) strip ────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub use hardware::BlinktStrip;

#[cfg(feature = "hardware")]
mod hardware {
    use super::{PixelStrip, StripError};
    use crate::Color;

    /// Blinkt! wires its APA102 chain to these BCM pins.
    const DATA_PIN: u8 = 23;
    const CLOCK_PIN: u8 = 24;

    /// The real strip, driven over the Blinkt!'s bit-banged APA102 bus.
    pub struct BlinktStrip {
        inner: blinkt::Blinkt,
        leds: usize,
    }

    impl BlinktStrip {
        pub fn new(leds: usize) -> Result<Self, StripError> {
            let mut inner = blinkt::Blinkt::with_settings(DATA_PIN, CLOCK_PIN, leds)?;
            // We blank the strip ourselves on shutdown; a drop mid-effect
            // must not flicker the LEDs off.
            inner.set_clear_on_drop(false);
            Ok(Self { inner, leds })
        }
    }

    impl PixelStrip for BlinktStrip {
        fn len(&self) -> usize {
            self.leds
        }

        fn set_pixel(&mut self, index: usize, packed: u32, brightness: u8) {
            if index >= self.leds {
                return;
            }
            let color = Color::from_packed(packed);
            let scale = f32::from(brightness.min(crate::MAX_BRIGHTNESS)) / 31.0;
            self.inner
                .set_pixel_rgbb(index, color.r, color.g, color.b, scale);
        }

        fn clear(&mut self) {
            self.inner.clear();
        }

        fn show(&mut self) -> Result<(), StripError> {
            Ok(self.inner.show()?)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_are_invisible_until_show() {
        let mut strip = MemoryStrip::new(4);
        strip.set_pixel(2, Color::WHITE.packed(), 15);
        assert_eq!(strip.rendered()[2], Slot::default());

        strip.show().unwrap();
        assert_eq!(
            strip.rendered()[2],
            Slot {
                color: Color::WHITE,
                brightness: 15
            }
        );
        assert_eq!(strip.show_count(), 1);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut strip = MemoryStrip::new(4);
        strip.set_pixel(4, Color::WHITE.packed(), 15);
        strip.show().unwrap();
        assert!(strip.rendered().iter().all(|s| *s == Slot::default()));
    }

    #[test]
    fn clear_blanks_every_slot() {
        let mut strip = MemoryStrip::new(3);
        for i in 0..3 {
            strip.set_pixel(i, 0x090909, 31);
        }
        strip.clear();
        strip.show().unwrap();
        assert!(strip.rendered().iter().all(|s| *s == Slot::default()));
    }

    #[test]
    fn clones_share_one_frame() {
        let strip = MemoryStrip::new(2);
        let mut writer = strip.clone();
        writer.set_pixel(0, Color::new(1, 2, 3).packed(), 7);
        writer.show().unwrap();
        assert_eq!(strip.rendered()[0].color, Color::new(1, 2, 3));
    }
}
