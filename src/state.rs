//! The logical device state: what the strip is *supposed* to show.
//!
//! `DisplayState` owns the strip driver plus the command-visible fields:
//! target color, global brightness, the per-LED on/off mask, derived power,
//! and the selected effect name. Pixel-setting operations write into the
//! strip buffer without rendering; callers decide when a frame is complete
//! and call [`DisplayState::show`].

use crate::surface::PixelStrip;
use crate::{Color, StripConfig};
use serde::{Deserialize, Serialize};

// ── Power ────────────────────────────────────────────────────────────

/// Aggregate on/off state, derived from the per-LED mask when pixels are
/// addressed individually and set in bulk by `all_on`/`all_off`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Power {
    On,
    Off,
}

// ── Addressing ───────────────────────────────────────────────────────

/// Which LEDs a pixel-setting operation touches.
///
/// Rust concept: ENUMS WITH DATA
/// "everything", "one index", and "a list of indices" are three cases of
/// one argument; a sum type makes them explicit and checked at compile
/// time instead of distinguished by runtime type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedTarget {
    All,
    One(usize),
    Many(Vec<usize>),
}

// ── Display state ────────────────────────────────────────────────────

pub struct DisplayState {
    strip: Box<dyn PixelStrip>,
    /// Hardware-global brightness scale (0-31), independent of pixel color.
    pub brightness: u8,
    /// The current color: used by static-color commands and as the base
    /// color of most effects.
    pub color: Color,
    /// Which LEDs are logically on, tracked when pixels are addressed
    /// individually.
    mask: Vec<bool>,
    pub power: Power,
    /// The requested effect name, or `None` in static-color mode.
    pub effect: Option<String>,
}

impl DisplayState {
    pub fn new(strip: Box<dyn PixelStrip>, config: StripConfig) -> Self {
        let mask = vec![false; strip.len()];
        Self {
            strip,
            brightness: config.brightness,
            color: Color::WHITE,
            mask,
            power: Power::Off,
            effect: None,
        }
    }

    pub fn led_count(&self) -> usize {
        self.strip.len()
    }

    /// Write `color` into the targeted slots at the current global
    /// brightness. Does not render; out-of-range indices are ignored.
    pub fn set_leds(&mut self, target: &LedTarget, color: Color) {
        // the bus wants the packed form; build it once per call
        let packed = color.packed();
        match target {
            LedTarget::All => {
                for i in 0..self.strip.len() {
                    self.strip.set_pixel(i, packed, self.brightness);
                }
            }
            LedTarget::One(index) => {
                self.strip.set_pixel(*index, packed, self.brightness);
            }
            LedTarget::Many(indices) => {
                for &i in indices {
                    self.strip.set_pixel(i, packed, self.brightness);
                }
            }
        }
    }

    /// Flush the buffer to the LEDs. A failing render is the bus driver's
    /// problem to escalate; here it is logged and the show is skipped.
    pub fn show(&mut self) {
        if let Err(e) = self.strip.show() {
            tracing::error!("strip render failed: {e}");
        }
    }

    /// Turn one LED logically on or off, updating the mask and the derived
    /// power state. Does not render.
    pub fn set_pixel_power(&mut self, index: usize, on: bool) {
        let Some(entry) = self.mask.get_mut(index) else {
            tracing::warn!("pixel index {index} out of range, ignoring");
            return;
        };
        *entry = on;
        let color = if on { self.color } else { Color::BLACK };
        self.set_leds(&LedTarget::One(index), color);
        // off for one pixel may not mean off for the device
        self.power = if self.any_lit() { Power::On } else { Power::Off };
    }

    /// Set every LED to the current color and mark the whole mask lit.
    /// Does not render.
    pub fn all_on(&mut self) {
        let color = self.color;
        self.set_leds(&LedTarget::All, color);
        self.mask.fill(true);
        self.power = Power::On;
    }

    /// Blank the strip buffer and mark the whole mask off. Does not render.
    pub fn all_off(&mut self) {
        self.strip.clear();
        self.mask.fill(false);
        self.power = Power::Off;
    }

    pub fn any_lit(&self) -> bool {
        self.mask.iter().any(|&lit| lit)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemoryStrip;
    use pretty_assertions::assert_eq;

    fn state() -> (DisplayState, MemoryStrip) {
        let strip = MemoryStrip::new(8);
        let handle = strip.clone();
        (
            DisplayState::new(Box::new(strip), StripConfig::default()),
            handle,
        )
    }

    #[test]
    fn starts_off_white_at_half_brightness() {
        let (state, _) = state();
        assert_eq!(state.power, Power::Off);
        assert_eq!(state.color, Color::WHITE);
        assert_eq!(state.brightness, 15);
        assert_eq!(state.effect, None);
    }

    #[test]
    fn set_leds_does_not_render() {
        let (mut state, strip) = state();
        state.set_leds(&LedTarget::All, Color::WHITE);
        assert_eq!(strip.show_count(), 0);
        state.show();
        assert_eq!(strip.show_count(), 1);
        assert!(strip.rendered().iter().all(|s| s.color == Color::WHITE));
    }

    #[test]
    fn set_leds_targets() {
        let (mut state, strip) = state();
        state.set_leds(&LedTarget::One(3), Color::new(1, 1, 1));
        state.set_leds(&LedTarget::Many(vec![0, 7]), Color::new(2, 2, 2));
        state.show();
        let rendered = strip.rendered();
        assert_eq!(rendered[3].color, Color::new(1, 1, 1));
        assert_eq!(rendered[0].color, Color::new(2, 2, 2));
        assert_eq!(rendered[7].color, Color::new(2, 2, 2));
        assert_eq!(rendered[1].color, Color::BLACK);
    }

    #[test]
    fn pixel_power_drives_derived_power() {
        let (mut state, _) = state();
        state.set_pixel_power(2, true);
        assert_eq!(state.power, Power::On);
        state.set_pixel_power(5, true);
        state.set_pixel_power(2, false);
        // one pixel off does not mean the device is off
        assert_eq!(state.power, Power::On);
        state.set_pixel_power(5, false);
        assert_eq!(state.power, Power::Off);
    }

    #[test]
    fn out_of_range_pixel_power_is_ignored() {
        let (mut state, _) = state();
        state.set_pixel_power(99, true);
        assert_eq!(state.power, Power::Off);
        assert!(!state.any_lit());
    }

    #[test]
    fn bulk_operations_set_mask_and_power() {
        let (mut state, strip) = state();
        state.all_on();
        assert_eq!(state.power, Power::On);
        assert!(state.any_lit());

        state.all_off();
        assert_eq!(state.power, Power::Off);
        assert!(!state.any_lit());
        state.show();
        assert!(strip.rendered().iter().all(|s| s.color == Color::BLACK));
    }

    #[test]
    fn pixel_writes_carry_current_brightness() {
        let (mut state, strip) = state();
        state.brightness = 31;
        state.set_leds(&LedTarget::One(0), Color::WHITE);
        state.show();
        assert_eq!(strip.rendered()[0].brightness, 31);
    }
}
