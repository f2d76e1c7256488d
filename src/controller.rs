//! Command application: the single serialized stop → apply → render
//! pipeline, and the control thread that owns it.
//!
//! Every incoming command first stops whatever effect is running (a
//! synchronous join, so nothing animates while state changes), then applies
//! its fields in a fixed order (effect, brightness, color, power/pixel),
//! renders exactly one frame, and reports the fully resolved state back.
//! Reporting the whole state regardless of what changed keeps the external
//! status view idempotent.
//!
//! The HTTP layer never touches the controller directly; requests travel
//! over an `mpsc` channel to a dedicated control thread, one at a time.

use crate::scheduler::EffectScheduler;
use crate::state::{DisplayState, Power};
use crate::surface::PixelStrip;
use crate::{clamp_to, Color, StripConfig, MAX_BRIGHTNESS};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

// ── Wire types ───────────────────────────────────────────────────────

/// An RGB triple on the wire. Accepted wide and clamped on apply, so an
/// out-of-range channel can never be a request error.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ColorBody {
    pub r: i64,
    pub g: i64,
    pub b: i64,
}

/// One incoming command. Absent fields mean "leave unchanged".
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct Command {
    /// Effect name to start (e.g. "fire"); any command without this field
    /// returns the device to static-color mode.
    pub effect: Option<String>,
    /// Hardware-global brightness, clamped to 0-31.
    pub brightness: Option<i64>,
    pub color: Option<ColorBody>,
    /// Pixel index that `state` applies to. On its own it does nothing.
    pub led: Option<i64>,
    /// "ON"/"OFF", for the whole strip or for `led` if given.
    pub state: Option<Power>,
}

/// The fully resolved device state, reported after every command.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct StatusReport {
    pub brightness: u8,
    pub color: ColorBody,
    /// Active effect name; `null` in static-color mode.
    pub effect: Option<String>,
    pub state: Power,
}

// ── Controller ───────────────────────────────────────────────────────

/// Owns the display state and the effect scheduler; the only writer of
/// command fields.
pub struct Controller {
    state: Arc<Mutex<DisplayState>>,
    scheduler: EffectScheduler,
}

impl Controller {
    pub fn new(strip: Box<dyn PixelStrip>, config: StripConfig) -> Self {
        let mut state = DisplayState::new(strip, config);
        // a powered-up strip sometimes lights a few pixels on its own
        state.all_off();
        state.show();
        Self {
            state: Arc::new(Mutex::new(state)),
            scheduler: EffectScheduler::new(),
        }
    }

    /// Apply one command and report the resolved state.
    pub fn apply(&mut self, cmd: &Command) -> StatusReport {
        // stop any running effect before touching anything
        self.scheduler.stop();
        self.state.lock().unwrap().effect = None;

        if let Some(name) = &cmd.effect {
            if self.scheduler.start(name, Arc::clone(&self.state)) {
                self.state.lock().unwrap().effect = Some(name.clone());
            }
        }

        if let Some(brightness) = cmd.brightness {
            self.state.lock().unwrap().brightness = clamp_to(brightness, MAX_BRIGHTNESS);
        }

        if let Some(color) = &cmd.color {
            self.state.lock().unwrap().color = Color::from_ints(color.r, color.g, color.b);
        }

        if let Some(power) = cmd.state {
            let mut state = self.state.lock().unwrap();
            match cmd.led {
                Some(led) => {
                    if led >= 0 {
                        state.set_pixel_power(led as usize, power == Power::On);
                    } else {
                        tracing::warn!("negative pixel index {led}, ignoring");
                    }
                }
                None => match power {
                    Power::On => state.all_on(),
                    Power::Off => state.all_off(),
                },
            }
        }

        // one authoritative render pass
        self.state.lock().unwrap().show();
        self.status()
    }

    /// The resolved state without applying anything.
    pub fn status(&self) -> StatusReport {
        let state = self.state.lock().unwrap();
        StatusReport {
            brightness: state.brightness,
            color: ColorBody {
                r: i64::from(state.color.r),
                g: i64::from(state.color.g),
                b: i64::from(state.color.b),
            },
            effect: state.effect.clone(),
            state: state.power,
        }
    }

    pub fn effect_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop the effect and blank the strip; the last thing the control
    /// thread does.
    pub fn shutdown(&mut self) {
        self.scheduler.stop();
        let mut state = self.state.lock().unwrap();
        state.effect = None;
        state.all_off();
        state.show();
    }
}

// ── Control thread ───────────────────────────────────────────────────

/// Requests sent from the HTTP server to the control thread.
pub enum ControlRequest {
    /// Apply a command; the resolved status comes back on the oneshot.
    Apply {
        command: Command,
        reply: oneshot::Sender<StatusReport>,
    },
    /// Read the resolved status without changing anything.
    Query { reply: oneshot::Sender<StatusReport> },
}

/// Main control loop — runs on a dedicated thread and owns the controller.
///
/// Returns when every sender is gone, stopping the active effect and
/// blanking the strip on the way out.
pub fn control_loop(rx: Receiver<ControlRequest>, mut controller: Controller) {
    tracing::info!("control thread started, waiting for commands...");
    while let Ok(request) = rx.recv() {
        match request {
            ControlRequest::Apply { command, reply } => {
                let status = controller.apply(&command);
                // a dropped reply means the client went away; not our problem
                let _ = reply.send(status);
            }
            ControlRequest::Query { reply } => {
                let _ = reply.send(controller.status());
            }
        }
    }
    tracing::info!("control thread: channel closed, shutting down");
    controller.shutdown();
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemoryStrip;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn harness() -> (Controller, MemoryStrip) {
        let strip = MemoryStrip::new(8);
        let handle = strip.clone();
        (
            Controller::new(Box::new(strip), StripConfig::default()),
            handle,
        )
    }

    fn parse(value: serde_json::Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    // ── Wire format ────────────────────────────────────────────────

    #[test]
    fn absent_fields_deserialize_to_none() {
        let cmd = parse(json!({}));
        assert!(cmd.effect.is_none());
        assert!(cmd.brightness.is_none());
        assert!(cmd.color.is_none());
        assert!(cmd.led.is_none());
        assert!(cmd.state.is_none());
    }

    #[test]
    fn state_field_uses_wire_casing() {
        assert_eq!(parse(json!({"state": "ON"})).state, Some(Power::On));
        assert_eq!(parse(json!({"state": "OFF"})).state, Some(Power::Off));
    }

    #[test]
    fn status_serializes_null_effect_in_static_mode() {
        let (controller, _) = harness();
        let value = serde_json::to_value(controller.status()).unwrap();
        assert_eq!(value["effect"], serde_json::Value::Null);
        assert_eq!(value["state"], "OFF");
        assert_eq!(value["color"]["r"], 255);
    }

    // ── End-to-end scenarios ───────────────────────────────────────

    #[test]
    fn power_on_with_no_prior_color_lights_everything_white() {
        let (mut controller, strip) = harness();
        let status = controller.apply(&parse(json!({"state": "ON"})));
        assert_eq!(status.state, Power::On);
        assert!(
            strip
                .rendered()
                .iter()
                .all(|slot| slot.color == Color::WHITE)
        );
    }

    #[test]
    fn turning_off_the_only_lit_led_powers_the_device_off() {
        let (mut controller, strip) = harness();
        let on = controller.apply(&parse(json!({"led": 2, "state": "ON"})));
        assert_eq!(on.state, Power::On);
        assert_eq!(strip.rendered()[2].color, Color::WHITE);

        let off = controller.apply(&parse(json!({"led": 2, "state": "OFF"})));
        assert_eq!(off.state, Power::Off);
        assert_eq!(strip.rendered()[2].color, Color::BLACK);
    }

    #[test]
    fn color_command_stops_a_running_fire() {
        let (mut controller, _) = harness();
        let status = controller.apply(&parse(json!({"effect": "fire"})));
        assert_eq!(status.effect.as_deref(), Some("fire"));
        assert!(controller.effect_running());

        let status = controller.apply(&parse(json!({"color": {"r": 0, "g": 0, "b": 255}})));
        assert!(!controller.effect_running());
        assert_eq!(status.effect, None);
        assert_eq!((status.color.r, status.color.g, status.color.b), (0, 0, 255));
    }

    // ── Field handling ─────────────────────────────────────────────

    #[test]
    fn brightness_and_channels_are_clamped() {
        let (mut controller, _) = harness();
        let status = controller.apply(&parse(json!({
            "brightness": 500,
            "color": {"r": -12, "g": 300, "b": 128}
        })));
        assert_eq!(status.brightness, 31);
        assert_eq!((status.color.r, status.color.g, status.color.b), (0, 255, 128));
    }

    #[test]
    fn led_without_state_does_nothing() {
        let (mut controller, strip) = harness();
        let status = controller.apply(&parse(json!({"led": 3})));
        assert_eq!(status.state, Power::Off);
        assert!(strip.rendered().iter().all(|s| s.color == Color::BLACK));
    }

    #[test]
    fn unknown_effect_is_ignored_and_not_reported() {
        let (mut controller, _) = harness();
        let status = controller.apply(&parse(json!({"effect": "discoInferno"})));
        assert_eq!(status.effect, None);
        assert!(!controller.effect_running());
    }

    #[test]
    fn replacing_an_effect_joins_the_previous_task_first() {
        let (mut controller, _) = harness();
        controller.apply(&parse(json!({"effect": "meteorRain"})));
        assert!(controller.effect_running());
        let status = controller.apply(&parse(json!({"effect": "cylon"})));
        assert_eq!(status.effect.as_deref(), Some("cylon"));
        assert!(controller.effect_running());
        controller.shutdown();
        assert!(!controller.effect_running());
    }

    #[test]
    fn status_view_is_idempotent() {
        let (mut controller, _) = harness();
        controller.apply(&parse(json!({"brightness": 20})));
        let a = controller.status();
        let b = controller.status();
        assert_eq!(a.brightness, b.brightness);
        assert_eq!(a.state, b.state);
        assert_eq!(a.effect, b.effect);
    }

    #[test]
    fn out_of_range_led_index_leaves_state_unchanged() {
        let (mut controller, _) = harness();
        let status = controller.apply(&parse(json!({"led": 99, "state": "ON"})));
        assert_eq!(status.state, Power::Off);
        let status = controller.apply(&parse(json!({"led": -1, "state": "ON"})));
        assert_eq!(status.state, Power::Off);
    }
}
