//! Effect task lifecycle: the cancellation token and the scheduler that
//! guarantees at most one effect is ever running.
//!
//! Stopping is cooperative. The scheduler sets the token, the effect
//! notices at its next poll point and returns, and `stop()` joins the
//! thread before clearing the token for the next epoch. The token is one
//! long-lived object, never recreated: a fresh token per start would race
//! a task still finishing its own final check.
//!
//! ## Rust concepts
//! - `Mutex<bool>` + `Condvar` for a waitable flag
//! - `JoinHandle` ownership as the "a task exists" invariant
//! - `Arc`/`Weak` as a supervisor-liveness signal

use crate::effects::{EffectContext, EffectKind};
use crate::state::DisplayState;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ── Cancellation token ───────────────────────────────────────────────

/// A reusable settable/clearable/waitable flag.
///
/// Effects sleep between frames by waiting on this token, so a `set`
/// wakes a sleeping task immediately instead of letting it finish its
/// inter-frame delay.
pub struct CancelToken {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self) {
        *self.flag.lock().unwrap() = true;
        self.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.flag.lock().unwrap() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Block for up to `timeout`, returning `true` as soon as the token is
    /// set and `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock().unwrap();
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Condvar wakeups can be spurious; the loop re-checks the flag.
            flag = self.cond.wait_timeout(flag, deadline - now).unwrap().0;
        }
        true
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

/// Owns the lifecycle of at most one running effect task.
pub struct EffectScheduler {
    cancel: Arc<CancelToken>,
    /// Effect tasks hold a `Weak` to this; when the scheduler is gone they
    /// self-terminate even without an explicit stop signal.
    keepalive: Arc<()>,
    active: Option<JoinHandle<()>>,
}

impl EffectScheduler {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(CancelToken::new()),
            keepalive: Arc::new(()),
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Stop the running effect, if any: signal, wait for the task to fully
    /// exit, then re-arm the token for the next epoch. Synchronous —
    /// callers may assume no task is active on return.
    pub fn stop(&mut self) {
        let Some(handle) = self.active.take() else {
            return;
        };
        self.cancel.set();
        if handle.join().is_err() {
            tracing::error!("effect task panicked");
        }
        self.cancel.clear();
    }

    /// Start `name` as a new background task bound to `state`.
    ///
    /// Callers must have called [`stop`](Self::stop) first if a task might
    /// be running. Unknown names log a warning and start nothing; returns
    /// whether a task was started.
    pub fn start(&mut self, name: &str, state: Arc<Mutex<DisplayState>>) -> bool {
        debug_assert!(self.active.is_none(), "start() requires stop() first");
        let Some(kind) = EffectKind::parse(name) else {
            tracing::warn!("unknown effect {name:?}, ignoring");
            return false;
        };

        let ctx = EffectContext::new(state, Arc::clone(&self.cancel), Arc::downgrade(&self.keepalive));
        let spawned = thread::Builder::new()
            .name(format!("effect-{name}"))
            .spawn(move || kind.run(ctx));

        match spawned {
            Ok(handle) => {
                tracing::info!("started effect {name}");
                self.active = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!("failed to spawn effect task: {e}");
                false
            }
        }
    }
}

impl Default for EffectScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EffectScheduler {
    /// An orderly shutdown path even when nobody called `stop()`.
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StripConfig;
    use crate::surface::MemoryStrip;

    fn shared_state() -> (Arc<Mutex<DisplayState>>, MemoryStrip) {
        let strip = MemoryStrip::new(8);
        let handle = strip.clone();
        let state = DisplayState::new(Box::new(strip), StripConfig::default());
        (Arc::new(Mutex::new(state)), handle)
    }

    // ── Token ──────────────────────────────────────────────────────

    #[test]
    fn token_set_clear_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_set());
        token.set();
        assert!(token.is_set());
        token.clear();
        assert!(!token.is_set());
    }

    #[test]
    fn wait_times_out_when_unset() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn wait_returns_immediately_when_already_set() {
        let token = CancelToken::new();
        token.set();
        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn wait_wakes_early_on_set() {
        let token = Arc::new(CancelToken::new());
        let setter = Arc::clone(&token);
        let start = Instant::now();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            setter.set();
        });
        assert!(token.wait_timeout(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_wait_polls_the_flag() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::ZERO));
        token.set();
        assert!(token.wait_timeout(Duration::ZERO));
    }

    // ── Scheduler ──────────────────────────────────────────────────

    #[test]
    fn stop_when_idle_is_a_noop() {
        let mut scheduler = EffectScheduler::new();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn unknown_effect_starts_nothing() {
        let mut scheduler = EffectScheduler::new();
        let (state, _) = shared_state();
        assert!(!scheduler.start("discoInferno", state));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn stop_joins_within_one_step_delay() {
        let mut scheduler = EffectScheduler::new();
        let (state, strip) = shared_state();
        assert!(scheduler.start("fire", state));
        assert!(scheduler.is_running());

        // let it produce a few frames
        thread::sleep(Duration::from_millis(120));
        let start = Instant::now();
        scheduler.stop();
        // fire's per-step delay is 30ms; the condvar wake makes this
        // near-instant, the bound just leaves scheduling slack
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!scheduler.is_running());
        assert!(strip.show_count() > 0);
    }

    #[test]
    fn stop_then_start_replaces_the_task() {
        let mut scheduler = EffectScheduler::new();
        let (state, _) = shared_state();
        assert!(scheduler.start("twinkle", Arc::clone(&state)));
        scheduler.stop();
        assert!(!scheduler.is_running());
        // the token was cleared, so the next epoch runs
        assert!(!scheduler.cancel.is_set());
        assert!(scheduler.start("cylon", state));
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[test]
    fn drop_stops_a_running_task() {
        let (state, _) = shared_state();
        let mut scheduler = EffectScheduler::new();
        scheduler.start("meteorRain", state);
        // dropping must join without hanging
        drop(scheduler);
    }
}
