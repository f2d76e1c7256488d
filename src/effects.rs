//! The effect engine: every animation algorithm and its frame loop.
//!
//! Each effect is an infinite frame producer running on its own thread:
//! paint into the display state, render, pause, repeat. The pause is a
//! wait on the cancellation token, so a stop request wakes a sleeping
//! effect immediately and stop latency is bounded by one step's delay.
//! Effects check for exit at least once per visually-atomic step, never
//! just once per full sweep of the strip.
//!
//! Every effect also checks a supervisor-liveness signal each step and
//! self-terminates if its scheduler is gone, so an animation can never
//! outlive its owner.

use crate::scheduler::CancelToken;
use crate::state::{DisplayState, LedTarget};
use crate::Color;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

// ── Effect names ─────────────────────────────────────────────────────

/// The effect catalog. Variants map 1:1 to the wire names commands use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    FadeInOut,
    HalloweenEyes,
    Cylon,
    Twinkle,
    RandomTwinkle,
    Sparkle,
    RandomSparkle,
    SnowSparkle,
    Running,
    ColorWipe,
    RainbowCycle,
    Marquee,
    MarqueeRainbow,
    Fire,
    Bouncing,
    BouncingRainbow,
    MeteorRain,
}

impl EffectKind {
    pub const ALL: [EffectKind; 17] = [
        EffectKind::FadeInOut,
        EffectKind::HalloweenEyes,
        EffectKind::Cylon,
        EffectKind::Twinkle,
        EffectKind::RandomTwinkle,
        EffectKind::Sparkle,
        EffectKind::RandomSparkle,
        EffectKind::SnowSparkle,
        EffectKind::Running,
        EffectKind::ColorWipe,
        EffectKind::RainbowCycle,
        EffectKind::Marquee,
        EffectKind::MarqueeRainbow,
        EffectKind::Fire,
        EffectKind::Bouncing,
        EffectKind::BouncingRainbow,
        EffectKind::MeteorRain,
    ];

    /// Look up a wire name. `None` for anything not in the catalog.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "fadeInOut" => Some(Self::FadeInOut),
            "halloweenEyes" => Some(Self::HalloweenEyes),
            "cylon" => Some(Self::Cylon),
            "twinkle" => Some(Self::Twinkle),
            "randomTwinkle" => Some(Self::RandomTwinkle),
            "sparkle" => Some(Self::Sparkle),
            "randomSparkle" => Some(Self::RandomSparkle),
            "snowSparkle" => Some(Self::SnowSparkle),
            "running" => Some(Self::Running),
            "colorWipe" => Some(Self::ColorWipe),
            "rainbowCycle" => Some(Self::RainbowCycle),
            "marquee" => Some(Self::Marquee),
            "marqueeRainbow" => Some(Self::MarqueeRainbow),
            "fire" => Some(Self::Fire),
            "bouncing" => Some(Self::Bouncing),
            "bouncingRainbow" => Some(Self::BouncingRainbow),
            "meteorRain" => Some(Self::MeteorRain),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FadeInOut => "fadeInOut",
            Self::HalloweenEyes => "halloweenEyes",
            Self::Cylon => "cylon",
            Self::Twinkle => "twinkle",
            Self::RandomTwinkle => "randomTwinkle",
            Self::Sparkle => "sparkle",
            Self::RandomSparkle => "randomSparkle",
            Self::SnowSparkle => "snowSparkle",
            Self::Running => "running",
            Self::ColorWipe => "colorWipe",
            Self::RainbowCycle => "rainbowCycle",
            Self::Marquee => "marquee",
            Self::MarqueeRainbow => "marqueeRainbow",
            Self::Fire => "fire",
            Self::Bouncing => "bouncing",
            Self::BouncingRainbow => "bouncingRainbow",
            Self::MeteorRain => "meteorRain",
        }
    }

    /// Run this effect until cancelled. Entry point for the effect thread;
    /// the per-effect tunings live here, in one place.
    pub fn run(self, mut ctx: EffectContext) {
        if ctx.leds == 0 {
            tracing::warn!("no LEDs to animate");
            return;
        }
        let ms = Duration::from_millis;
        match self {
            Self::FadeInOut => fade_in_out(&mut ctx, 128, ms(10), ms(100)),
            Self::HalloweenEyes => halloween_eyes(&mut ctx, 1, 4, true, 50, ms(10), ms(100)),
            Self::Cylon => cylon(&mut ctx, 4, ms(40), ms(200)),
            Self::Twinkle => twinkle(&mut ctx, 10, false, ms(300)),
            Self::RandomTwinkle => twinkle(&mut ctx, 10, true, ms(300)),
            Self::Sparkle => twinkle(&mut ctx, 1, false, Duration::ZERO),
            Self::RandomSparkle => twinkle(&mut ctx, 1, true, Duration::ZERO),
            Self::SnowSparkle => snow_sparkle(&mut ctx),
            Self::Running => running(&mut ctx, ms(50)),
            Self::ColorWipe => wipe(&mut ctx, ms(50), ms(50)),
            Self::RainbowCycle => rainbow_cycle(&mut ctx, ms(100)),
            Self::Marquee => marquee(&mut ctx, ms(50)),
            Self::MarqueeRainbow => marquee_rainbow(&mut ctx, ms(50)),
            Self::Fire => fire(&mut ctx, 150, 120, ms(30)),
            Self::Bouncing => bouncing(&mut ctx, 1, false, ms(50)),
            Self::BouncingRainbow => bouncing(&mut ctx, 4, true, ms(50)),
            Self::MeteorRain => meteor_rain(&mut ctx, 10, 64, ms(30)),
        }
        tracing::debug!("effect {} exited", self.name());
    }
}

// ── Frame context ────────────────────────────────────────────────────

/// Everything a running effect needs: the shared display state, the
/// cancellation token, the supervisor-liveness signal, and its own
/// randomness source.
pub struct EffectContext {
    state: Arc<Mutex<DisplayState>>,
    cancel: Arc<CancelToken>,
    supervisor: Weak<()>,
    rng: SmallRng,
    leds: usize,
    epoch: Instant,
}

impl EffectContext {
    pub(crate) fn new(
        state: Arc<Mutex<DisplayState>>,
        cancel: Arc<CancelToken>,
        supervisor: Weak<()>,
    ) -> Self {
        let leds = state.lock().unwrap().led_count();
        Self {
            state,
            cancel,
            supervisor,
            rng: SmallRng::from_entropy(),
            leds,
            epoch: Instant::now(),
        }
    }

    /// Sleep between frames. Returns `true` when the effect must exit:
    /// either the token was set during the wait or the supervisor is gone.
    fn pause(&self, delay: Duration) -> bool {
        if self.supervisor.upgrade().is_none() {
            return true;
        }
        self.cancel.wait_timeout(delay)
    }

    /// Milliseconds since this effect started; the physics clock.
    fn millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Snapshot of the device color the effect was started with.
    fn color(&self) -> Color {
        self.state.lock().unwrap().color
    }

    fn paint(&self, target: &LedTarget, color: Color) {
        self.state.lock().unwrap().set_leds(target, color);
    }

    /// Buffer-blank without rendering; the next `show` reveals it.
    fn blank(&self) {
        self.paint(&LedTarget::All, Color::BLACK);
    }

    fn show(&self) {
        self.state.lock().unwrap().show();
    }

    fn random_color(&mut self) -> Color {
        Color::new(
            self.rng.gen_range(0..=255),
            self.rng.gen_range(0..=255),
            self.rng.gen_range(0..=255),
        )
    }
}

// ── Fades ────────────────────────────────────────────────────────────

/// Step the targeted LEDs from black up to `color`. Returns `true` when
/// cancelled mid-fade.
fn fade_in(
    ctx: &mut EffectContext,
    color: Color,
    target: &LedTarget,
    steps: u32,
    fade_delay: Duration,
) -> bool {
    let stride = ((255.0 / steps as f32).round() as usize).max(1);
    let mut x = 0usize;
    while x <= 255 {
        ctx.paint(target, color.scaled(x as u8));
        ctx.show();
        if ctx.pause(fade_delay) {
            return true;
        }
        x += stride;
    }
    false
}

/// Step the targeted LEDs from `color` down to black.
fn fade_out(
    ctx: &mut EffectContext,
    color: Color,
    target: &LedTarget,
    steps: u32,
    fade_delay: Duration,
) -> bool {
    let stride = ((255.0 / steps as f32).round() as i32).max(1);
    let mut x = 255i32;
    while x >= 0 {
        ctx.paint(target, color.scaled(x as u8));
        ctx.show();
        if ctx.pause(fade_delay) {
            return true;
        }
        x -= stride;
    }
    false
}

/// Pulse: fade in, fade out, idle, repeat.
fn fade_in_out(ctx: &mut EffectContext, steps: u32, fade_delay: Duration, loop_delay: Duration) {
    let color = ctx.color();
    loop {
        if fade_in(ctx, color, &LedTarget::All, steps, fade_delay) {
            return;
        }
        if fade_out(ctx, color, &LedTarget::All, steps, fade_delay) {
            return;
        }
        if ctx.pause(loop_delay) {
            return;
        }
    }
}

// ── Eyes ─────────────────────────────────────────────────────────────

/// A random pair of glowing eyes: two `eye_width`-wide clusters separated
/// by `eye_space`, optionally fading out before the strip blanks.
fn halloween_eyes(
    ctx: &mut EffectContext,
    eye_width: usize,
    eye_space: usize,
    fade: bool,
    steps: u32,
    fade_delay: Duration,
    loop_delay: Duration,
) {
    let span = 2 * eye_width + eye_space;
    if ctx.leds < span {
        tracing::warn!("strip too short for halloweenEyes ({} < {span})", ctx.leds);
        return;
    }
    let color = ctx.color();
    loop {
        let left = ctx.rng.gen_range(0..=ctx.leds - span);
        let right = left + eye_width + eye_space;
        let mut pixels = Vec::with_capacity(2 * eye_width);
        for x in 0..eye_width {
            pixels.push(left + x);
            pixels.push(right + x);
        }
        let target = LedTarget::Many(pixels);

        ctx.paint(&target, color);
        ctx.show();

        if fade && fade_out(ctx, color, &target, steps, fade_delay) {
            return;
        }

        ctx.blank();
        ctx.show();
        if ctx.pause(loop_delay) {
            return;
        }
    }
}

/// One frame of the scanning eye: blanked strip, dim halo pixels on both
/// flanks, full-intensity body.
fn draw_eye(ctx: &mut EffectContext, cur: usize, eye_size: usize, color: Color) {
    ctx.blank();
    ctx.paint(
        &LedTarget::Many(vec![cur, cur + eye_size + 1]),
        color.dimmed(10),
    );
    let body: Vec<usize> = (cur + 1..=cur + eye_size).collect();
    ctx.paint(&LedTarget::Many(body), color);
    ctx.show();
}

/// Classic scanning-eye sweep, left to right and back, pausing at each end
/// of travel.
fn cylon(ctx: &mut EffectContext, eye_size: usize, eye_delay: Duration, return_delay: Duration) {
    if ctx.leds < eye_size + 3 {
        tracing::warn!("strip too short for cylon ({} LEDs)", ctx.leds);
        return;
    }
    let color = ctx.color();
    let last = ctx.leds - eye_size - 2;
    loop {
        for x in 0..=last {
            draw_eye(ctx, x, eye_size, color);
            if ctx.pause(eye_delay) {
                return;
            }
        }
        if ctx.pause(return_delay) {
            return;
        }
        for x in (0..=last).rev() {
            draw_eye(ctx, x, eye_size, color);
            if ctx.pause(eye_delay) {
                return;
            }
        }
        if ctx.pause(return_delay) {
            return;
        }
    }
}

// ── Twinkles ─────────────────────────────────────────────────────────

/// Blank the strip, then light `count` random pixels one at a time, in a
/// fixed color or a fresh random color per pixel.
fn twinkle(ctx: &mut EffectContext, count: usize, random_colors: bool, loop_delay: Duration) {
    let color = ctx.color();
    loop {
        ctx.blank();
        for _ in 0..count {
            let pixel = ctx.rng.gen_range(0..ctx.leds);
            let c = if random_colors {
                ctx.random_color()
            } else {
                color
            };
            ctx.paint(&LedTarget::One(pixel), c);
            ctx.show();
            if ctx.pause(loop_delay) {
                return;
            }
        }
        if ctx.pause(loop_delay) {
            return;
        }
    }
}

/// A field of white with a random pixel glinting dim for an instant.
fn snow_sparkle(ctx: &mut EffectContext) {
    loop {
        ctx.paint(&LedTarget::All, Color::WHITE);
        ctx.show();
        let idle = ctx.rng.gen_range(300..=1000);
        if ctx.pause(Duration::from_millis(idle)) {
            return;
        }
        let pixel = ctx.rng.gen_range(0..ctx.leds);
        ctx.paint(&LedTarget::One(pixel), Color::new(16, 16, 16));
        ctx.show();
        if ctx.pause(Duration::from_millis(20)) {
            return;
        }
    }
}

// ── Sweeps ───────────────────────────────────────────────────────────

/// Sine-wave intensity running along the strip.
fn running(ctx: &mut EffectContext, delay: Duration) {
    let color = ctx.color();
    loop {
        let mut pos = 0usize;
        for _ in 0..ctx.leds * 2 {
            pos += 1;
            for i in 0..ctx.leds {
                let level = ((i + pos) as f32).sin() * 127.0 + 128.0;
                ctx.paint(&LedTarget::One(i), color.scaled(level as u8));
            }
            ctx.show();
            if ctx.pause(delay) {
                return;
            }
        }
    }
}

/// Paint the whole strip one pixel at a time. Returns `true` on cancel.
fn color_wipe(ctx: &mut EffectContext, color: Color, delay: Duration) -> bool {
    for x in 0..ctx.leds {
        ctx.paint(&LedTarget::One(x), color);
        ctx.show();
        if ctx.pause(delay) {
            return true;
        }
    }
    false
}

/// Repeating wipe: black sweeps through, then the device color.
fn wipe(ctx: &mut EffectContext, delay: Duration, loop_delay: Duration) {
    loop {
        if color_wipe(ctx, Color::BLACK, delay) {
            return;
        }
        let color = ctx.color();
        if color_wipe(ctx, color, delay) {
            return;
        }
        if ctx.pause(loop_delay) {
            return;
        }
    }
}

/// Rolling rainbow: wheel colors spaced 40 positions apart per pixel.
fn rainbow_cycle(ctx: &mut EffectContext, delay: Duration) {
    let mut y: u16 = 1;
    loop {
        for x in 0..ctx.leds {
            ctx.paint(&LedTarget::One(x), Color::wheel(y as u8));
            y = (y + 40) % 255;
        }
        ctx.show();
        if ctx.pause(delay) {
            return;
        }
    }
}

/// Theater-style chase: every third pixel lit, phase advancing each frame.
fn marquee(ctx: &mut EffectContext, delay: Duration) {
    let color = ctx.color();
    loop {
        for x in 0..3 {
            let pixels: Vec<usize> = (x..ctx.leds).step_by(3).collect();
            ctx.paint(&LedTarget::Many(pixels.clone()), color);
            ctx.show();
            if ctx.pause(delay) {
                return;
            }
            ctx.paint(&LedTarget::Many(pixels), Color::BLACK);
        }
    }
}

/// The marquee, post Y2K: chase pixels in rolling wheel colors.
fn marquee_rainbow(ctx: &mut EffectContext, delay: Duration) {
    loop {
        let mut y: u16 = 1;
        for x in 0..3 {
            let pixels: Vec<usize> = (x..ctx.leds).step_by(3).collect();
            for &i in &pixels {
                ctx.paint(&LedTarget::One(i), Color::wheel(y as u8));
                y = (y + 40) % 255;
            }
            ctx.show();
            if ctx.pause(delay) {
                return;
            }
            ctx.paint(&LedTarget::Many(pixels), Color::BLACK);
        }
    }
}

// ── Fire ─────────────────────────────────────────────────────────────

/// Step 1: every cell sheds a random amount of heat.
fn cool_down(heat: &mut [u8], cooling: u32, rng: &mut SmallRng) {
    let max_cooldown = (cooling * 10 / heat.len() as u32) + 2;
    for h in heat.iter_mut() {
        let cooldown = rng.gen_range(0..=max_cooldown).min(255) as u8;
        *h = h.saturating_sub(cooldown);
    }
}

/// Step 2: heat drifts up the strip and diffuses. For every pixel above
/// the bottom two, `heat[k] = (heat[k-1] + 2*heat[k-2]) / 3`, walking from
/// the top down so each read sees the previous frame's values below it.
pub(crate) fn diffuse_up(heat: &mut [u8]) {
    for k in (2..heat.len()).rev() {
        heat[k] = ((u16::from(heat[k - 1]) + 2 * u16::from(heat[k - 2])) / 3) as u8;
    }
}

/// Step 3: with probability `sparking`/255ish, ignite one of the bottom
/// six pixels.
fn ignite(heat: &mut [u8], sparking: u8, rng: &mut SmallRng) {
    if rng.gen_range(0..=255u16) < u16::from(sparking) {
        let y = rng.gen_range(0..heat.len().min(6));
        heat[y] = heat[y].saturating_add(rng.gen_range(160..=255));
    }
}

/// Step 4: map a heat value to a flame color. Heat is scaled to [0, 191]
/// and split into thirds: white-hot, yellow, and a dim red glow, each with
/// a `(heat & 0x3F) << 2` ramp on its coolest channel.
pub(crate) fn heat_color(temp: u8) -> Color {
    let t = ((u16::from(temp) * 191) / 255) as u8;
    let ramp = (t & 0x3F) << 2;
    if t > 0x80 {
        Color::new(255, 255, ramp)
    } else if t > 0x40 {
        Color::new(255, ramp, 0)
    } else {
        Color::new(ramp, 0, 0)
    }
}

/// Heat-diffusion flame: cool, diffuse, spark, colorize, forever.
fn fire(ctx: &mut EffectContext, cooling: u32, sparking: u8, delay: Duration) {
    let mut heat = vec![0u8; ctx.leds];
    loop {
        cool_down(&mut heat, cooling, &mut ctx.rng);
        diffuse_up(&mut heat);
        ignite(&mut heat, sparking, &mut ctx.rng);
        for (i, &h) in heat.iter().enumerate() {
            ctx.paint(&LedTarget::One(i), heat_color(h));
        }
        ctx.show();
        if ctx.pause(delay) {
            return;
        }
    }
}

// ── Bouncing balls ───────────────────────────────────────────────────

/// Half of Earth's, which reads better on a short strip.
pub(crate) const GRAVITY: f32 = -9.8 / 2.0;

/// One ball integrated under gravity against a wall-clock millisecond
/// timeline anchored at its last bounce.
pub(crate) struct Ball {
    pub height: f32,
    pub velocity: f32,
    /// Per-ball velocity attenuation applied at each bounce; negative so
    /// the bounce also flips direction. In (-1, -0.9].
    pub dampening: f32,
    pub color: Color,
    anchor_ms: u64,
    ceiling: f32,
}

impl Ball {
    pub(crate) fn new(index: usize, count: usize, leds: usize, color: Color, now_ms: u64) -> Self {
        Self {
            height: (leds as f32 - (2 * index) as f32).max(0.0),
            velocity: 0.0,
            dampening: -0.90 - index as f32 / (count as f32).powi(2),
            color,
            anchor_ms: now_ms,
            ceiling: leds as f32,
        }
    }

    /// Integrate to `now_ms`. Returns `true` when the ball hit the floor
    /// this step.
    pub(crate) fn advance(&mut self, now_ms: u64) -> bool {
        let dt = now_ms.saturating_sub(self.anchor_ms) as f32 / 1000.0;
        self.velocity += GRAVITY * dt;
        let prev = self.height;
        self.height += self.velocity * dt;

        if self.height < 0.0 {
            self.height = 0.0;
            self.velocity *= self.dampening;
            self.anchor_ms = now_ms;
            // keep almost-dead balls moving
            if self.velocity < 0.01 {
                self.velocity = 2.0;
            }
            // no visible motion between bounces: drop it from the top again
            if self.height as i64 == prev as i64 {
                self.height = self.ceiling;
                self.velocity = 0.0;
            }
            return true;
        }
        false
    }

    pub(crate) fn position(&self, leds: usize) -> usize {
        (self.height as usize).min(leds.saturating_sub(1))
    }
}

/// Bouncing balls, one pixel each: render, then blank the buffer so the
/// next frame shows dots, not trails.
fn bouncing(ctx: &mut EffectContext, balls: usize, random_colors: bool, delay: Duration) {
    let base = ctx.color();
    let now = ctx.millis();
    let mut swarm: Vec<Ball> = (0..balls)
        .map(|i| {
            let color = if random_colors {
                ctx.random_color()
            } else {
                base
            };
            Ball::new(i, balls, ctx.leds, color, now)
        })
        .collect();

    loop {
        let now = ctx.millis();
        for ball in &mut swarm {
            ball.advance(now);
        }
        for ball in &swarm {
            ctx.paint(&LedTarget::One(ball.position(ctx.leds)), ball.color);
        }
        ctx.show();
        ctx.blank();
        if ctx.pause(delay) {
            return;
        }
    }
}

// ── Meteor ───────────────────────────────────────────────────────────

/// A meteor head sweeping the strip with a randomly decaying trail. The
/// trail lives in a persistent buffer so it keeps fading frame over frame;
/// the sweep runs `2 * leds` steps so the tail fully exits before the next
/// pass.
fn meteor_rain(ctx: &mut EffectContext, m_size: usize, trail_decay: u8, delay: Duration) {
    let color = ctx.color();
    ctx.blank();
    ctx.show();
    let mut trail = vec![Color::BLACK; ctx.leds];
    loop {
        for i in 0..ctx.leds * 2 {
            // each trailing pixel decays with a coin flip, which gives the
            // tail its ragged edge
            for j in 0..ctx.leds {
                if ctx.rng.gen_range(0..=10) > 5 {
                    trail[j] = trail[j].scaled(trail_decay);
                    ctx.paint(&LedTarget::One(j), trail[j]);
                }
            }
            for j in 0..m_size {
                let head = i as isize - j as isize;
                if head >= 0 && (head as usize) < ctx.leds {
                    trail[head as usize] = color;
                    ctx.paint(&LedTarget::One(head as usize), color);
                }
            }
            ctx.show();
            if ctx.pause(delay) {
                return;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
