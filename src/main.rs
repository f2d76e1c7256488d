//! LED Strip HTTP API Server
//!
//! Runs a web server on the Pi that accepts commands to drive an APA102
//! LED strip: static colors, per-pixel on/off, global brightness, and a
//! catalog of animated effects.
//!
//! ## Architecture
//! - **Control thread** (std::thread): owns the display state and the
//!   effect scheduler, processes one command at a time
//! - **Effect thread** (std::thread): at most one, spawned per effect,
//!   stopped cooperatively before the next command is applied
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands
//!   via channel and awaits each reply
//!
//! ## Usage
//! ```sh
//! ./target/release/led-strip-rs --leds 8 --port 8080
//! ./target/release/led-strip-rs test   # wiring smoke check
//! ```

use clap::{Parser, Subcommand};
use led_strip_rs::controller::{Controller, control_loop};
use led_strip_rs::server::{self, AppState};
use led_strip_rs::surface::{MemoryStrip, PixelStrip};
use led_strip_rs::{Color, StripConfig, is_running, setup_signal_handler};
use std::sync::mpsc;
use std::time::Duration;

/// LED Strip HTTP API Server
#[derive(Parser)]
#[command(name = "led-strip-rs")]
#[command(about = "HTTP API server for driving effects on an APA102 LED strip")]
#[command(version)]
struct Args {
    /// Number of LEDs on the strip
    #[arg(long, default_value = "8")]
    leds: usize,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Initial global brightness (0-31)
    #[arg(long, default_value = "15")]
    brightness: i64,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Light a few known pixels, hold, then clear (wiring smoke check)
    Test,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing subscriber for request logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();
    let config = StripConfig::new(args.leds, args.brightness);
    let strip = build_strip(config.leds);

    if let Some(Cmd::Test) = args.command {
        run_wiring_test(strip, config.brightness);
        return;
    }

    tracing::info!("LED Strip HTTP Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Strip: {} LEDs, brightness {}", config.leds, config.brightness);
    tracing::info!("Port: {}", args.port);

    // Create the channel for sending commands to the control thread.
    let (tx, rx) = mpsc::channel();

    // Spawn the control thread; it owns the strip from here on.
    let controller = Controller::new(strip, config);
    let control_handle = std::thread::spawn(move || {
        control_loop(rx, controller);
    });

    let app = server::create_router(AppState {
        control_tx: tx.clone(),
    });

    // Start listening
    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl http://localhost:{}/api/v1/status", args.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // Serve until Ctrl-C flips the running flag.
    let running = setup_signal_handler();
    let shutdown = async move {
        while is_running(&running) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tracing::info!("shutdown requested");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    // Dropping the last sender closes the channel; the control thread
    // stops the active effect and blanks the strip before exiting.
    drop(tx);
    let _ = control_handle.join();
    tracing::info!("goodbye");
}

/// Open the real strip when built with the `hardware` feature; otherwise
/// (or if the bus is unavailable) fall back to an in-memory buffer so the
/// server still runs for development.
fn build_strip(leds: usize) -> Box<dyn PixelStrip> {
    #[cfg(feature = "hardware")]
    match led_strip_rs::surface::BlinktStrip::new(leds) {
        Ok(strip) => return Box::new(strip),
        Err(e) => {
            tracing::error!("failed to open the strip: {e}; falling back to in-memory buffer");
        }
    }

    #[cfg(not(feature = "hardware"))]
    tracing::warn!("built without the 'hardware' feature; driving an in-memory strip");

    Box::new(MemoryStrip::new(leds))
}

/// Bring-up check: a few distinct pixels you can eyeball.
fn run_wiring_test(mut strip: Box<dyn PixelStrip>, brightness: u8) {
    tracing::info!("wiring test: red @1, white @4, green @6 for 10 seconds");
    strip.clear();
    strip.set_pixel(1, Color::new(255, 0, 0).packed(), brightness);
    strip.set_pixel(4, Color::WHITE.packed(), brightness);
    strip.set_pixel(6, Color::new(0, 255, 0).packed(), brightness);
    if let Err(e) = strip.show() {
        tracing::error!("render failed: {e}");
        return;
    }

    std::thread::sleep(Duration::from_secs(10));

    strip.clear();
    if let Err(e) = strip.show() {
        tracing::error!("render failed: {e}");
    }
}
