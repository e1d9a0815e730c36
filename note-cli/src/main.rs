//! # note-detect
//!
//! Listens to the default microphone and prints the stabilized note, its
//! frequency and its deviation from equal temperament on a single
//! continuously updated terminal line.
//!
//! ## Threads
//! - **Main thread**: owns the capture stream and runs the frame clock
//! - **Audio thread**: cpal callback, frames the signal into a bounded channel
//! - **Input thread**: waits for Enter and sends the stop signal

mod display;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use log::{debug, info};
use note_core::{Detector, DetectorConfig, FrameClock, MicrophoneSource};

use display::TerminalDisplay;

#[derive(Parser, Debug)]
#[command(name = "note-detect", version, about = "Real-time note detection from the microphone")]
struct Args {
    /// JSON configuration file; defaults are used for anything it omits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop automatically after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match &args.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    debug!("Effective configuration: {:?}", config);

    if args.dump_config {
        let json = serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
        println!("{}", json);
        return Ok(());
    }

    let source = MicrophoneSource::new(&config);
    let mut detector = Detector::new(source, config);
    detector.start().context("Failed to start audio capture")?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    // With a time limit, a closed stdin must not cut the run short.
    spawn_enter_listener(stop_tx.clone(), args.duration.is_none());
    if let Some(seconds) = args.duration {
        let limit = Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Invalid duration: {}", seconds))?;
        spawn_timer(stop_tx, limit);
    }

    eprintln!("Listening... press Enter to stop.");
    let mut display = TerminalDisplay::stdout();
    let clock = FrameClock::from_config(detector.config());
    let summary = clock.run(&mut detector, &mut display, &stop_rx);
    display.finish().context("Failed to write to terminal")?;

    info!("{} ticks, {} with a fresh frame", summary.ticks, summary.frames);
    Ok(())
}

/// Sends the stop signal when a line arrives on stdin, or on EOF if
/// `stop_on_eof` is set.
fn spawn_enter_listener(stop_tx: Sender<()>, stop_on_eof: bool) {
    thread::spawn(move || {
        if wait_for_enter(io::stdin().lock(), stop_on_eof) {
            let _ = stop_tx.try_send(());
        }
    });
}

/// Blocks until `input` yields a line or ends. Returns whether to stop.
fn wait_for_enter(mut input: impl BufRead, stop_on_eof: bool) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => true,
        Ok(_) => stop_on_eof,
        Err(e) => {
            debug!("Could not read stdin: {}", e);
            stop_on_eof
        }
    }
}

fn spawn_timer(stop_tx: Sender<()>, limit: Duration) {
    thread::spawn(move || {
        thread::sleep(limit);
        debug!("Duration of {:?} reached", limit);
        let _ = stop_tx.try_send(());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn enter_always_stops() {
        assert!(wait_for_enter(Cursor::new("\n"), false));
        assert!(wait_for_enter(Cursor::new("q\n"), true));
    }

    #[test]
    fn closed_stdin_only_stops_without_a_time_limit() {
        assert!(wait_for_enter(Cursor::new(""), true));
        assert!(!wait_for_enter(Cursor::new(""), false));
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from(["note-detect", "--duration", "10", "-v"]).unwrap();
        assert_eq!(args.duration, Some(10.0));
        assert!(args.verbose);
        assert!(args.config.is_none());
        assert!(!args.dump_config);
    }
}
