use tuner_engine::console_display;
use tuner_engine::coordinator::{Coordinator, TunerHandle};
use tuner_engine::detector::{DetectionSink, DetectorHandle};
use tuner_engine::preferences::Preferences;
use tuner_engine::simulator::SimulatedDetector;
use tuner_engine::types::*;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "tuner-engine")]
#[command(about = "Instrument and voice tuner driven by a simulated pitch detector")]
struct Cli {
    /// A4 reference frequency in Hz (clamped to 400-500)
    #[arg(long, default_value_t = 440.0)]
    reference_hz: f32,

    /// Mode to open in: "Chromatic", "Free Singing" or an instrument tuning
    /// name. Defaults to the saved preference.
    #[arg(long)]
    mode: Option<String>,

    /// Preferences file
    #[arg(long, default_value = "./tuner_prefs.json")]
    prefs: PathBuf,

    /// Save the selected mode as the default for future runs
    #[arg(long)]
    save_default: bool,

    /// Simulator demo sequence: "strings" (guitar tune-up) or "glide"
    #[arg(long, default_value = "strings")]
    demo: String,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,

    /// Print one JSON state per line instead of the dashboard
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds (runs until Ctrl+C when omitted)
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let clock = SessionClock::new();

    let prefs = Preferences::load(&cli.prefs).unwrap_or_default();
    let mode = cli
        .mode
        .clone()
        .unwrap_or_else(|| prefs.default_mode_or_chromatic().to_string());

    info!("═══════════════════════════════════════════════");
    info!("  TUNER ENGINE v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode: {}", mode);
    info!("  A4: {:.1} Hz", cli.reference_hz);
    info!("  Detector: SIMULATOR ({})", cli.demo);
    info!("═══════════════════════════════════════════════");

    // Channel: detector + commands → coordinator
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);

    // Channel: coordinator → display
    let (state_tx, state_rx) = bounded::<TunerState>(256);

    let sink = DetectionSink::new(input_tx.clone(), clock.clone());
    let detector = DetectorHandle::new(
        Box::new(SimulatedDetector::new(sink, &cli.demo)),
        input_tx.clone(),
    );
    if let Err(e) = detector.initialize() {
        error!("Detector initialization failed: {}", e);
    }

    let mut handles = Vec::new();

    let hz = cli.display_hz;
    let json = cli.json;
    handles.push(thread::Builder::new().name("display".into()).spawn(move || {
        console_display::ConsoleDisplay::new(state_rx, hz, json).run();
    })?);

    let coord_clock = clock.clone();
    let reference_hz = cli.reference_hz;
    let coord_mode = mode.clone();
    let prefs_path = cli.prefs.clone();
    handles.push(thread::Builder::new().name("coordinator".into()).spawn(move || {
        let mut coord = Coordinator::new(input_rx, vec![state_tx], Some(detector), coord_clock)
            .with_default_mode(&coord_mode)
            .with_reference_frequency(reference_hz)
            .with_preferences(prefs_path);
        coord.run();
    })?);

    let tuner = TunerHandle::new(input_tx);
    if cli.save_default {
        tuner.save_default_mode(&mode);
    }
    // Stands in for the platform microphone prompt
    tuner.notify_permission_granted(true);

    match cli.seconds {
        Some(secs) => {
            thread::sleep(Duration::from_secs(secs));
            info!("Run time elapsed, stopping");
            tuner.request_stop();
            tuner.shutdown();
        }
        None => info!("Running. Press Ctrl+C to stop."),
    }

    for h in handles {
        let _ = h.join();
    }
    Ok(())
}
