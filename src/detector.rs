//! Boundary to the external pitch detector.
//!
//! The detector runs on its own context (an audio thread, a native callback)
//! and never touches tuner state. It reports results through a
//! [`DetectionSink`], which turns them into `InputEvent`s on the
//! coordinator's channel. Start and stop can be slow, so [`DetectorHandle`]
//! runs them on short-lived background threads.

use crate::error::DetectorError;
use crate::types::*;
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

pub const SAMPLE_RATE: u32 = 44100;
/// Samples per analysis frame (~46 ms at 44.1 kHz).
pub const BUFFER_SIZE: usize = 2048;

/// Contract of the pitch detection engine.
pub trait PitchDetector: Send {
    /// One-time setup (loading a native library, opening a device).
    /// Must be idempotent.
    fn initialize(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }

    /// Begin capture and analysis. Must not be called while running.
    fn start(&mut self, sample_rate: u32, buffer_size: usize) -> Result<(), DetectorError>;

    /// Halt capture. Safe to call when not running.
    fn stop(&mut self);

    /// A4 reference used to map raw frequency to chromatic note and cents.
    fn set_reference_frequency(&mut self, hz: f32);
}

/// Where a detector delivers its per-frame results.
#[derive(Clone)]
pub struct DetectionSink {
    tx: Sender<InputEvent>,
    clock: SessionClock,
}

impl DetectionSink {
    pub fn new(tx: Sender<InputEvent>, clock: SessionClock) -> Self {
        Self { tx, clock }
    }

    /// Raw result callback: `note_index` 0–11 or -1, `octave` 0–8 or -1,
    /// `cents` vs the detected chromatic pitch or -1000.0.
    /// Returns false once the coordinator is gone.
    pub fn on_result(&self, note_index: i32, octave: i32, cents: f32) -> bool {
        let event = DetectionEvent::from_raw(self.clock.now_ms(), note_index, octave, cents);
        self.tx.send(InputEvent::Detection(event)).is_ok()
    }
}

fn lock(detector: &Mutex<Box<dyn PitchDetector>>) -> MutexGuard<'_, Box<dyn PitchDetector>> {
    detector.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared ownership of the detector plus start/stop dispatch.
///
/// Each stop bumps the generation. A start thread that finds its generation
/// stale skips `start`, which is how a stop cancels an in-flight start.
#[derive(Clone)]
pub struct DetectorHandle {
    detector: Arc<Mutex<Box<dyn PitchDetector>>>,
    generation: Arc<AtomicU64>,
    events: Sender<InputEvent>,
}

impl DetectorHandle {
    pub fn new(detector: Box<dyn PitchDetector>, events: Sender<InputEvent>) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
            generation: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    pub fn initialize(&self) -> Result<(), DetectorError> {
        lock(&self.detector).initialize()
    }

    /// Start on a background thread. Completion arrives as
    /// `InputEvent::StartCompleted` carrying the returned generation.
    pub fn spawn_start(&self, sample_rate: u32, buffer_size: usize, reference_hz: f32) -> u64 {
        let generation = self.generation.load(Ordering::SeqCst);
        let detector = Arc::clone(&self.detector);
        let current = Arc::clone(&self.generation);
        let events = self.events.clone();

        let spawned = thread::Builder::new()
            .name("detector-start".into())
            .spawn(move || {
                let started = {
                    let mut d = lock(&detector);
                    if current.load(Ordering::SeqCst) != generation {
                        info!("Detector start cancelled before it began");
                        false
                    } else {
                        d.set_reference_frequency(reference_hz);
                        match d.start(sample_rate, buffer_size) {
                            Ok(()) => true,
                            Err(e) => {
                                warn!("{}", e);
                                false
                            }
                        }
                    }
                };
                let _ = events.send(InputEvent::StartCompleted {
                    generation,
                    started,
                });
            });

        if let Err(e) = spawned {
            error!("Failed to spawn detector start thread: {}", e);
            let _ = self.events.send(InputEvent::StartCompleted {
                generation,
                started: false,
            });
        }
        generation
    }

    /// Invalidate any in-flight start and stop the detector in the background.
    pub fn spawn_stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let detector = Arc::clone(&self.detector);
        let spawned = thread::Builder::new()
            .name("detector-stop".into())
            .spawn(move || lock(&detector).stop());
        if let Err(e) = spawned {
            error!("Failed to spawn detector stop thread: {}", e);
        }
    }

    /// Stop synchronously (used on shutdown).
    pub fn stop_now(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.detector).stop();
    }

    pub fn set_reference_frequency(&self, hz: f32) {
        lock(&self.detector).set_reference_frequency(hz);
    }
}
