use crate::detector::{DetectionSink, PitchDetector};
use crate::error::DetectorError;
use crate::pitch_math::{classify_frequency, frequency_of, shift_by_cents};
use crate::types::*;
use log::{info, warn};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Scripted stand-in for the pitch detection engine.
///
/// Plays a sequence of gestures (tones, glides, vibrato, silence) as
/// synthetic input frequencies and reports each analysis frame the way the
/// real engine does: nearest chromatic note under the current reference plus
/// cents from it, or the "nothing" sentinels.
pub struct SimulatedDetector {
    sink: DetectionSink,
    demo: String,
    initialized: bool,
    running: Arc<AtomicBool>,
    /// f32 bits of the A4 reference, shared with the playback thread
    reference_bits: Arc<AtomicU32>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedDetector {
    pub fn new(sink: DetectionSink, demo: &str) -> Self {
        Self {
            sink,
            demo: demo.to_string(),
            initialized: false,
            running: Arc::new(AtomicBool::new(false)),
            reference_bits: Arc::new(AtomicU32::new(440.0f32.to_bits())),
            worker: None,
        }
    }
}

impl PitchDetector for SimulatedDetector {
    fn initialize(&mut self) -> Result<(), DetectorError> {
        if !self.initialized {
            info!("Simulated detector ready (demo: {})", self.demo);
            self.initialized = true;
        }
        Ok(())
    }

    fn start(&mut self, sample_rate: u32, buffer_size: usize) -> Result<(), DetectorError> {
        if !self.initialized {
            return Err(DetectorError::NotInitialized);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(DetectorError::AlreadyRunning);
        }
        if sample_rate == 0 || buffer_size == 0 {
            return Err(DetectorError::StartFailed(format!(
                "invalid format {} Hz / {} samples",
                sample_rate, buffer_size
            )));
        }

        let frame_ms = (buffer_size as u64 * 1000 / sample_rate as u64).max(1);
        let gestures = demo_sequence(&self.demo);
        let playback = Playback {
            sink: self.sink.clone(),
            running: Arc::clone(&self.running),
            reference_bits: Arc::clone(&self.reference_bits),
            frame_ms,
        };

        self.running.store(true, Ordering::SeqCst);
        let worker = thread::Builder::new()
            .name("simulated-detector".into())
            .spawn(move || playback.run(&gestures))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                DetectorError::StartFailed(e.to_string())
            })?;
        self.worker = Some(worker);
        info!("Simulated detector started: {} ms frames", frame_ms);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Simulated detector thread panicked");
            }
            info!("Simulated detector stopped");
        }
    }

    fn set_reference_frequency(&mut self, hz: f32) {
        self.reference_bits.store(hz.to_bits(), Ordering::SeqCst);
    }
}

impl Drop for SimulatedDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the playback thread.
struct Playback {
    sink: DetectionSink,
    running: Arc<AtomicBool>,
    reference_bits: Arc<AtomicU32>,
    frame_ms: u64,
}

impl Playback {
    /// Loop the gesture sequence until stopped or the coordinator goes away.
    fn run(&self, gestures: &[Gesture]) {
        info!("Simulator starting demo sequence...");
        'outer: loop {
            for gesture in gestures {
                if !self.execute(gesture) {
                    break 'outer;
                }
            }
            info!("Demo sequence complete, repeating");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Play one gesture. Returns false when playback should end.
    fn execute(&self, gesture: &Gesture) -> bool {
        match gesture {
            Gesture::Silence { ms } => {
                info!("  silence {}ms", ms);
                (0..self.frames(*ms)).all(|_| self.emit(None))
            }

            Gesture::Tone { pitch, cents, ms } => {
                info!("  tone {} {:+.0} cents for {}ms", pitch, cents, ms);
                let hz = shift_by_cents(frequency_of(pitch, 440.0), *cents);
                (0..self.frames(*ms)).all(|_| self.emit(Some(hz)))
            }

            Gesture::Tune { pitch, from_cents, to_cents, ms } => {
                info!("  tune {} {:+.0} → {:+.0} cents over {}ms", pitch, from_cents, to_cents, ms);
                let base = frequency_of(pitch, 440.0);
                let n = self.frames(*ms);
                (0..n).all(|i| {
                    let t = i as f32 / n.max(1) as f32;
                    let cents = lerp(*from_cents, *to_cents, smoothstep(t));
                    self.emit(Some(shift_by_cents(base, cents)))
                })
            }

            Gesture::Glide { from, to, ms } => {
                info!("  glide {} → {} over {}ms", from, to, ms);
                let (a, b) = (frequency_of(from, 440.0), frequency_of(to, 440.0));
                let n = self.frames(*ms);
                (0..n).all(|i| {
                    let t = i as f32 / n.max(1) as f32;
                    // Geometric interpolation: constant speed in cents
                    self.emit(Some(a * (b / a).powf(t)))
                })
            }

            Gesture::Vibrato { pitch, width_cents, rate_hz, ms } => {
                info!("  vibrato {} ±{:.0} cents at {}Hz for {}ms", pitch, width_cents, rate_hz, ms);
                let base = frequency_of(pitch, 440.0);
                let frame_s = self.frame_ms as f32 / 1000.0;
                (0..self.frames(*ms)).all(|i| {
                    let cents = width_cents * (2.0 * PI * rate_hz * i as f32 * frame_s).sin();
                    self.emit(Some(shift_by_cents(base, cents)))
                })
            }

            Gesture::Dropout => {
                info!("  dropout");
                self.emit(None)
            }
        }
    }

    fn frames(&self, ms: u32) -> u64 {
        (ms as u64 / self.frame_ms).max(1)
    }

    /// Report one frame and wait out its duration.
    fn emit(&self, hz: Option<f32>) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let reference = f32::from_bits(self.reference_bits.load(Ordering::SeqCst));
        let delivered = match hz.and_then(|f| classify_frequency(f, reference)) {
            Some((index, octave, cents)) => self.sink.on_result(index as i32, octave, cents),
            None => self.sink.on_result(
                RAW_INDEX_NOT_AVAILABLE,
                RAW_INDEX_NOT_AVAILABLE,
                RAW_CENTS_NOT_AVAILABLE,
            ),
        };
        thread::sleep(Duration::from_millis(self.frame_ms));
        delivered
    }
}

// ─── Gesture types ──────────────────────────────────────────────────────────

enum Gesture {
    Silence { ms: u32 },
    /// Steady note, detuned by a fixed amount
    Tone { pitch: Pitch, cents: f32, ms: u32 },
    /// Peg turn: detune moves smoothly from one value to another
    Tune { pitch: Pitch, from_cents: f32, to_cents: f32, ms: u32 },
    Glide { from: Pitch, to: Pitch, ms: u32 },
    Vibrato { pitch: Pitch, width_cents: f32, rate_hz: f32, ms: u32 },
    /// A single missed frame
    Dropout,
}

fn p(name: &str, octave: i32) -> Pitch {
    Pitch::new(name, octave)
}

/// Demo sequences by name: "strings" (default) or "glide".
fn demo_sequence(name: &str) -> Vec<Gesture> {
    match name {
        "glide" => glide_sequence(),
        "strings" => strings_sequence(),
        other => {
            warn!("Unknown demo {:?}, using \"strings\"", other);
            strings_sequence()
        }
    }
}

/// A guitar tune-up: each string starts off and is brought in, with the odd
/// dropped frame, then a note far above the last target.
fn strings_sequence() -> Vec<Gesture> {
    let mut seq = vec![Gesture::Silence { ms: 400 }];
    let strings = [
        (p("E", 2), -35.0),
        (p("A", 2), 28.0),
        (p("D", 3), -18.0),
        (p("G", 3), 42.0),
        (p("B", 3), -12.0),
        (p("E", 4), 22.0),
    ];
    for (pitch, detune) in strings {
        seq.push(Gesture::Tone { pitch: pitch.clone(), cents: detune, ms: 500 });
        seq.push(Gesture::Dropout);
        seq.push(Gesture::Tune { pitch: pitch.clone(), from_cents: detune, to_cents: 1.5, ms: 1200 });
        seq.push(Gesture::Tone { pitch, cents: 1.5, ms: 600 });
        seq.push(Gesture::Silence { ms: 500 });
    }
    seq.push(Gesture::Vibrato { pitch: p("E", 5), width_cents: 15.0, rate_hz: 5.5, ms: 1200 });
    seq.push(Gesture::Silence { ms: 800 });
    seq
}

/// Slow two-octave glide up and back, for watching the display clamp.
fn glide_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Silence { ms: 300 },
        Gesture::Tone { pitch: p("C", 3), cents: 0.0, ms: 600 },
        Gesture::Glide { from: p("C", 3), to: p("C", 5), ms: 8000 },
        Gesture::Tone { pitch: p("C", 5), cents: 0.0, ms: 600 },
        Gesture::Glide { from: p("C", 5), to: p("C", 3), ms: 8000 },
        Gesture::Silence { ms: 600 },
    ]
}

// ─── Math helpers ───────────────────────────────────────────────────────────

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
