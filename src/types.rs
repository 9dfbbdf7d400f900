use crate::catalog::{MAX_OCTAVE, MIN_OCTAVE};
use crate::history::HistoryBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

// ─── Pitch ──────────────────────────────────────────────────────────────────

/// A note name plus octave in scientific pitch notation (A4 = 440 Hz concert A).
///
/// The name is kept as a string so that pitches coming from outside (CLI,
/// preference files) can be represented even when they are not one of the
/// twelve recognized names; `pitch_math` treats those as unmappable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub note_name: String,
    pub octave: i32,
}

impl Pitch {
    pub fn new(note_name: &str, octave: i32) -> Self {
        Self {
            note_name: note_name.to_string(),
            octave,
        }
    }

    /// Concert A, the default target of chromatic mode.
    pub fn a4() -> Self {
        Self::new("A", 4)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note_name, self.octave)
    }
}

impl FromStr for Pitch {
    type Err = String;

    /// Parses `E2`, `C#4`, `A#-1`: everything before the trailing integer is the name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(|| format!("missing octave in {:?}", s))?;
        let (name, octave) = s.split_at(split);
        if name.is_empty() {
            return Err(format!("missing note name in {:?}", s));
        }
        let octave = octave
            .parse::<i32>()
            .map_err(|e| format!("bad octave in {:?}: {}", s, e))?;
        Ok(Self::new(name, octave))
    }
}

// ─── Tunings and modes ──────────────────────────────────────────────────────

/// A named instrument tuning. String order matters: it is the stepping order
/// for a picker and the scan order for nearest-string search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentTuning {
    pub name: String,
    pub pitches: Vec<Pitch>,
}

/// Operating mode of the tuner.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Fixed target chosen manually (A4 by default).
    Chromatic,
    /// No target; every detected pitch is its own reference.
    FreeSinging,
    /// Target is one string of the tuning, auto-tracked by proximity.
    Instrument(InstrumentTuning),
}

// ─── Detection events ───────────────────────────────────────────────────────

/// Sentinel the detector reports for "no note index" / "no octave".
pub const RAW_INDEX_NOT_AVAILABLE: i32 = -1;
/// Sentinel the detector reports when no cents offset could be computed.
pub const RAW_CENTS_NOT_AVAILABLE: f32 = -1000.0;

/// One analyzed audio frame, with the detector's sentinels already decoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Milliseconds since session start
    pub timestamp_ms: u64,
    /// Chromatic index 0 (C) to 11 (B)
    pub note_index: Option<u8>,
    pub octave: Option<i32>,
    /// Deviation of the input from the nearest chromatic pitch, in cents
    pub cents_offset: Option<f32>,
}

impl DetectionEvent {
    /// Decode a raw detector result (`-1`, `-1`, `-1000.0` mean "nothing").
    pub fn from_raw(timestamp_ms: u64, note_index: i32, octave: i32, cents: f32) -> Self {
        let note_index = (0..=11).contains(&note_index).then_some(note_index as u8);
        let octave = (MIN_OCTAVE..=MAX_OCTAVE).contains(&octave).then_some(octave);
        let cents_offset = (cents.is_finite() && (cents - RAW_CENTS_NOT_AVAILABLE).abs() > 1e-5)
            .then_some(cents);
        Self {
            timestamp_ms,
            note_index,
            octave,
            cents_offset,
        }
    }

    /// A frame in which nothing was detected.
    pub fn silence(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            note_index: None,
            octave: None,
            cents_offset: None,
        }
    }

    /// A frame carrying a note. An index above 11 is stored as unavailable.
    pub fn detected(timestamp_ms: u64, note_index: u8, octave: i32, cents_offset: f32) -> Self {
        Self {
            timestamp_ms,
            note_index: (note_index <= 11).then_some(note_index),
            octave: Some(octave),
            cents_offset: Some(cents_offset),
        }
    }
}

// ─── Tuner state snapshot ───────────────────────────────────────────────────

/// Shown next to the displayed note when detection is more than eleven
/// semitones away from the target and the note was clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeIndicator {
    #[serde(rename = "+")]
    Above,
    #[serde(rename = "-")]
    Below,
}

impl fmt::Display for RangeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeIndicator::Above => write!(f, "+"),
            RangeIndicator::Below => write!(f, "-"),
        }
    }
}

/// One sample of the offset graph. `value` is the offset normalized to
/// [-1, 1] (±50 cents); `None` marks a gap where nothing was detected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp_ms: u64,
    pub value: Option<f32>,
}

/// Complete tuner display state. Produced only by the engine, read by everyone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerState {
    /// A4 reference frequency in Hz
    pub reference_hz: f32,
    pub mode_name: String,
    /// None iff the mode is free singing
    pub target: Option<Pitch>,
    pub displayed_note: Option<Pitch>,
    pub range_indicator: Option<RangeIndicator>,
    pub cents_offset: f32,
    pub is_note_detected: bool,
    pub is_tuned: bool,
    pub history: HistoryBuffer,
    /// Offset is measured against the detected pitch itself (free singing)
    pub is_dynamic_centering: bool,
    /// Presentation toggle: show the numeric cents value
    pub show_cents: bool,
    pub has_permission: bool,
    pub is_recording: bool,
}

impl Default for TunerState {
    fn default() -> Self {
        Self {
            reference_hz: crate::engine::DEFAULT_REFERENCE_HZ,
            mode_name: crate::catalog::CHROMATIC_MODE_NAME.to_string(),
            target: Some(Pitch::a4()),
            displayed_note: None,
            range_indicator: None,
            cents_offset: 0.0,
            is_note_detected: false,
            is_tuned: false,
            history: HistoryBuffer::new(),
            is_dynamic_centering: false,
            show_cents: false,
            has_permission: false,
            is_recording: false,
        }
    }
}

impl fmt::Display for TunerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            Some(p) => p.to_string(),
            None => "---".to_string(),
        };
        let note = match (&self.displayed_note, self.range_indicator) {
            (Some(p), Some(ind)) => format!("{}{}", p, ind),
            (Some(p), None) => p.to_string(),
            (None, _) => "---".to_string(),
        };
        write!(
            f,
            "mode={:<20} A4={:.1}Hz  target={:<4} note={:<5} cents={:+6.1} {}",
            self.mode_name,
            self.reference_hz,
            target,
            note,
            self.cents_offset,
            if self.is_tuned { "TUNED" } else { "" },
        )
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

/// Requests from the presentation layer to the state owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TunerCommand {
    SelectMode(String),
    SetTargetPitch(Option<Pitch>),
    SetReferenceFrequency(f32),
    ToggleCentsDisplay,
    PermissionChanged(bool),
    RequestStart,
    RequestStop,
    SaveDefaultMode(String),
    Shutdown,
}

/// Everything the coordinator consumes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Detection(DetectionEvent),
    Command(TunerCommand),
    /// Result of a background detector start
    StartCompleted { generation: u64, started: bool },
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the tuning session. Clones share the same origin.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
