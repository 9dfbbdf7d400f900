//! Tuning state engine: the single owner of `TunerState`.
//!
//! Pure and synchronous. Every operation takes the data it needs (including
//! timestamps) and leaves a valid state behind; threading and timers live in
//! the coordinator.

use crate::debouncer::DetectionDebouncer;
use crate::pitch_math::{
    cents_between, frequency_of, from_semitone_index, shift_by_cents, to_semitone_index,
};
use crate::target_selector;
use crate::types::*;
use log::{debug, trace, warn};

pub const DEFAULT_REFERENCE_HZ: f32 = 440.0;
pub const MIN_REFERENCE_HZ: f32 = 400.0;
pub const MAX_REFERENCE_HZ: f32 = 500.0;
/// Reference changes smaller than this are ignored.
pub const REFERENCE_EPSILON_HZ: f32 = 0.01;

/// |offset| at or below this counts as in tune.
pub const CENTS_IN_TUNE_THRESHOLD: f32 = 10.0;
/// Offset that maps to the edge (±1.0) of the history graph.
pub const CENTS_RANGE_FOR_VISUALIZER: f32 = 50.0;
/// Beyond this many semitones from the target the displayed note is clamped.
pub const DISPLAY_NOTE_BOUNDARY_SEMITONES: i32 = 11;

/// Display outcome of one detected frame.
struct Reading {
    displayed_note: Option<Pitch>,
    range_indicator: Option<RangeIndicator>,
    cents_offset: f32,
}

pub struct TuningStateEngine {
    state: TunerState,
    mode: Mode,
    debouncer: DetectionDebouncer,
}

impl TuningStateEngine {
    pub fn new() -> Self {
        Self {
            state: TunerState::default(),
            mode: Mode::Chromatic,
            debouncer: DetectionDebouncer::new(),
        }
    }

    pub fn state(&self) -> &TunerState {
        &self.state
    }

    /// Owned copy for publishing.
    pub fn snapshot(&self) -> TunerState {
        self.state.clone()
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// When the pending loss-of-signal clear is due, if any.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.debouncer.deadline_ms()
    }

    // ─── Commands ───────────────────────────────────────────────────────────

    /// Switch mode by name. Returns false if the name resolves to the
    /// current mode.
    pub fn select_mode(&mut self, name: &str) -> bool {
        let mode = Mode::from_name(name);
        if mode.name() == self.state.mode_name {
            return false;
        }
        self.apply_mode(mode);
        true
    }

    fn apply_mode(&mut self, mode: Mode) {
        let target = target_selector::resolve_for_mode(&mode, self.state.target.as_ref());
        debug!(
            "Mode → {} (target {})",
            mode.name(),
            target.as_ref().map_or("none".to_string(), |p| p.to_string())
        );

        self.state.mode_name = mode.name().to_string();
        self.state.target = target;
        self.state.is_dynamic_centering = mode.is_free_singing();
        self.mode = mode;

        self.clear_display();
        self.state.history.clear();
        self.debouncer.cancel();
    }

    /// Manual target pick. Ignored in free singing (which has no target) and
    /// for `None`, since the other modes always carry one.
    pub fn set_target_pitch(&mut self, pitch: Option<Pitch>) -> bool {
        if self.mode.is_free_singing() {
            warn!("Target pitch ignored in {} mode", self.mode.name());
            return false;
        }
        let Some(pitch) = pitch else {
            warn!("Clearing the target is only possible by entering free singing");
            return false;
        };
        if self.state.target.as_ref() == Some(&pitch) {
            return false;
        }
        debug!("Manual target → {}", pitch);
        self.state.target = Some(pitch);
        self.debouncer.cancel();
        self.clear_display();
        true
    }

    /// Clamp to the supported range and apply. Returns the new reference when
    /// it changed, so the caller can forward it to the detector.
    pub fn set_reference_frequency(&mut self, hz: f32) -> Option<f32> {
        if !hz.is_finite() {
            warn!("Ignoring non-finite reference frequency");
            return None;
        }
        let clamped = hz.clamp(MIN_REFERENCE_HZ, MAX_REFERENCE_HZ);
        if (clamped - self.state.reference_hz).abs() <= REFERENCE_EPSILON_HZ {
            return None;
        }
        debug!("Reference A4 → {:.2} Hz", clamped);
        self.state.reference_hz = clamped;
        Some(clamped)
    }

    pub fn toggle_cents_display(&mut self) {
        self.state.show_cents = !self.state.show_cents;
    }

    pub fn set_permission(&mut self, granted: bool) {
        self.state.has_permission = granted;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.state.is_recording = recording;
    }

    /// Detector stopped: no timer, blank display, fresh graph.
    pub fn on_stopped(&mut self) {
        self.state.is_recording = false;
        self.debouncer.cancel();
        self.clear_display();
        self.state.history.clear();
    }

    // ─── Detection ──────────────────────────────────────────────────────────

    /// Process one analyzed frame.
    pub fn on_detection(&mut self, event: &DetectionEvent) {
        match Self::detected(event) {
            Some((detected_index, detected_pitch, raw_cents)) => {
                self.on_note(event.timestamp_ms, detected_index, detected_pitch, raw_cents)
            }
            None => self.on_no_note(event.timestamp_ms),
        }
    }

    /// Semitone index, pitch and raw cents when the frame carries a usable note.
    fn detected(event: &DetectionEvent) -> Option<(i32, Pitch, f32)> {
        let note_index = event.note_index?;
        let octave = event.octave?;
        let cents = event.cents_offset?;
        if note_index > 11 {
            return None;
        }
        let index = octave.checked_add(1)?.checked_mul(12)?.checked_add(note_index as i32)?;
        let pitch = from_semitone_index(index)?;
        Some((index, pitch, cents))
    }

    fn on_no_note(&mut self, timestamp_ms: u64) {
        self.debouncer.on_detection_absent(timestamp_ms);
        self.state.history.append(None, timestamp_ms);
        // The rest of the display stays until the debounce clears it, so a
        // single dropped frame does not flicker.
        if self.state.is_note_detected {
            self.state.is_note_detected = false;
            self.state.is_tuned = false;
        }
    }

    fn on_note(&mut self, timestamp_ms: u64, detected_index: i32, detected: Pitch, raw_cents: f32) {
        self.debouncer.on_detection_present();

        if let Mode::Instrument(tuning) = &self.mode {
            if let Some(next) =
                target_selector::auto_select(tuning, detected_index, self.state.target.as_ref())
            {
                debug!("Auto-selected string {} (detected {})", next, detected);
                self.state.target = Some(next);
            }
        }

        let reading = self.read(detected_index, detected, raw_cents);

        let normalized = (reading.cents_offset / CENTS_RANGE_FOR_VISUALIZER).clamp(-1.0, 1.0);
        self.state.history.append(Some(normalized), timestamp_ms);

        self.state.is_tuned = reading.cents_offset.abs() <= CENTS_IN_TUNE_THRESHOLD;
        self.state.displayed_note = reading.displayed_note;
        self.state.range_indicator = reading.range_indicator;
        self.state.cents_offset = reading.cents_offset;
        self.state.is_note_detected = true;
        trace!("{}", self.state);
    }

    /// Offset and displayed note for a detected frame under the current mode.
    fn read(&self, detected_index: i32, detected: Pitch, raw_cents: f32) -> Reading {
        let unclamped = |detected: Pitch| Reading {
            displayed_note: Some(detected),
            range_indicator: None,
            cents_offset: raw_cents,
        };

        let target = match &self.state.target {
            Some(t) if !self.state.is_dynamic_centering => t,
            _ => return unclamped(detected),
        };

        let reference = self.state.reference_hz;
        let exact_hz = shift_by_cents(frequency_of(&detected, reference), raw_cents);
        let target_index = to_semitone_index(target);
        let offset = cents_between(exact_hz, frequency_of(target, reference));

        let (Some(target_index), Some(cents_offset)) = (target_index, offset) else {
            warn!("Target {} has no usable frequency, using raw offset", target);
            return unclamped(detected);
        };

        let delta = detected_index - target_index;
        let (displayed_note, range_indicator) = if delta > DISPLAY_NOTE_BOUNDARY_SEMITONES {
            (
                from_semitone_index(target_index + DISPLAY_NOTE_BOUNDARY_SEMITONES),
                Some(RangeIndicator::Above),
            )
        } else if delta < -DISPLAY_NOTE_BOUNDARY_SEMITONES {
            (
                from_semitone_index(target_index - DISPLAY_NOTE_BOUNDARY_SEMITONES),
                Some(RangeIndicator::Below),
            )
        } else {
            (Some(detected), None)
        };

        Reading {
            displayed_note,
            range_indicator,
            cents_offset,
        }
    }

    // ─── Timer ──────────────────────────────────────────────────────────────

    /// Advance the loss-of-signal timer. Returns true if the display was cleared.
    pub fn on_tick(&mut self, now_ms: u64) -> bool {
        if !self.debouncer.poll(now_ms) || self.state.is_note_detected {
            return false;
        }
        debug!("No detection for {}ms, clearing display", crate::debouncer::NO_DETECTION_TIMEOUT_MS);
        self.clear_display();
        true
    }

    /// Blank the note readout. Target and history are left alone.
    fn clear_display(&mut self) {
        self.state.displayed_note = None;
        self.state.range_indicator = None;
        self.state.cents_offset = 0.0;
        self.state.is_note_detected = false;
        self.state.is_tuned = false;
    }
}

impl Default for TuningStateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CHROMATIC_MODE_NAME, FREE_SINGING_MODE_NAME};
    use crate::history::HISTORY_WINDOW_MS;

    const GUITAR: &str = "Guitar (Standard)";

    /// Detection at an exact semitone index with a raw offset.
    fn note(ts: u64, index: i32, cents: f32) -> DetectionEvent {
        DetectionEvent::detected(ts, (index % 12) as u8, index / 12 - 1, cents)
    }

    fn assert_target_invariant(e: &TuningStateEngine) {
        assert_eq!(
            e.state().target.is_none(),
            e.mode().is_free_singing(),
            "target {:?} in mode {}",
            e.state().target,
            e.state().mode_name
        );
    }

    #[test]
    fn test_target_invariant_across_modes() {
        let mut e = TuningStateEngine::new();
        assert_target_invariant(&e);
        for name in crate::catalog::mode_names() {
            e.select_mode(&name);
            assert_target_invariant(&e);
            e.on_detection(&note(0, 52, 3.0));
            assert_target_invariant(&e);
        }
        e.select_mode(FREE_SINGING_MODE_NAME);
        assert!(!e.set_target_pitch(Some(Pitch::a4())));
        assert_target_invariant(&e);
        e.select_mode(CHROMATIC_MODE_NAME);
        assert!(!e.set_target_pitch(None));
        assert_target_invariant(&e);
    }

    #[test]
    fn test_chromatic_keeps_previous_target() {
        let mut e = TuningStateEngine::new();
        e.select_mode(GUITAR);
        assert_eq!(e.state().target, Some(Pitch::new("E", 2)));
        e.select_mode(CHROMATIC_MODE_NAME);
        assert_eq!(e.state().target, Some(Pitch::new("E", 2)));
        e.select_mode(FREE_SINGING_MODE_NAME);
        e.select_mode(CHROMATIC_MODE_NAME);
        assert_eq!(e.state().target, Some(Pitch::a4()));
    }

    #[test]
    fn test_mode_change_clears_display_and_history() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&note(0, 69, 4.0));
        assert!(e.state().is_note_detected);
        e.on_detection(&DetectionEvent::silence(40));
        assert!(e.next_deadline_ms().is_some());

        assert!(e.select_mode(GUITAR));
        assert!(e.state().history.is_empty());
        assert!(e.state().displayed_note.is_none());
        assert!(!e.state().is_note_detected);
        assert!(e.next_deadline_ms().is_none());
        assert!(!e.state().is_dynamic_centering);

        assert!(!e.select_mode(GUITAR), "same mode is a no-op");
        e.select_mode(FREE_SINGING_MODE_NAME);
        assert!(e.state().is_dynamic_centering);
    }

    #[test]
    fn test_in_tune_against_target() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&note(0, 69, -6.0));
        let s = e.state();
        assert_eq!(s.displayed_note, Some(Pitch::a4()));
        assert!((s.cents_offset + 6.0).abs() < 0.01);
        assert!(s.is_tuned);
        assert!(s.is_note_detected);
        let v = s.history.latest().unwrap().value.unwrap();
        assert!((v + 0.12).abs() < 1e-3);
    }

    #[test]
    fn test_offset_is_relative_to_target_not_detected_note() {
        let mut e = TuningStateEngine::new();
        e.set_target_pitch(Some(Pitch::new("G", 4)));
        // A4 +10 cents against G4 is 210 cents sharp
        e.on_detection(&note(0, 69, 10.0));
        let s = e.state();
        assert!((s.cents_offset - 210.0).abs() < 0.05, "{}", s.cents_offset);
        assert!(!s.is_tuned);
        assert_eq!(s.displayed_note, Some(Pitch::a4()));
        assert_eq!(s.history.latest().unwrap().value, Some(1.0));
    }

    #[test]
    fn test_clamp_above_target() {
        let mut e = TuningStateEngine::new();
        e.set_target_pitch(Some(Pitch::new("C", 4)));
        e.on_detection(&note(0, 72, 0.0));
        assert_eq!(e.state().displayed_note, Some(Pitch::new("B", 4)));
        assert_eq!(e.state().range_indicator, Some(RangeIndicator::Above));
        assert!((e.state().cents_offset - 1200.0).abs() < 0.05);
    }

    #[test]
    fn test_clamp_below_target_and_boundary() {
        let mut e = TuningStateEngine::new();
        e.set_target_pitch(Some(Pitch::new("C", 4)));
        e.on_detection(&note(0, 48, 0.0));
        assert_eq!(e.state().displayed_note, Some(Pitch::new("C#", 3)));
        assert_eq!(e.state().range_indicator, Some(RangeIndicator::Below));

        // Exactly eleven below is shown as is
        e.on_detection(&note(40, 49, 0.0));
        assert_eq!(e.state().displayed_note, Some(Pitch::new("C#", 3)));
        assert_eq!(e.state().range_indicator, None);
    }

    #[test]
    fn test_dynamic_centering_uses_raw_offset() {
        let mut e = TuningStateEngine::new();
        e.select_mode(FREE_SINGING_MODE_NAME);
        // F#3 = 54
        e.on_detection(&note(0, 54, -8.5));
        let s = e.state();
        assert_eq!(s.displayed_note, Some(Pitch::new("F#", 3)));
        assert!((s.cents_offset + 8.5).abs() < 1e-6);
        assert!(s.is_tuned);
        assert_eq!(s.range_indicator, None);

        // Far notes are never clamped without a target
        e.on_detection(&note(40, 96, 12.0));
        assert_eq!(e.state().displayed_note, Some(Pitch::new("C", 7)));
        assert!(!e.state().is_tuned);
    }

    #[test]
    fn test_instrument_auto_tracks_strings() {
        let mut e = TuningStateEngine::new();
        e.select_mode(GUITAR);
        assert_eq!(e.state().target, Some(Pitch::new("E", 2)));

        e.on_detection(&note(0, 45, 0.0));
        assert_eq!(e.state().target, Some(Pitch::new("A", 2)));
        assert!(e.state().is_tuned);

        // One above A2: stays on A2 and reads +100 cents
        e.on_detection(&note(40, 46, 0.0));
        assert_eq!(e.state().target, Some(Pitch::new("A", 2)));
        assert!((e.state().cents_offset - 100.0).abs() < 0.05);

        // Far from every string: target unchanged
        e.on_detection(&note(80, 80, 0.0));
        assert_eq!(e.state().target, Some(Pitch::new("A", 2)));
        assert_eq!(e.state().range_indicator, Some(RangeIndicator::Above));
    }

    #[test]
    fn test_manual_target_resets_readout_keeps_history() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&note(0, 69, 2.0));
        assert!(e.state().is_tuned);
        assert!(e.set_target_pitch(Some(Pitch::new("E", 4))));
        let s = e.state();
        assert!(!s.is_tuned);
        assert_eq!(s.cents_offset, 0.0);
        assert!(s.displayed_note.is_none());
        assert_eq!(s.history.len(), 1);
        assert!(!e.set_target_pitch(Some(Pitch::new("E", 4))), "unchanged target");
    }

    #[test]
    fn test_no_detection_keeps_display_until_timeout() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&note(0, 69, 1.0));
        e.on_detection(&DetectionEvent::silence(10));
        let s = e.state();
        assert!(!s.is_note_detected);
        assert!(!s.is_tuned);
        assert_eq!(s.displayed_note, Some(Pitch::a4()), "held until debounce fires");
        assert_eq!(s.history.latest().unwrap().value, None);

        assert!(!e.on_tick(209));
        assert!(e.on_tick(210));
        let s = e.state();
        assert!(s.displayed_note.is_none());
        assert_eq!(s.cents_offset, 0.0);
        assert_eq!(s.target, Some(Pitch::a4()));
        assert_eq!(s.history.len(), 2);
    }

    #[test]
    fn test_detection_before_timeout_cancels_clear() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&DetectionEvent::silence(0));
        e.on_detection(&note(50, 69, 1.0));
        assert!(e.next_deadline_ms().is_none());
        assert!(!e.on_tick(250));
        assert_eq!(e.state().displayed_note, Some(Pitch::a4()));
    }

    #[test]
    fn test_partial_or_unavailable_detection_is_silence() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&DetectionEvent::from_raw(0, 9, 4, -1000.0));
        assert!(!e.state().is_note_detected);
        e.on_detection(&DetectionEvent::from_raw(10, 9, -1, 3.0));
        assert!(!e.state().is_note_detected);
        // Octave 9 is outside the supported range
        e.on_detection(&DetectionEvent::detected(20, 0, 9, 0.0));
        assert!(!e.state().is_note_detected);
        assert_eq!(e.state().history.len(), 3);
        assert!(e.state().history.points().all(|p| p.value.is_none()));
    }

    #[test]
    fn test_malformed_detection_fields_are_silence() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&DetectionEvent::from_raw(0, 9, i32::MAX, 3.0));
        assert!(!e.state().is_note_detected);

        // Built by hand, bypassing the raw decoding
        let huge = DetectionEvent {
            timestamp_ms: 10,
            note_index: Some(9),
            octave: Some(i32::MAX),
            cents_offset: Some(3.0),
        };
        e.on_detection(&huge);
        assert!(!e.state().is_note_detected);

        let bad_index = DetectionEvent {
            timestamp_ms: 20,
            note_index: Some(12),
            octave: Some(4),
            cents_offset: Some(0.0),
        };
        e.on_detection(&bad_index);
        assert!(!e.state().is_note_detected);
        assert_eq!(e.state().displayed_note, None);

        e.on_detection(&DetectionEvent::detected(30, 12, 4, 0.0));
        assert!(!e.state().is_note_detected);
        assert_eq!(e.state().history.len(), 4);
    }

    #[test]
    fn test_unknown_mode_while_chromatic_keeps_state() {
        let mut e = TuningStateEngine::new();
        e.on_detection(&note(0, 69, 2.0));
        assert!(!e.select_mode("Banjo"));
        assert!(!e.select_mode(CHROMATIC_MODE_NAME));
        let s = e.state();
        assert_eq!(s.mode_name, CHROMATIC_MODE_NAME);
        assert_eq!(s.history.len(), 1);
        assert_eq!(s.displayed_note, Some(Pitch::new("A", 4)));
    }

    #[test]
    fn test_unmappable_target_falls_back_to_raw_offset() {
        let mut e = TuningStateEngine::new();
        e.set_target_pitch(Some(Pitch::new("H", 4)));
        e.on_detection(&note(0, 40, -4.0));
        let s = e.state();
        assert!((s.cents_offset + 4.0).abs() < 1e-6);
        assert_eq!(s.displayed_note, Some(Pitch::new("E", 2)));
        assert_eq!(s.range_indicator, None);
        assert!(s.is_tuned);
    }

    #[test]
    fn test_reference_clamped_and_used() {
        let mut e = TuningStateEngine::new();
        assert_eq!(e.set_reference_frequency(600.0), Some(500.0));
        assert_eq!(e.set_reference_frequency(500.005), None);
        assert_eq!(e.set_reference_frequency(f32::NAN), None);
        assert_eq!(e.set_reference_frequency(300.0), Some(400.0));
        assert_eq!(e.set_reference_frequency(442.0), Some(442.0));

        // The detector already maps against 442, so exact A4 reads in tune
        e.on_detection(&note(0, 69, 0.0));
        assert!(e.state().cents_offset.abs() < 0.01);
        assert_eq!(e.state().target, Some(Pitch::a4()));
    }

    #[test]
    fn test_replaying_an_event_is_idempotent() {
        let mut e = TuningStateEngine::new();
        e.select_mode(GUITAR);
        let ev = note(100, 52, 7.0);
        e.on_detection(&ev);
        let first = e.snapshot();
        e.on_detection(&ev);
        let second = e.snapshot();
        assert_eq!(first.displayed_note, second.displayed_note);
        assert_eq!(first.target, second.target);
        assert_eq!(first.cents_offset, second.cents_offset);
        assert_eq!(first.is_tuned, second.is_tuned);
        // Not deduplicated
        assert_eq!(second.history.len(), 2);
    }

    #[test]
    fn test_history_stays_inside_window() {
        let mut e = TuningStateEngine::new();
        for i in 0..400u64 {
            let ts = i * 46;
            if i % 7 == 0 {
                e.on_detection(&DetectionEvent::silence(ts));
            } else {
                e.on_detection(&note(ts, 60 + (i % 5) as i32, 3.0));
            }
            let latest = e.state().history.latest().unwrap().timestamp_ms;
            assert!(e
                .state()
                .history
                .points()
                .all(|p| latest - p.timestamp_ms <= HISTORY_WINDOW_MS));
        }
    }

    #[test]
    fn test_stop_resets_readout() {
        let mut e = TuningStateEngine::new();
        e.set_recording(true);
        e.on_detection(&note(0, 69, 0.0));
        e.on_detection(&DetectionEvent::silence(5));
        e.on_stopped();
        let s = e.state();
        assert!(!s.is_recording);
        assert!(s.history.is_empty());
        assert!(s.displayed_note.is_none());
        assert!(e.next_deadline_ms().is_none());
        assert_eq!(s.target, Some(Pitch::a4()));
    }

    #[test]
    fn test_toggles() {
        let mut e = TuningStateEngine::new();
        e.toggle_cents_display();
        assert!(e.state().show_cents);
        e.toggle_cents_display();
        assert!(!e.state().show_cents);
        e.set_permission(true);
        assert!(e.state().has_permission);
    }
}
