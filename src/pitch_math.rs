use crate::catalog::{MAX_OCTAVE, MIN_OCTAVE, NOTE_NAMES};
use crate::types::Pitch;

/// Semitone index of A4 (MIDI numbering: C-1 = 0, C4 = 60).
pub const A4_SEMITONE_INDEX: i32 = 69;

/// Frequencies at or below this are treated as "no frequency".
pub const FREQUENCY_EPSILON: f32 = 1e-6;

/// Lowest frequency the detector reports as a note.
pub const MIN_VALID_FREQUENCY: f32 = 20.0;

/// Position of a note name in the chromatic scale starting at C.
pub fn chromatic_index(note_name: &str) -> Option<usize> {
    NOTE_NAMES.iter().position(|&n| n == note_name)
}

/// Pitch → semitone index: `chromatic_index + (octave + 1) * 12`.
/// None for unknown names or octaves outside the supported range.
pub fn to_semitone_index(pitch: &Pitch) -> Option<i32> {
    let idx = chromatic_index(&pitch.note_name)?;
    if !(MIN_OCTAVE..=MAX_OCTAVE).contains(&pitch.octave) {
        return None;
    }
    Some(idx as i32 + (pitch.octave + 1) * 12)
}

/// Semitone index → pitch. None when the octave falls outside the supported range.
pub fn from_semitone_index(index: i32) -> Option<Pitch> {
    let octave = index.div_euclid(12) - 1;
    if !(MIN_OCTAVE..=MAX_OCTAVE).contains(&octave) {
        return None;
    }
    let name = NOTE_NAMES[index.rem_euclid(12) as usize];
    Some(Pitch::new(name, octave))
}

/// Equal-tempered frequency of `pitch` given the A4 reference. 0.0 if unmappable.
pub fn frequency_of(pitch: &Pitch, reference_hz: f32) -> f32 {
    match to_semitone_index(pitch) {
        Some(idx) => reference_hz * 2.0_f32.powf((idx - A4_SEMITONE_INDEX) as f32 / 12.0),
        None => 0.0,
    }
}

/// Distance from `freq_b` to `freq_a` in cents (positive = a is sharp).
/// None when either frequency is degenerate.
pub fn cents_between(freq_a: f32, freq_b: f32) -> Option<f32> {
    if freq_a <= FREQUENCY_EPSILON || freq_b <= FREQUENCY_EPSILON {
        return None;
    }
    Some(1200.0 * (freq_a / freq_b).log2())
}

/// Move a frequency by a number of cents.
pub fn shift_by_cents(freq: f32, cents: f32) -> f32 {
    freq * 2.0_f32.powf(cents / 1200.0)
}

/// Nearest chromatic note of a frequency: (note index, octave, cents from it).
///
/// This is the mapping the detector applies to its raw estimate before
/// reporting; it depends on the reference, which is why reference changes are
/// forwarded to the detector.
pub fn classify_frequency(freq: f32, reference_hz: f32) -> Option<(u8, i32, f32)> {
    if !freq.is_finite() || freq < MIN_VALID_FREQUENCY || reference_hz <= FREQUENCY_EPSILON {
        return None;
    }
    let semitones = 12.0 * (freq / reference_hz).log2() + A4_SEMITONE_INDEX as f32;
    let nearest = semitones.round() as i32;
    let pitch = from_semitone_index(nearest)?;
    let cents = cents_between(freq, frequency_of(&pitch, reference_hz))?;
    Some((nearest.rem_euclid(12) as u8, pitch.octave, cents))
}
