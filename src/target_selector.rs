use crate::pitch_math::to_semitone_index;
use crate::types::*;

/// A string is only auto-selected when detection is this close to it.
pub const AUTO_SELECT_SEMITONE_THRESHOLD: i32 = 2;

/// Target to use right after entering `mode`.
///
/// Instrument modes start on their first string, chromatic keeps whatever
/// target was active (A4 if none), free singing has no target.
pub fn resolve_for_mode(mode: &Mode, previous: Option<&Pitch>) -> Option<Pitch> {
    match mode {
        Mode::Instrument(tuning) => Some(
            tuning
                .pitches
                .first()
                .cloned()
                .unwrap_or_else(Pitch::a4),
        ),
        Mode::Chromatic => Some(previous.cloned().unwrap_or_else(Pitch::a4)),
        Mode::FreeSinging => None,
    }
}

/// Closest string to `detected_index` and its distance in semitones.
///
/// Strings are scanned in tuning order and the best is only replaced on a
/// strictly smaller distance, so ties go to the earlier string. Unmappable
/// strings are skipped.
pub fn nearest_string(tuning: &InstrumentTuning, detected_index: i32) -> Option<(&Pitch, i32)> {
    let mut best: Option<(&Pitch, i32)> = None;
    for pitch in &tuning.pitches {
        let Some(string_index) = to_semitone_index(pitch) else {
            continue;
        };
        let distance = (detected_index - string_index).abs();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((pitch, distance));
        }
    }
    best
}

/// New target for an instrument mode, or None to keep the current one.
///
/// Switches only when the nearest string is within the threshold and is not
/// already the target.
pub fn auto_select(
    tuning: &InstrumentTuning,
    detected_index: i32,
    current: Option<&Pitch>,
) -> Option<Pitch> {
    let (pitch, distance) = nearest_string(tuning, detected_index)?;
    if distance <= AUTO_SELECT_SEMITONE_THRESHOLD && Some(pitch) != current {
        Some(pitch.clone())
    } else {
        None
    }
}
