use crate::types::*;
use log::warn;

/// Chromatic note names, index 0 = C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Supported octave range (scientific pitch notation), inclusive.
pub const MIN_OCTAVE: i32 = 0;
pub const MAX_OCTAVE: i32 = 8;

/// Reserved mode names that are not instrument tunings.
pub const CHROMATIC_MODE_NAME: &str = "Chromatic";
pub const FREE_SINGING_MODE_NAME: &str = "Free Singing";

fn tuning(name: &str, pitches: &[(&str, i32)]) -> InstrumentTuning {
    InstrumentTuning {
        name: name.to_string(),
        pitches: pitches.iter().map(|&(n, o)| Pitch::new(n, o)).collect(),
    }
}

/// Every built-in instrument tuning, in picker order.
/// Strings are listed lowest-course first, except the re-entrant ukulele.
pub fn all_tunings() -> Vec<InstrumentTuning> {
    vec![
        tuning(
            "Guitar (Standard)",
            &[("E", 2), ("A", 2), ("D", 3), ("G", 3), ("B", 3), ("E", 4)],
        ),
        tuning(
            "Guitar (Drop D)",
            &[("D", 2), ("A", 2), ("D", 3), ("G", 3), ("B", 3), ("E", 4)],
        ),
        tuning(
            "Guitar (Drop C)",
            &[("C", 2), ("G", 2), ("C", 3), ("F", 3), ("A", 3), ("D", 4)],
        ),
        tuning(
            "Guitar (Open G)",
            &[("D", 2), ("G", 2), ("D", 3), ("G", 3), ("B", 3), ("D", 4)],
        ),
        tuning(
            "Guitar (DADGAD)",
            &[("D", 2), ("A", 2), ("D", 3), ("G", 3), ("A", 3), ("D", 4)],
        ),
        tuning(
            "Bass 4-string (Standard)",
            &[("E", 1), ("A", 1), ("D", 2), ("G", 2)],
        ),
        tuning(
            "Bass 5-string (Standard)",
            &[("B", 0), ("E", 1), ("A", 1), ("D", 2), ("G", 2)],
        ),
        tuning(
            "Bass 6-string (Standard)",
            &[("B", 0), ("E", 1), ("A", 1), ("D", 2), ("G", 2), ("C", 3)],
        ),
        // Re-entrant: G4 sits above C4
        tuning(
            "Ukulele (Standard C)",
            &[("G", 4), ("C", 4), ("E", 4), ("A", 4)],
        ),
        tuning("Violin (Standard)", &[("G", 3), ("D", 4), ("A", 4), ("E", 5)]),
    ]
}

/// Exact-name lookup. Reserved mode names and unknown names give None.
pub fn find_tuning(name: &str) -> Option<InstrumentTuning> {
    all_tunings().into_iter().find(|t| t.name == name)
}

/// Every selectable mode name: chromatic, each tuning, free singing.
pub fn mode_names() -> Vec<String> {
    let mut names = vec![CHROMATIC_MODE_NAME.to_string()];
    names.extend(all_tunings().into_iter().map(|t| t.name));
    names.push(FREE_SINGING_MODE_NAME.to_string());
    names
}

impl Mode {
    /// Resolve a mode name. Unknown names fall back to chromatic.
    pub fn from_name(name: &str) -> Self {
        match name {
            CHROMATIC_MODE_NAME => Mode::Chromatic,
            FREE_SINGING_MODE_NAME => Mode::FreeSinging,
            _ => match find_tuning(name) {
                Some(t) => Mode::Instrument(t),
                None => {
                    warn!("Unknown mode {:?}, using {}", name, CHROMATIC_MODE_NAME);
                    Mode::Chromatic
                }
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Mode::Chromatic => CHROMATIC_MODE_NAME,
            Mode::FreeSinging => FREE_SINGING_MODE_NAME,
            Mode::Instrument(t) => &t.name,
        }
    }

    pub fn tuning(&self) -> Option<&InstrumentTuning> {
        match self {
            Mode::Instrument(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_free_singing(&self) -> bool {
        matches!(self, Mode::FreeSinging)
    }
}
