use crate::types::*;
use crossbeam_channel::Receiver;
use log::warn;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const METER_WIDTH: usize = 41;
const GRAPH_WIDTH: usize = 48;

/// Renders tuner snapshots to the terminal: a live ASCII dashboard, or one
/// JSON object per line for piping into other tools.
pub struct ConsoleDisplay {
    rx: Receiver<TunerState>,
    update_hz: u32,
    json: bool,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<TunerState>, update_hz: u32, json: bool) -> Self {
        Self { rx, update_hz, json }
    }

    /// Blocks until the coordinator stops publishing.
    pub fn run(&self) {
        let min_interval = if self.update_hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(1000 / self.update_hz.max(1) as u64)
        };
        let mut last_draw: Option<Instant> = None;
        let mut stdout = io::stdout();

        for state in self.rx.iter() {
            if last_draw.is_some_and(|t| t.elapsed() < min_interval) {
                continue;
            }
            last_draw = Some(Instant::now());

            let out = if self.json {
                match serde_json::to_string(&state) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to serialize state: {}", e);
                        continue;
                    }
                }
            } else {
                // Clear screen and move cursor home
                format!("\x1b[2J\x1b[H{}", render(&state))
            };
            let _ = writeln!(stdout, "{}", out);
            let _ = stdout.flush();
        }
    }
}

/// Full dashboard for one snapshot.
pub fn render(state: &TunerState) -> String {
    let target = state
        .target
        .as_ref()
        .map_or("(follows voice)".to_string(), |p| p.to_string());
    let note = match (&state.displayed_note, state.range_indicator) {
        (Some(p), Some(ind)) => format!("{} {}", p, ind),
        (Some(p), None) => p.to_string(),
        (None, Some(ind)) => format!("{}", ind),
        (None, None) => "--".to_string(),
    };
    let status = match (state.has_permission, state.is_recording) {
        (false, _) => "NO MICROPHONE PERMISSION",
        (true, false) => "stopped",
        (true, true) if !state.is_note_detected => "listening",
        (true, true) if state.is_tuned => "IN TUNE",
        (true, true) => "tuning",
    };
    let cents = if state.show_cents {
        format!("{:+.1} cents", state.cents_offset)
    } else {
        String::new()
    };

    let mut s = String::new();
    s.push_str("╔══════════════════════════════════════════════════════╗\n");
    s.push_str("  TUNER\n");
    s.push_str("╠══════════════════════════════════════════════════════╣\n");
    s.push_str(&format!("  Mode:   {}\n", state.mode_name));
    s.push_str(&format!("  A4:     {:.1} Hz\n", state.reference_hz));
    s.push_str(&format!("  Target: {}\n", target));
    s.push('\n');
    s.push_str(&format!("  Note:   {:<8} {}\n", note, cents));
    s.push_str(&format!("  {}\n", meter(state)));
    s.push('\n');
    s.push_str(&format!("  {}\n", graph(&state.history)));
    s.push_str(&format!("  Status: {}\n", status));
    s.push_str("╚══════════════════════════════════════════════════════╝");
    s
}

/// Needle on a ±50 cent scale; off-scale readings pin to the edge.
fn meter(state: &TunerState) -> String {
    let half = (METER_WIDTH / 2) as f32;
    let mut cells: Vec<char> = vec!['─'; METER_WIDTH];
    cells[METER_WIDTH / 2] = '┼';
    if state.is_note_detected {
        let pos = (state.cents_offset / 50.0).clamp(-1.0, 1.0) * half + half;
        cells[(pos.round() as usize).min(METER_WIDTH - 1)] = if state.is_tuned { '◆' } else { '▼' };
    }
    format!("-50 {} +50", cells.into_iter().collect::<String>())
}

/// The most recent history points as a one-line sparkline, gaps as spaces.
fn graph(history: &crate::history::HistoryBuffer) -> String {
    const LEVELS: [char; 9] = ['▁', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let skip = history.len().saturating_sub(GRAPH_WIDTH);
    history
        .points()
        .skip(skip)
        .map(|p| match p.value {
            Some(v) => LEVELS[(((v + 1.0) / 2.0) * 8.0).round().clamp(0.0, 8.0) as usize],
            None => ' ',
        })
        .collect()
}
