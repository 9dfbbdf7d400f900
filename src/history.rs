//! Sliding time window of offset samples for the tuning graph.
//!
//! Gaps (frames with no detection) are stored as explicit `None` points so a
//! renderer can break the line instead of interpolating across silence. The
//! buffer is bounded by age, not by count.

use crate::types::HistoryPoint;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How far back the graph reaches.
pub const HISTORY_WINDOW_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBuffer {
    window_ms: u64,
    points: VecDeque<HistoryPoint>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_window(HISTORY_WINDOW_MS)
    }

    pub fn with_window(window_ms: u64) -> Self {
        Self {
            window_ms,
            points: VecDeque::new(),
        }
    }

    /// Add a point, then drop every point older than the window relative to `timestamp_ms`.
    pub fn append(&mut self, value: Option<f32>, timestamp_ms: u64) {
        self.points.push_back(HistoryPoint {
            timestamp_ms,
            value,
        });
        let window = self.window_ms;
        self.points
            .retain(|p| timestamp_ms.saturating_sub(p.timestamp_ms) <= window);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Oldest first.
    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
